//! Remapping archives of class files along a chain of namespaces.
//!
//! A run is described by a [`driver::RemapJob`] and a [`variant::VariantProfile`]. The [`driver::PipelineDriver`]
//! asks the [`cache::CacheGate`] whether the outputs are still valid, and if not, loads the input archives and
//! lets the [`engine::RemapEngine`] write one archive per namespace of the chain.

use std::path::Path;
use anyhow::{anyhow, Context, Result};
use quill::access_transform::AccessTransformSet;

pub mod error;
pub mod config;
pub mod variant;
pub mod fixups;
pub mod engine;
pub mod cache;
pub mod driver;

/// Reads an access widener and compiles it into access transforms.
pub fn access_widener_to_transforms(path: impl AsRef<Path>) -> Result<AccessTransformSet> {
	let path = path.as_ref();
	let reader = quill::access_widener::read_file(path)?;
	AccessTransformSet::compile_results(reader)
		.with_context(|| anyhow!("failed to convert access widener {path:?}"))
}
