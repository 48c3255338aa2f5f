use std::path::PathBuf;
use thiserror::Error;

/// Errors of a pipeline run that callers may want to tell apart.
///
/// These are found in the [`anyhow::Error`] chain with [`anyhow::Error::downcast_ref`].
#[derive(Debug, Error)]
pub enum PipelineError {
	#[error("the {what} at {path:?} doesn't exist, restore it before running again")]
	MissingInput { what: &'static str, path: PathBuf },
	#[error("failed to remap class {class:?} from {from} to {to}")]
	Backend { class: String, from: String, to: String },
}
