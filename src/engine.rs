//! Running the hops of a namespace chain over loaded archives.

use std::path::{Path, PathBuf};
use std::time::Instant;
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info};
use rayon::prelude::*;
use duke::{remap_class, RemapOptions};
use dukebox::{ArchiveImage, ArchiveLoader, ArchiveWriter, ClassEntry, ClasspathIndex, ResourceRewriter};
use quill::chain::NamespaceChain;
use quill::remapper::{ClassHierarchy, TableRemapper};
use quill::table::MappingTable;
use crate::error::PipelineError;
use crate::fixups::aux_files::AuxiliaryFileRemapper;
use crate::fixups::inner_classes::InnerClassOwners;
use crate::fixups::package_access::fix_package_access;
use crate::variant::{Fixup, VariantProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
	Idle,
	/// The classpath is indexed.
	Prepared,
	Finished,
}

/// An archive ready for remapping: the class bytes, and the class hierarchy read from them.
#[derive(Debug)]
pub struct LoadedArchive {
	pub role: String,
	pub image: ArchiveImage,
	pub hierarchy: ClassHierarchy,
}

/// Remaps archives along a namespace chain, one hop at a time.
///
/// One engine is used for all hops and all archives of a run, so that the classpath is only indexed once. Hops
/// read from the class bytes of the [`LoadedArchive`] and never from the output of an earlier hop, so a single hop
/// can be run again after deleting its output.
#[derive(Debug)]
pub struct RemapEngine {
	chain: NamespaceChain,
	profile: VariantProfile,
	loader: ArchiveLoader,
	classpath: Vec<PathBuf>,
	index: Option<ClasspathIndex>,
	state: EngineState,
	options: RemapOptions,
}

impl RemapEngine {
	pub fn new(chain: NamespaceChain, profile: VariantProfile, classpath: Vec<PathBuf>, threads: Option<usize>) -> Result<RemapEngine> {
		let options = profile.remap_options();
		Ok(RemapEngine {
			chain,
			profile,
			loader: ArchiveLoader::new(threads)?,
			classpath,
			index: None,
			state: EngineState::Idle,
			options,
		})
	}

	pub fn state(&self) -> EngineState {
		self.state
	}

	pub fn chain(&self) -> &NamespaceChain {
		&self.chain
	}

	pub fn profile(&self) -> &VariantProfile {
		&self.profile
	}

	/// Indexes the classpath. Calling this again does nothing.
	pub fn prepare(&mut self) -> Result<()> {
		match self.state {
			EngineState::Idle => {
				let start = Instant::now();
				let index = ClasspathIndex::build(&self.classpath)
					.context("failed to index the classpath")?;
				debug!("indexed {} classpath classes in {:?}", index.len(), start.elapsed());

				self.index = Some(index);
				self.state = EngineState::Prepared;
				Ok(())
			},
			EngineState::Prepared => Ok(()),
			EngineState::Finished => bail!("the remap engine is already finished"),
		}
	}

	/// Reads the classes of an archive on the worker pool of this engine.
	pub fn load(&self, role: &str, path: &Path) -> Result<LoadedArchive> {
		let image = self.loader.load(path)?;
		let hierarchy = image.hierarchy()?;
		Ok(LoadedArchive { role: role.to_owned(), image, hierarchy })
	}

	/// Builds the table for remapping the input archives to `target`.
	///
	/// `inner_classes` gives the owners of inner classes for the inner class fixup, if that fixup runs.
	pub fn hop_table(&self, target: &str, inner_classes: Option<&InnerClassOwners>) -> Result<MappingTable> {
		let from = self.chain.first();
		let mut table = self.chain.resolve(from, target)?;

		table = table.union(&self.profile.secondary_table(from, target))
			.context("secondary mappings conflict with the mappings")?;

		if self.profile.fixups_for(target).contains(&Fixup::InnerClasses) {
			if let Some(owners) = inner_classes {
				let fixups = owners.fixup_table(&table);
				debug!("renaming {} inner classes along with their owner", fixups.classes().count());
				table = table.union(&fixups)?;
			}
		}

		Ok(table)
	}

	/// Remaps `archive` from the first namespace of the chain to `target`, writing the result to `output`.
	pub fn remap_hop(
		&mut self,
		archive: &LoadedArchive,
		target: &str,
		output: &Path,
		inner_classes: Option<&InnerClassOwners>,
	) -> Result<()> {
		self.prepare()?;
		let Some(index) = &self.index else {
			bail!("the remap engine has no classpath index after preparing it");
		};

		let from = self.chain.first();
		let role = archive.role.as_str();
		info!(":remapping {role} ({from} -> {target})");
		let start = Instant::now();

		let table = self.hop_table(target, inner_classes)?;
		let inheritance = vec![&archive.hierarchy, index.hierarchy()];
		let remapper = TableRemapper::new(&table, &inheritance);
		let options = &self.options;

		let mut classes = self.loader.pool().install(|| {
			archive.image.classes()
				.par_iter()
				.map(|entry| -> Result<ClassEntry> {
					let remapped = remap_class(&entry.bytes, &remapper, options)
						.with_context(|| PipelineError::Backend {
							class: entry.path.clone(),
							from: from.to_owned(),
							to: target.to_owned(),
						})?;
					Ok(ClassEntry {
						path: entry.renamed_path(&remapped.original_name, &remapped.name),
						bytes: remapped.bytes,
						last_modified: entry.last_modified,
					})
				})
				.collect::<Result<Vec<_>>>()
		})?;
		classes.sort_by(|a, b| a.path.cmp(&b.path));

		if self.profile.fix_package_access {
			let widened = fix_package_access(&mut classes)
				.with_context(|| anyhow!("failed to fix package access in {role}"))?;
			debug!("widened package access in {widened} classes of {role}");
		}

		let aux_files = if self.profile.fixups_for(target).contains(&Fixup::AuxiliaryFiles) {
			let penultimate = self.chain.penultimate()
				.ok_or_else(|| anyhow!("auxiliary file fixups need a chain of at least three namespaces"))?;
			let table = self.chain.resolve(penultimate, target)?;
			Some(AuxiliaryFileRemapper::for_image(table, &archive.image)?)
		} else {
			None
		};

		let mut writer = ArchiveWriter::new(self.profile.copy_mode);
		if let Some(aux_files) = &aux_files {
			writer = writer.with_rewriter(aux_files as &dyn ResourceRewriter);
		}
		writer.write(output, &classes, archive.image.source())?;

		info!(":remapped {role} ({from} -> {target}) in {:?}", start.elapsed());
		Ok(())
	}

	/// Releases the classpath index. Calling this again does nothing.
	pub fn finish(&mut self) {
		if self.state != EngineState::Finished {
			self.index = None;
			self.state = EngineState::Finished;
			debug!("remap engine finished");
		}
	}
}

impl Drop for RemapEngine {
	fn drop(&mut self) {
		self.finish();
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use quill::chain::NamespaceChain;
	use crate::config::Toolchain;
	use crate::engine::{EngineState, RemapEngine};
	use crate::variant::VariantProfile;

	const MAPPINGS: &str = "tiny\t2\t0\tofficial\tintermediary\tnamed
c\ta\tclass_1\tcom/example/A
c\tb\tclass_2\t
";

	fn engine() -> Result<RemapEngine> {
		let mappings = quill::tiny_v2::read(MAPPINGS.as_bytes())?;
		let profile = VariantProfile::new(Toolchain::Fabric);
		let chain = NamespaceChain::new(&mappings, &profile.namespaces())?;
		RemapEngine::new(chain, profile, Vec::new(), Some(1))
	}

	#[test]
	fn states() -> Result<()> {
		let mut engine = engine()?;
		assert_eq!(engine.state(), EngineState::Idle);
		engine.prepare()?;
		engine.prepare()?;
		assert_eq!(engine.state(), EngineState::Prepared);
		engine.finish();
		engine.finish();
		assert_eq!(engine.state(), EngineState::Finished);
		assert!(engine.prepare().is_err());
		Ok(())
	}

	#[test]
	fn hop_table() -> Result<()> {
		let engine = engine()?;
		let table = engine.hop_table("named", None)?;
		assert_eq!(table.get_class("a"), Some("com/example/A"));
		assert_eq!(table.get_class("b"), Some("class_2"));
		assert_eq!(table.get_class("javax/annotation/Nullable"), Some("org/jetbrains/annotations/Nullable"));
		Ok(())
	}
}
