//! Running a whole remap job: cache checks, loading, and all hops for the primary and secondary archive.

use std::path::{Path, PathBuf};
use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexMap;
use log::{error, info};
use quill::chain::NamespaceChain;
use crate::cache::{CacheDecision, CacheGate, CacheIdentity};
use crate::config::{InputArchive, JobConfig};
use crate::engine::{LoadedArchive, RemapEngine};
use crate::error::PipelineError;
use crate::fixups::inner_classes::InnerClassOwners;
use crate::variant::{Fixup, VariantProfile};

/// Everything one run needs, built from a [`JobConfig`] or directly.
#[derive(Debug, Clone)]
pub struct RemapJob {
	pub identity: CacheIdentity,
	pub mappings: PathBuf,
	pub primary: InputArchive,
	pub secondary: Option<InputArchive>,
	pub classpath: Vec<PathBuf>,
	pub cache_dir: PathBuf,
	pub threads: Option<usize>,
	/// Rebuild even if all outputs exist.
	pub force: bool,
	/// The input archives changed since the outputs were made.
	pub upstream_changed: bool,
}

impl RemapJob {
	pub fn from_config(config: JobConfig, force: bool, upstream_changed: bool) -> RemapJob {
		RemapJob {
			identity: CacheIdentity {
				version: config.version,
				mapping_name: config.mappings.name,
				mapping_version: config.mappings.version,
				toolchain: config.toolchain,
				jar_suffix: config.jar_suffix,
			},
			mappings: config.mappings.path,
			primary: config.primary,
			secondary: config.secondary,
			classpath: config.classpath,
			cache_dir: config.cache_dir,
			threads: config.threads,
			force,
			upstream_changed,
		}
	}

	fn archives(&self) -> impl Iterator<Item=&InputArchive> {
		std::iter::once(&self.primary).chain(&self.secondary)
	}
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
	/// The output for each role and target namespace.
	pub outputs: IndexMap<(String, String), PathBuf>,
	/// The number of hops remapped, zero if everything was up to date.
	pub hops: usize,
}

impl RunReport {
	pub fn output(&self, role: &str, namespace: &str) -> Option<&Path> {
		self.outputs.get(&(role.to_owned(), namespace.to_owned())).map(PathBuf::as_path)
	}
}

/// Runs a [`RemapJob`] with a [`VariantProfile`].
///
/// If anything fails, all outputs of the job are deleted before the error is returned, so that the next run
/// rebuilds everything.
#[derive(Debug)]
pub struct PipelineDriver {
	job: RemapJob,
	profile: VariantProfile,
}

impl PipelineDriver {
	pub fn new(job: RemapJob, profile: VariantProfile) -> PipelineDriver {
		PipelineDriver { job, profile }
	}

	fn check_inputs(&self) -> Result<()> {
		let mut inputs = vec![("mapping file", &self.job.mappings)];
		for archive in self.job.archives() {
			inputs.push(("input archive", &archive.path));
		}
		for entry in &self.job.classpath {
			inputs.push(("classpath entry", entry));
		}

		for (what, path) in inputs {
			if !path.exists() {
				return Err(PipelineError::MissingInput { what, path: path.clone() }.into());
			}
		}
		Ok(())
	}

	pub fn run(&self) -> Result<RunReport> {
		if self.job.identity.toolchain != self.profile.toolchain {
			bail!("the job is for the {:?} toolchain, but was run with the {:?} one", self.job.identity.toolchain, self.profile.toolchain);
		}
		self.check_inputs()?;

		let mappings = quill::tiny_v2::read_file(&self.job.mappings)?;
		let chain = NamespaceChain::new(&mappings, &self.profile.namespaces())
			.with_context(|| anyhow!("mappings {:?} don't fit the {:?} toolchain", self.job.mappings, self.profile.toolchain))?;
		let targets: Vec<String> = chain.namespaces()[1..].to_vec();

		let gate = CacheGate::new(self.job.identity.clone(), self.job.cache_dir.clone());

		let mut stale = Vec::new();
		for archive in self.job.archives() {
			let decision = gate.check(&archive.role, &targets, self.job.force, self.job.upstream_changed)?;
			if decision == CacheDecision::Stale {
				stale.push(archive);
			}
		}

		let mut report = RunReport::default();
		if !stale.is_empty() {
			let mut engine = RemapEngine::new(chain, self.profile.clone(), self.job.classpath.clone(), self.job.threads)?;

			let result = self.remap(&mut engine, &gate, &stale, &targets);
			engine.finish();

			match result {
				Ok(hops) => report.hops = hops,
				Err(e) => {
					error!("remapping failed, deleting all outputs: {e:#}");
					for archive in self.job.archives() {
						gate.invalidate(&archive.role, &targets);
					}
					return Err(e);
				},
			}
		}

		for archive in self.job.archives() {
			for output in gate.outputs(&archive.role, &targets) {
				report.outputs.insert((archive.role.clone(), output.namespace), output.path);
			}
		}

		let last = targets.last().ok_or_else(|| anyhow!("the namespace chain has no targets"))?;
		match report.output(&self.job.primary.role, last) {
			Some(path) if path.is_file() => {},
			_ => bail!("the final output of {} wasn't created", self.job.primary.role),
		}

		Ok(report)
	}

	fn remap(&self, engine: &mut RemapEngine, gate: &CacheGate, stale: &[&InputArchive], targets: &[String]) -> Result<usize> {
		let needs_owners = self.profile.fixups.contains(&Fixup::InnerClasses);
		let mut primary: Option<LoadedArchive> = None;
		let mut owners: Option<InnerClassOwners> = None;
		let mut hops = 0;

		for &archive in stale {
			let loaded = engine.load(&archive.role, &archive.path)
				.with_context(|| anyhow!("failed to load {} archive {:?}", archive.role, archive.path))?;

			if needs_owners && owners.is_none() {
				// inner class owners are always taken from the primary archive
				let source = if archive == &self.job.primary {
					&loaded
				} else {
					primary.insert(engine.load(&self.job.primary.role, &self.job.primary.path)?)
				};
				owners = Some(InnerClassOwners::from_image(&source.image)?);
			}

			for output in gate.outputs(&archive.role, targets) {
				engine.remap_hop(&loaded, &output.namespace, &output.path, owners.as_ref())
					.with_context(|| anyhow!("failed to remap {} to {}", archive.role, output.namespace))?;
				hops += 1;
			}
			info!("finished {}", archive.role);
		}

		Ok(hops)
	}
}
