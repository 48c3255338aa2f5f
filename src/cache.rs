//! Deciding whether the outputs of an earlier run can be reused.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use crate::config::Toolchain;

/// The output kind of the last namespace of the chain.
const MAPPED: &str = "mapped";

/// Identifies the outputs of a run: two runs with the same identity produce the same file names, and runs with a
/// different identity never share an output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheIdentity {
	pub version: String,
	pub mapping_name: String,
	pub mapping_version: String,
	pub toolchain: Toolchain,
	/// Appended to the version string, like `-36.2.0`.
	pub jar_suffix: String,
}

impl CacheIdentity {
	/// Like `1.16.5-mapped-yarn-1.16.5+build.10-forge-36.2.0`. Only forge outputs carry the toolchain.
	pub fn version_string(&self, kind: &str) -> String {
		let toolchain = match self.toolchain {
			Toolchain::Fabric => "",
			Toolchain::Forge => "-forge",
		};
		format!("{}-{kind}-{}-{}{toolchain}{}", self.version, self.mapping_name, self.mapping_version, self.jar_suffix)
	}

	/// Like `minecraft-1.16.5-mapped-yarn-1.16.5+build.10-forge-36.2.0.jar`.
	pub fn file_name(&self, role: &str, kind: &str) -> String {
		format!("{role}-{}.jar", self.version_string(kind))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
	/// All outputs exist and may be used.
	Fresh,
	/// The outputs must be rebuilt. None of them exist anymore.
	Stale,
}

/// One output archive of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
	pub namespace: String,
	pub path: PathBuf,
}

/// Decides whether the outputs for an archive role are up to date, and deletes them if not.
#[derive(Debug, Clone)]
pub struct CacheGate {
	identity: CacheIdentity,
	directory: PathBuf,
}

impl CacheGate {
	pub fn new(identity: CacheIdentity, directory: PathBuf) -> CacheGate {
		CacheGate { identity, directory }
	}

	pub fn identity(&self) -> &CacheIdentity {
		&self.identity
	}

	/// The output paths for remapping an archive to each of `targets`. The last target is the final namespace. Its
	/// output is the `mapped` archive, placed in a subdirectory named like the mapped version string.
	pub fn outputs(&self, role: &str, targets: &[String]) -> Vec<Output> {
		targets.iter()
			.enumerate()
			.map(|(index, namespace)| {
				let path = if index + 1 == targets.len() {
					self.directory.join(self.identity.version_string(MAPPED)).join(self.identity.file_name(role, MAPPED))
				} else {
					self.directory.join(self.identity.file_name(role, namespace))
				};
				Output { namespace: namespace.clone(), path }
			})
			.collect()
	}

	/// Checks the outputs of `role`. Unless they all exist and neither `force` nor `upstream_changed` is set, this
	/// deletes all of them and gives [`CacheDecision::Stale`].
	pub fn check(&self, role: &str, targets: &[String], force: bool, upstream_changed: bool) -> Result<CacheDecision> {
		let outputs = self.outputs(role, targets);
		let missing = outputs.iter().filter(|output| !output.path.is_file()).count();

		if missing == 0 && !force && !upstream_changed {
			debug!("all {} outputs of {role} are up to date", outputs.len());
			return Ok(CacheDecision::Fresh);
		}

		info!("rebuilding outputs of {role} ({missing} missing, force: {force}, upstream changed: {upstream_changed})");
		for output in &outputs {
			remove_if_exists(&output.path)?;
			remove_if_exists(&temp_path(&output.path))?;
		}
		Ok(CacheDecision::Stale)
	}

	/// Deletes all outputs of `role` after a failed run. Failures are logged, not returned.
	pub fn invalidate(&self, role: &str, targets: &[String]) {
		for output in self.outputs(role, targets) {
			for path in [temp_path(&output.path), output.path] {
				if let Err(e) = remove_if_exists(&path) {
					warn!("failed to clean up {path:?}: {e:#}");
				}
			}
		}
	}
}

fn temp_path(path: &Path) -> PathBuf {
	let mut name = path.as_os_str().to_owned();
	name.push(".tmp");
	PathBuf::from(name)
}

fn remove_if_exists(path: &Path) -> Result<()> {
	match fs::remove_file(path) {
		Ok(()) => {
			debug!("deleted {path:?}");
			Ok(())
		},
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
		Err(e) => Err(e).with_context(|| anyhow!("failed to delete {path:?}")),
	}
}
