//! The job file, telling what to remap where.
//!
//! ```json
//! {
//!     "version": "1.16.5",
//!     "toolchain": "fabric",
//!     "mappings": { "path": "mappings.tiny", "name": "yarn", "version": "1.16.5+build.10" },
//!     "primary": { "role": "minecraft", "path": "minecraft-merged.jar" },
//!     "classpath": ["libraries"],
//!     "cache_dir": "cache"
//! }
//! ```
//!
//! Relative paths are relative to the directory of the job file.

use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Toolchain {
	Fabric,
	Forge,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MappingsConfig {
	/// A tiny v2 file.
	pub path: PathBuf,
	pub name: String,
	pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InputArchive {
	/// Names the archive in output file names and logs, like `minecraft`.
	pub role: String,
	pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct JobConfig {
	pub version: String,
	pub toolchain: Toolchain,
	pub mappings: MappingsConfig,
	pub primary: InputArchive,
	/// An archive depending on the primary one, like a patched jar.
	#[serde(default)]
	pub secondary: Option<InputArchive>,
	#[serde(default)]
	pub classpath: Vec<PathBuf>,
	pub cache_dir: PathBuf,
	/// Number of workers for reading and remapping classes, defaults to the number of cores.
	#[serde(default)]
	pub threads: Option<usize>,
	/// Appended to the version in output file names, like `-36.2.0` for a forge version.
	#[serde(default)]
	pub jar_suffix: String,
}

impl JobConfig {
	pub fn read_file(path: impl AsRef<Path>) -> Result<JobConfig> {
		let path = path.as_ref();
		let string = fs::read_to_string(path)
			.with_context(|| anyhow!("failed to read job file {path:?}"))?;
		let config: JobConfig = serde_json::from_str(&string)
			.with_context(|| anyhow!("failed to parse job file {path:?}"))?;

		let base = path.parent().unwrap_or(Path::new(""));
		Ok(config.relative_to(base))
	}

	/// Makes all relative paths relative to `base` instead.
	pub fn relative_to(self, base: &Path) -> JobConfig {
		let resolve = |path: PathBuf| if path.is_relative() { base.join(path) } else { path };
		JobConfig {
			mappings: MappingsConfig { path: resolve(self.mappings.path), ..self.mappings },
			primary: InputArchive { path: resolve(self.primary.path), ..self.primary },
			secondary: self.secondary.map(|secondary| InputArchive { path: resolve(secondary.path), ..secondary }),
			classpath: self.classpath.into_iter().map(resolve).collect(),
			cache_dir: resolve(self.cache_dir),
			..self
		}
	}
}
