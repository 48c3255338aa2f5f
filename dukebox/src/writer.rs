//! Writing archives.
//!
//! An archive is first written to `<output>.tmp`, and only renamed to `<output>` once it's complete. A file at the
//! output path is therefore always a whole archive.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexSet;
use log::{trace, warn};
use zip::write::SimpleFileOptions;
use zip::{DateTime, ZipArchive, ZipWriter};
use crate::loader::{is_class_path, ClassEntry};

const MANIFEST: &str = "META-INF/MANIFEST.MF";
const SIGNATURE_EXTENSIONS: [&str; 4] = [".SF", ".RSA", ".DSA", ".EC"];

/// How the non class entries of the source archive are copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NonClassCopyMode {
	#[default]
	Unchanged,
	/// Drops the jar signature files, and strips the per entry sections (with their digests) from the manifest.
	///
	/// Signatures can't be valid anymore after remapping.
	FixMetaInf,
}

fn is_signature_file(path: &str) -> bool {
	path.strip_prefix("META-INF/")
		.is_some_and(|name| !name.contains('/') && SIGNATURE_EXTENSIONS.iter().any(|ext| name.ends_with(ext)))
}

/// Keeps only the main section of a manifest.
pub fn strip_manifest(manifest: &str) -> String {
	let mut main = String::new();
	for line in manifest.lines() {
		if line.is_empty() {
			break;
		}
		main.push_str(line);
		main.push_str("\r\n");
	}
	main.push_str("\r\n");
	main
}

/// Changes the contents of some non class entries while they are copied.
pub trait ResourceRewriter {
	/// Whether [`ResourceRewriter::rewrite`] should be called for this entry.
	fn claims(&self, path: &str) -> bool;

	fn rewrite(&self, path: &str, data: &[u8]) -> Result<Vec<u8>>;
}

fn temp_path(output: &Path) -> PathBuf {
	let mut name = OsString::from(output.as_os_str());
	name.push(".tmp");
	PathBuf::from(name)
}

fn file_options(last_modified: Option<DateTime>) -> SimpleFileOptions {
	SimpleFileOptions::default().last_modified_time(last_modified.unwrap_or_default())
}

/// Writes class entries together with the non class entries of a source archive.
pub struct ArchiveWriter<'a> {
	mode: NonClassCopyMode,
	rewriters: Vec<&'a dyn ResourceRewriter>,
}

impl<'a> ArchiveWriter<'a> {
	pub fn new(mode: NonClassCopyMode) -> ArchiveWriter<'a> {
		ArchiveWriter { mode, rewriters: Vec::new() }
	}

	/// Adds a rewriter. The first one claiming an entry gets it.
	pub fn with_rewriter(mut self, rewriter: &'a dyn ResourceRewriter) -> ArchiveWriter<'a> {
		self.rewriters.push(rewriter);
		self
	}

	/// Writes `classes`, followed by all non class entries of `resources_from`, to `output`.
	///
	/// If this fails, nothing is left at `output`, and the temporary file is removed.
	pub fn write(&self, output: &Path, classes: &[ClassEntry], resources_from: &Path) -> Result<()> {
		if let Some(parent) = output.parent() {
			fs::create_dir_all(parent)
				.with_context(|| anyhow!("failed to create directory {parent:?}"))?;
		}

		let temp = temp_path(output);
		let result = self.write_to(&temp, classes, resources_from)
			.and_then(|()| fs::rename(&temp, output).map_err(anyhow::Error::from));

		if result.is_err() {
			if let Err(e) = fs::remove_file(&temp) {
				if e.kind() != ErrorKind::NotFound {
					warn!("failed to remove temporary file {temp:?}: {e}");
				}
			}
		}
		result.with_context(|| anyhow!("failed to write archive {output:?}"))
	}

	fn write_to(&self, temp: &Path, classes: &[ClassEntry], resources_from: &Path) -> Result<()> {
		let mut zip = ZipWriter::new(File::create(temp)?);
		let mut written = IndexSet::new();

		for class in classes {
			if !written.insert(class.path.clone()) {
				bail!("duplicate entry {:?}", class.path);
			}
			zip.start_file(class.path.as_str(), file_options(class.last_modified))?;
			zip.write_all(&class.bytes)?;
		}

		let mut source = ZipArchive::new(File::open(resources_from)?)
			.with_context(|| anyhow!("failed to open {resources_from:?} as zip archive"))?;

		for index in 0..source.len() {
			let mut file = source.by_index(index)?;
			let path = file.name().to_owned();

			if file.is_dir() || is_class_path(&path) {
				continue;
			}
			if self.mode == NonClassCopyMode::FixMetaInf && is_signature_file(&path) {
				trace!("dropping signature file {path:?}");
				continue;
			}
			if !written.insert(path.clone()) {
				bail!("duplicate entry {path:?}");
			}

			let fix_manifest = self.mode == NonClassCopyMode::FixMetaInf && path == MANIFEST;
			let rewriter = self.rewriters.iter().find(|rewriter| rewriter.claims(&path));

			if !fix_manifest && rewriter.is_none() {
				zip.raw_copy_file(file)?;
				continue;
			}

			let mut data = Vec::new();
			file.read_to_end(&mut data)
				.with_context(|| anyhow!("failed to read entry {path:?}"))?;
			if fix_manifest {
				let manifest = String::from_utf8(data)
					.with_context(|| anyhow!("manifest {path:?} isn't utf8"))?;
				data = strip_manifest(&manifest).into_bytes();
			}
			if let Some(rewriter) = rewriter {
				data = rewriter.rewrite(&path, &data)
					.with_context(|| anyhow!("failed to rewrite entry {path:?}"))?;
			}

			zip.start_file(path.as_str(), file_options(file.last_modified()))?;
			zip.write_all(&data)?;
		}

		zip.finish()?;
		Ok(())
	}
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use crate::writer::{is_signature_file, strip_manifest};

	#[test]
	fn manifest() {
		let manifest = "Manifest-Version: 1.0\r\nMain-Class: a\r\n\r\nName: a.class\r\nSHA-256-Digest: abc\r\n\r\n";
		assert_eq!(strip_manifest(manifest), "Manifest-Version: 1.0\r\nMain-Class: a\r\n\r\n");
		assert_eq!(strip_manifest("Manifest-Version: 1.0\n"), "Manifest-Version: 1.0\r\n\r\n");
	}

	#[test]
	fn signature_files() {
		assert!(is_signature_file("META-INF/FORGE.SF"));
		assert!(is_signature_file("META-INF/FORGE.RSA"));
		assert!(!is_signature_file("META-INF/MANIFEST.MF"));
		assert!(!is_signature_file("META-INF/services/FOO.SF"));
		assert!(!is_signature_file("FOO.SF"));
	}
}
