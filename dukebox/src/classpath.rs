use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexSet;
use log::debug;
use walkdir::WalkDir;
use zip::ZipArchive;
use duke::ClassFile;
use quill::remapper::{ClassHierarchy, SuperClassProvider};
use crate::loader::is_class_path;

/// The super classes and interfaces of all classes on a classpath of jars and class directories.
///
/// This is only ever read after building it.
#[derive(Debug, Clone, Default)]
pub struct ClasspathIndex {
	hierarchy: ClassHierarchy,
}

impl ClasspathIndex {
	pub fn new() -> ClasspathIndex {
		ClasspathIndex::default()
	}

	/// Indexes all the given paths. Classes found on earlier paths win.
	pub fn build<P: AsRef<Path>>(paths: impl IntoIterator<Item=P>) -> Result<ClasspathIndex> {
		let mut index = ClasspathIndex::new();
		for path in paths {
			index.add_path(path.as_ref())?;
		}
		Ok(index)
	}

	/// Adds a jar (or any zip archive) or a directory containing class files.
	pub fn add_path(&mut self, path: &Path) -> Result<()> {
		let before = self.hierarchy.len();
		let result = if path.is_dir() {
			self.add_directory(path)
		} else if path.is_file() {
			self.add_archive(path)
		} else {
			bail!("classpath entry {path:?} doesn't exist");
		};
		result.with_context(|| anyhow!("failed to index classpath entry {path:?}"))?;

		debug!("indexed {} classes from {path:?}", self.hierarchy.len() - before);
		Ok(())
	}

	fn add_directory(&mut self, path: &Path) -> Result<()> {
		for entry in WalkDir::new(path).sort_by_file_name() {
			let entry = entry?;
			let is_class = entry.file_name().to_str().is_some_and(is_class_path);
			if entry.file_type().is_file() && is_class {
				let bytes = fs::read(entry.path())?;
				self.add_class(&bytes)
					.with_context(|| anyhow!("in class file {:?}", entry.path()))?;
			}
		}
		Ok(())
	}

	fn add_archive(&mut self, path: &Path) -> Result<()> {
		let mut archive = ZipArchive::new(File::open(path)?)?;
		for index in 0..archive.len() {
			let mut file = archive.by_index(index)?;
			if file.is_file() && is_class_path(file.name()) {
				let mut bytes = Vec::new();
				file.read_to_end(&mut bytes)?;
				self.add_class(&bytes)
					.with_context(|| anyhow!("in class file {:?}", file.name()))?;
			}
		}
		Ok(())
	}

	fn add_class(&mut self, bytes: &[u8]) -> Result<()> {
		let class = ClassFile::read(bytes)?;
		self.hierarchy.add_class_file(&class)
	}

	pub fn hierarchy(&self) -> &ClassHierarchy {
		&self.hierarchy
	}

	pub fn len(&self) -> usize {
		self.hierarchy.len()
	}

	pub fn is_empty(&self) -> bool {
		self.hierarchy.is_empty()
	}
}

impl SuperClassProvider for ClasspathIndex {
	fn get_super_classes(&self, class: &str) -> Result<Option<&IndexSet<String>>> {
		self.hierarchy.get_super_classes(class)
	}
}
