//! Reading all class entries of an archive into memory, on a worker pool.

use std::fmt::{Debug, Formatter};
use std::fs::{self, File};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use anyhow::{anyhow, Context, Result};
use log::debug;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use zip::result::ZipError;
use zip::{DateTime, ZipArchive};
use duke::ClassFile;
use quill::remapper::ClassHierarchy;

const CLASS_SUFFIX: &str = ".class";

pub(crate) fn is_class_path(path: &str) -> bool {
	path.ends_with(CLASS_SUFFIX)
}

/// One class file of an archive.
///
/// The [`Debug`] implementation doesn't print the contents.
#[derive(Clone, PartialEq, Eq)]
pub struct ClassEntry {
	/// The path of the entry inside the archive, like `com/example/A.class`.
	pub path: String,
	pub bytes: Vec<u8>,
	pub last_modified: Option<DateTime>,
}

impl Debug for ClassEntry {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClassEntry")
			.field("path", &self.path)
			.field("len", &self.bytes.len())
			.finish_non_exhaustive()
	}
}

impl ClassEntry {
	/// The path this entry gets if the class it holds is renamed from `old` to `new`.
	///
	/// Entries in a prefix directory (like `META-INF/versions/9/`) keep that prefix. If the path doesn't end in the
	/// old class name, it isn't changed.
	pub fn renamed_path(&self, old: &str, new: &str) -> String {
		self.path.strip_suffix(CLASS_SUFFIX)
			.and_then(|stem| stem.strip_suffix(old))
			.filter(|prefix| prefix.is_empty() || prefix.ends_with('/'))
			.map_or_else(|| self.path.clone(), |prefix| format!("{prefix}{new}{CLASS_SUFFIX}"))
	}
}

/// The class entries of an archive, in memory, sorted by path.
///
/// All other entries stay in the source archive, and get copied from there when writing.
#[derive(Debug, Clone)]
pub struct ArchiveImage {
	source: PathBuf,
	classes: Vec<ClassEntry>,
}

impl ArchiveImage {
	pub fn new(source: PathBuf, mut classes: Vec<ClassEntry>) -> ArchiveImage {
		classes.sort_by(|a, b| a.path.cmp(&b.path));
		ArchiveImage { source, classes }
	}

	/// The archive this was loaded from.
	pub fn source(&self) -> &Path {
		&self.source
	}

	pub fn classes(&self) -> &[ClassEntry] {
		&self.classes
	}

	pub fn len(&self) -> usize {
		self.classes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.classes.is_empty()
	}

	/// Reads a non class entry from the source archive, giving `None` if there's no such entry.
	pub fn read_resource(&self, name: &str) -> Result<Option<Vec<u8>>> {
		let file = File::open(&self.source)
			.with_context(|| anyhow!("failed to open archive {:?}", self.source))?;
		let mut archive = ZipArchive::new(file)
			.with_context(|| anyhow!("failed to open {:?} as zip archive", self.source))?;

		let mut file = match archive.by_name(name) {
			Ok(file) => file,
			Err(ZipError::FileNotFound) => return Ok(None),
			Err(e) => return Err(anyhow!("could not get file {name} from {:?}: {e}", self.source)),
		};
		let mut data = Vec::new();
		file.read_to_end(&mut data)
			.with_context(|| anyhow!("failed to read entry {name:?} of {:?}", self.source))?;
		Ok(Some(data))
	}

	/// Parses every class and collects its super class and interfaces.
	pub fn hierarchy(&self) -> Result<ClassHierarchy> {
		let mut hierarchy = ClassHierarchy::new();
		for entry in &self.classes {
			let class = ClassFile::read(&entry.bytes)
				.with_context(|| anyhow!("failed to read class {:?} of {:?}", entry.path, self.source))?;
			hierarchy.add_class_file(&class)?;
		}
		Ok(hierarchy)
	}
}

/// Loads archives into [`ArchiveImage`]s, reading the class entries on a bounded worker pool.
#[derive(Debug)]
pub struct ArchiveLoader {
	pool: ThreadPool,
}

impl ArchiveLoader {
	/// Creates a loader with `threads` workers, or one per available core for `None`.
	pub fn new(threads: Option<usize>) -> Result<ArchiveLoader> {
		let mut builder = ThreadPoolBuilder::new()
			.thread_name(|index| format!("dukebox-worker-{index}"));
		if let Some(threads) = threads {
			builder = builder.num_threads(threads);
		}
		let pool = builder.build()
			.context("failed to create worker pool")?;
		Ok(ArchiveLoader { pool })
	}

	/// The worker pool, for other work that should run with the same bound.
	pub fn pool(&self) -> &ThreadPool {
		&self.pool
	}

	/// Reads all class entries of the archive. Fails if any entry can't be read, in that case nothing is returned.
	pub fn load(&self, path: impl AsRef<Path>) -> Result<ArchiveImage> {
		let path = path.as_ref();
		let data = fs::read(path)
			.with_context(|| anyhow!("failed to read archive {path:?}"))?;
		let archive = ZipArchive::new(Cursor::new(data.as_slice()))
			.with_context(|| anyhow!("failed to open {path:?} as zip archive"))?;

		let indices: Vec<usize> = (0..archive.len())
			.filter(|&index| archive.name_for_index(index).is_some_and(is_class_path))
			.collect();

		let classes = Mutex::new(Vec::with_capacity(indices.len()));
		self.pool.install(|| {
			indices.par_iter().try_for_each_init(
				|| archive.clone(),
				|archive, &index| -> Result<()> {
					let entry = read_class_entry(archive, index)?;
					classes.lock()
						.map_err(|_| anyhow!("another worker panicked while adding a class entry"))?
						.push(entry);
					Ok(())
				},
			)
		}).with_context(|| anyhow!("failed to read class entries of {path:?}"))?;

		let classes = classes.into_inner()
			.map_err(|_| anyhow!("another worker panicked while adding a class entry"))?;
		debug!("read {} class entries from {path:?}", classes.len());

		Ok(ArchiveImage::new(path.to_owned(), classes))
	}
}

fn read_class_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, index: usize) -> Result<ClassEntry> {
	let mut file = archive.by_index(index)
		.with_context(|| anyhow!("failed to open entry {index}"))?;

	let mut bytes = Vec::with_capacity(initial_capacity(file.size()));
	file.read_to_end(&mut bytes)
		.with_context(|| anyhow!("failed to read entry {:?}", file.name()))?;

	Ok(ClassEntry {
		path: file.name().to_owned(),
		bytes,
		last_modified: file.last_modified(),
	})
}

/// The size in the archive header can't be trusted, so at most 1 MiB is allocated up front.
fn initial_capacity(claimed: u64) -> usize {
	claimed.min(1 << 20) as usize
}
