use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use anyhow::{bail, Result};
use pretty_assertions::assert_eq;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};
use duke::ClassFile;
use quill::remapper::SuperClassProvider;
use dukebox::{ArchiveLoader, ArchiveWriter, ClasspathIndex, NonClassCopyMode, ResourceRewriter};

const MANIFEST: &str = "Manifest-Version: 1.0\r\n\r\nName: a.class\r\nSHA-256-Digest: abc\r\n\r\n";

fn class(name: &str, super_class: &str) -> Result<Vec<u8>> {
	ClassFile::new(52, 0x21, name, Some(super_class))?.to_bytes()
}

fn write_jar(path: &Path) -> Result<()> {
	let mut zip = ZipWriter::new(File::create(path)?);
	let options = SimpleFileOptions::default();

	zip.start_file("META-INF/MANIFEST.MF", options)?;
	zip.write_all(MANIFEST.as_bytes())?;
	zip.start_file("META-INF/SIGNER.SF", options)?;
	zip.write_all(b"signature")?;
	zip.add_directory("assets/", options)?;
	zip.start_file("assets/data.txt", options)?;
	zip.write_all(b"some data")?;
	zip.start_file("b.class", options)?;
	zip.write_all(&class("b", "a")?)?;
	zip.start_file("a.class", options)?;
	zip.write_all(&class("a", "java/lang/Object")?)?;

	zip.finish()?;
	Ok(())
}

fn entries(path: &Path) -> Result<Vec<(String, Vec<u8>)>> {
	let mut archive = ZipArchive::new(File::open(path)?)?;
	let mut entries = Vec::new();
	for index in 0..archive.len() {
		let mut file = archive.by_index(index)?;
		let mut data = Vec::new();
		file.read_to_end(&mut data)?;
		entries.push((file.name().to_owned(), data));
	}
	Ok(entries)
}

fn names(entries: &[(String, Vec<u8>)]) -> Vec<&str> {
	entries.iter().map(|(name, _)| name.as_str()).collect()
}

#[test]
fn load() -> Result<()> {
	let dir = tempfile::tempdir()?;
	let jar = dir.path().join("input.jar");
	write_jar(&jar)?;

	let image = ArchiveLoader::new(Some(2))?.load(&jar)?;
	let paths: Vec<&str> = image.classes().iter().map(|entry| entry.path.as_str()).collect();
	assert_eq!(paths, ["a.class", "b.class"]);
	assert_eq!(image.classes()[1].bytes, class("b", "a")?);

	let hierarchy = image.hierarchy()?;
	let supers: Vec<&String> = hierarchy.get_super_classes("b")?.unwrap().iter().collect();
	assert_eq!(supers, ["a"]);

	assert_eq!(image.read_resource("assets/data.txt")?, Some(b"some data".to_vec()));
	assert_eq!(image.read_resource("missing.txt")?, None);
	Ok(())
}

#[test]
fn load_fails() -> Result<()> {
	let dir = tempfile::tempdir()?;
	let loader = ArchiveLoader::new(None)?;

	assert!(loader.load(dir.path().join("missing.jar")).is_err());

	let not_a_jar = dir.path().join("text.jar");
	fs::write(&not_a_jar, "not a zip archive")?;
	assert!(loader.load(&not_a_jar).is_err());
	Ok(())
}

#[test]
fn write_unchanged() -> Result<()> {
	let dir = tempfile::tempdir()?;
	let jar = dir.path().join("input.jar");
	write_jar(&jar)?;
	let image = ArchiveLoader::new(None)?.load(&jar)?;

	let output = dir.path().join("out/output.jar");
	ArchiveWriter::new(NonClassCopyMode::Unchanged).write(&output, image.classes(), image.source())?;

	let entries = entries(&output)?;
	assert_eq!(names(&entries), ["a.class", "b.class", "META-INF/MANIFEST.MF", "META-INF/SIGNER.SF", "assets/data.txt"]);
	assert_eq!(entries[2].1, MANIFEST.as_bytes());
	assert!(!dir.path().join("out/output.jar.tmp").exists());
	Ok(())
}

#[test]
fn write_fix_meta_inf() -> Result<()> {
	let dir = tempfile::tempdir()?;
	let jar = dir.path().join("input.jar");
	write_jar(&jar)?;
	let image = ArchiveLoader::new(None)?.load(&jar)?;

	let output = dir.path().join("output.jar");
	ArchiveWriter::new(NonClassCopyMode::FixMetaInf).write(&output, image.classes(), image.source())?;

	let entries = entries(&output)?;
	assert_eq!(names(&entries), ["a.class", "b.class", "META-INF/MANIFEST.MF", "assets/data.txt"]);
	assert_eq!(entries[2].1, b"Manifest-Version: 1.0\r\n\r\n");
	Ok(())
}

struct Upper;

impl ResourceRewriter for Upper {
	fn claims(&self, path: &str) -> bool {
		path.ends_with(".txt")
	}

	fn rewrite(&self, _path: &str, data: &[u8]) -> Result<Vec<u8>> {
		Ok(data.to_ascii_uppercase())
	}
}

struct Broken;

impl ResourceRewriter for Broken {
	fn claims(&self, _path: &str) -> bool {
		true
	}

	fn rewrite(&self, path: &str, _data: &[u8]) -> Result<Vec<u8>> {
		bail!("can't rewrite {path}")
	}
}

#[test]
fn rewriters() -> Result<()> {
	let dir = tempfile::tempdir()?;
	let jar = dir.path().join("input.jar");
	write_jar(&jar)?;
	let image = ArchiveLoader::new(None)?.load(&jar)?;

	let output = dir.path().join("output.jar");
	ArchiveWriter::new(NonClassCopyMode::Unchanged)
		.with_rewriter(&Upper)
		.write(&output, image.classes(), image.source())?;
	let entries = entries(&output)?;
	assert_eq!(entries[4], ("assets/data.txt".to_owned(), b"SOME DATA".to_vec()));

	let broken = dir.path().join("broken.jar");
	let result = ArchiveWriter::new(NonClassCopyMode::Unchanged)
		.with_rewriter(&Broken)
		.write(&broken, image.classes(), image.source());
	assert!(result.is_err());
	assert!(!broken.exists());
	assert!(!dir.path().join("broken.jar.tmp").exists());
	Ok(())
}

#[test]
fn classpath() -> Result<()> {
	let dir = tempfile::tempdir()?;
	let jar = dir.path().join("library.jar");
	write_jar(&jar)?;

	let classes = dir.path().join("classes/c");
	fs::create_dir_all(&classes)?;
	fs::write(classes.join("D.class"), class("c/D", "b")?)?;
	fs::write(classes.join("notes.txt"), "not a class")?;

	let index = ClasspathIndex::build([jar.clone(), dir.path().join("classes")])?;
	assert_eq!(index.len(), 3);
	let supers: Vec<&String> = index.get_super_classes("c/D")?.unwrap().iter().collect();
	assert_eq!(supers, ["b"]);
	assert!(index.get_super_classes("e")?.is_none());

	assert!(ClasspathIndex::build([dir.path().join("missing.jar")]).is_err());
	Ok(())
}
