//! Reading access widener files.
//!
//! An access widener file looks like this:
//! ```txt
//! accessWidener v1 named
//! accessible class net/minecraft/Foo
//! extendable method net/minecraft/Foo bar ()V # comment
//! mutable field net/minecraft/Foo baz I
//! ```
//!
//! The header is read by [`read`]. The entries are then read lazily, one line at a time, by iterating over the
//! [`AccessWidenerReader`]. Every error is an [`AccessWidenerError`] (with the line number as context), so it can
//! be told apart from IO errors with `downcast_ref`.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Read};
use std::iter::Enumerate;
use std::path::Path;
use anyhow::{anyhow, Context, Result};
use thiserror::Error;

const MARKER: &str = "accessWidener";
const VERSION: &str = "v1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessWidenerError {
	#[error("empty access widener, there's no header")]
	MissingHeader,
	#[error("header does not have three fields, got {0:?}")]
	HeaderFieldCount(Vec<String>),
	#[error("not an access widener, header starts with {0:?}")]
	NotAnAccessWidener(String),
	#[error("unsupported access widener version {0:?}, only v1 is supported")]
	UnsupportedVersion(String),
	#[error("unknown entry type {0:?}")]
	UnknownEntryType(String),
	#[error("invalid length for {kind} entry: expected {expected} fields, got {got}")]
	FieldCount { kind: &'static str, expected: usize, got: usize },
	#[error("unknown {kind} access {access:?}")]
	UnknownAccess { kind: &'static str, access: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassAccess {
	Accessible,
	Extendable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodAccess {
	Accessible,
	Extendable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldAccess {
	Accessible,
	Mutable,
}

/// One line of an access widener file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccessWidening {
	Class { name: String, access: ClassAccess },
	Method { class: String, name: String, descriptor: String, access: MethodAccess },
	Field { class: String, name: String, descriptor: String, access: FieldAccess },
}

/// What [`AccessWidenerReader::accept`] gives to its callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessWidenerEvent {
	Header { namespace: String },
	Entry(AccessWidening),
}

/// Reads the entries of an access widener, one line at a time.
///
/// The reader is fused: after the first error, no more entries are given out. Dropping this closes the underlying
/// reader.
#[derive(Debug)]
pub struct AccessWidenerReader<R> {
	lines: Enumerate<Lines<BufReader<R>>>,
	namespace: String,
	failed: bool,
}

/// Opens the access widener at the given path, and reads its header.
pub fn read_file(path: impl AsRef<Path>) -> Result<AccessWidenerReader<File>> {
	let path = path.as_ref();
	let file = File::open(path)
		.with_context(|| anyhow!("failed to open access widener {path:?}"))?;
	read(file)
		.with_context(|| anyhow!("failed to read access widener {path:?}"))
}

/// Reads the header, giving back a reader for the entries.
pub fn read<R: Read>(reader: R) -> Result<AccessWidenerReader<R>> {
	let mut lines = BufReader::new(reader).lines().enumerate();

	let Some((_, header)) = lines.next() else {
		return Err(AccessWidenerError::MissingHeader.into());
	};
	let namespace = parse_header(&header?)
		.context("in line 1")?;

	Ok(AccessWidenerReader { lines, namespace, failed: false })
}

fn parse_header(line: &str) -> Result<String, AccessWidenerError> {
	let fields: Vec<&str> = line.split_whitespace().collect();
	let &[marker, version, namespace] = fields.as_slice() else {
		return Err(AccessWidenerError::HeaderFieldCount(fields.iter().map(|&x| x.to_owned()).collect()));
	};
	if marker != MARKER {
		return Err(AccessWidenerError::NotAnAccessWidener(marker.to_owned()));
	}
	if version != VERSION {
		return Err(AccessWidenerError::UnsupportedVersion(version.to_owned()));
	}
	Ok(namespace.to_owned())
}

/// Parses one line, after removing comments, giving `None` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<AccessWidening>, AccessWidenerError> {
	let line = line.split_once('#').map_or(line, |(before, _)| before);
	let fields: Vec<&str> = line.split_whitespace().collect();
	if fields.is_empty() {
		return Ok(None);
	}

	let entry_type = fields.get(1).copied().unwrap_or("");
	let widening = match entry_type {
		"class" => {
			let [access, _, name] = expect_fields::<3>(&fields, "class")?;
			AccessWidening::Class { name: name.to_owned(), access: parse_class_access(access)? }
		},
		"method" => {
			let [access, _, class, name, descriptor] = expect_fields::<5>(&fields, "method")?;
			AccessWidening::Method {
				class: class.to_owned(),
				name: name.to_owned(),
				descriptor: descriptor.to_owned(),
				access: parse_method_access(access)?,
			}
		},
		"field" => {
			let [access, _, class, name, descriptor] = expect_fields::<5>(&fields, "field")?;
			AccessWidening::Field {
				class: class.to_owned(),
				name: name.to_owned(),
				descriptor: descriptor.to_owned(),
				access: parse_field_access(access)?,
			}
		},
		other => return Err(AccessWidenerError::UnknownEntryType(other.to_owned())),
	};
	Ok(Some(widening))
}

fn expect_fields<'a, const N: usize>(fields: &[&'a str], kind: &'static str) -> Result<[&'a str; N], AccessWidenerError> {
	<[&str; N]>::try_from(fields)
		.map_err(|_| AccessWidenerError::FieldCount { kind, expected: N, got: fields.len() })
}

fn parse_class_access(access: &str) -> Result<ClassAccess, AccessWidenerError> {
	match access {
		"accessible" => Ok(ClassAccess::Accessible),
		"extendable" => Ok(ClassAccess::Extendable),
		_ => Err(AccessWidenerError::UnknownAccess { kind: "class", access: access.to_owned() }),
	}
}

fn parse_method_access(access: &str) -> Result<MethodAccess, AccessWidenerError> {
	match access {
		"accessible" => Ok(MethodAccess::Accessible),
		"extendable" => Ok(MethodAccess::Extendable),
		_ => Err(AccessWidenerError::UnknownAccess { kind: "method", access: access.to_owned() }),
	}
}

fn parse_field_access(access: &str) -> Result<FieldAccess, AccessWidenerError> {
	match access {
		"accessible" => Ok(FieldAccess::Accessible),
		"mutable" => Ok(FieldAccess::Mutable),
		_ => Err(AccessWidenerError::UnknownAccess { kind: "field", access: access.to_owned() }),
	}
}

impl<R: Read> AccessWidenerReader<R> {
	/// The namespace given in the header.
	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	/// Gives the header and then every entry, in file order, to `visitor`.
	pub fn accept(self, mut visitor: impl FnMut(AccessWidenerEvent) -> Result<()>) -> Result<()> {
		visitor(AccessWidenerEvent::Header { namespace: self.namespace.clone() })?;
		for widening in self {
			visitor(AccessWidenerEvent::Entry(widening?))?;
		}
		Ok(())
	}
}

impl<R: Read> Iterator for AccessWidenerReader<R> {
	type Item = Result<AccessWidening>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.failed {
			return None;
		}
		for (index, line) in self.lines.by_ref() {
			let line_number = index + 1;
			let result = line
				.map_err(anyhow::Error::from)
				.and_then(|line| parse_line(&line).map_err(anyhow::Error::from))
				.with_context(|| anyhow!("in line {line_number}"));
			match result {
				Ok(None) => continue,
				Ok(Some(widening)) => return Some(Ok(widening)),
				Err(e) => {
					self.failed = true;
					return Some(Err(e));
				},
			}
		}
		None
	}
}
