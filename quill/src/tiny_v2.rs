//! Reading mappings in the "Tiny v2" format.
//!
//! You can read a `.tiny` file using the [`read_file`] method, by passing a path.
//! If you already have a [`Read`]er, you can use the [`read`] method.
//!
//! It's recommended to check that the namespaces are indeed the ones expected.
//! See [`Mappings::check_namespaces`] for more info.
//!
//! Parameters, local variables and comments are accepted, but not kept.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use anyhow::{anyhow, bail, Context, Result};
use crate::lines::{IndentedLines, TinyLine};
use crate::tree::Mappings;

/// Reads a `.tiny` file (tiny v2), by opening the file given by the path.
pub fn read_file(path: impl AsRef<Path>) -> Result<Mappings> {
	let path = path.as_ref();
	let file = File::open(path)
		.with_context(|| anyhow!("failed to open mappings file {path:?}"))?;
	read(file)
		.with_context(|| anyhow!("failed to read mappings file {path:?} as tiny v2 file"))
}

#[allow(clippy::tabs_in_doc_comments)]
/// Reads the tiny v2 format, from the given reader.
///
/// ```
/// # use pretty_assertions::assert_eq;
/// let string = "\
/// tiny	2	0	namespaceA	namespaceB	namespaceC
/// c	A	B	C
/// 	f	LA;	a	b	c
/// 	m	(LA;)V	a		c
/// ";
///
/// let mappings = quill::tiny_v2::read(string.as_bytes()).unwrap();
///
/// mappings.check_namespaces(&["namespaceA", "namespaceB", "namespaceC"]).unwrap();
/// assert_eq!(mappings.classes.len(), 1);
/// assert_eq!(mappings.classes["A"].methods[0].names, vec!["a", "a", "c"]);
/// ```
pub fn read(reader: impl Read) -> Result<Mappings> {
	let mut lines = BufReader::new(reader)
		.lines()
		.enumerate()
		.map(|(line_number, line)| -> Result<TinyLine> {
			TinyLine::new(line_number + 1, &line?)
		})
		.peekable();

	let mut header = lines.next().context("no header line")??;

	if header.first_field != "tiny" || header.next()? != "2" || header.next()? != "0" {
		bail!("header version isn't tiny v2.0, in line {header:?}");
	}
	let header_line_number = header.line_number;
	let namespaces = header.into_fields();
	let mut mappings = Mappings::new(namespaces)
		.with_context(|| anyhow!("in line {header_line_number}"))?;
	let n = mappings.namespaces.len();

	let mut iter = IndentedLines::new(&mut lines);

	let mut escaped_names = false;
	iter.next_level().on_every_line(|_, line| {
		if line.first_field == "escaped-names" {
			escaped_names = true;
		}
		Ok(())
	}).context("reading header properties")?;
	let unescape_one = |name: String| if escaped_names { unescape(&name) } else { Ok(name) };
	let unescape_all = |names: Vec<String>| names.into_iter().map(unescape_one).collect::<Result<Vec<_>>>();

	iter.on_every_line(|iter, mut line| {
		if line.first_field == "c" {
			let names = unescape_all(line.rest(n)?)?;
			let class = mappings.add_class(names)?;

			iter.next_level().on_every_line(|iter, mut line| {
				match line.first_field.as_str() {
					"f" => {
						let desc = unescape_one(line.next()?)?;
						class.add_field(desc, unescape_all(line.rest(n)?)?)?;
					},
					"m" => {
						let desc = unescape_one(line.next()?)?;
						class.add_method(desc, unescape_all(line.rest(n)?)?)?;
					},
					// comments, and anything a newer version might add
					_ => {},
				}
				// parameters, local variables and their comments
				iter.skip_deeper();
				Ok(())
			}).context("reading class sub-sections")
		} else {
			bail!("unknown top level entry {:?}", line.first_field);
		}
	}).context("reading lines")?;

	if let Some(line) = lines.next() {
		bail!("expected end of input, got: {line:?}");
	}

	Ok(mappings)
}

/// Undoes the escapes of names in files with the `escaped-names` property.
fn unescape(name: &str) -> Result<String> {
	if !name.contains('\\') {
		return Ok(name.to_owned());
	}
	let mut unescaped = String::with_capacity(name.len());
	let mut chars = name.chars();
	while let Some(c) = chars.next() {
		if c != '\\' {
			unescaped.push(c);
			continue;
		}
		unescaped.push(match chars.next() {
			Some('\\') => '\\',
			Some('n') => '\n',
			Some('r') => '\r',
			Some('t') => '\t',
			Some('0') => '\0',
			other => bail!("unknown escape sequence {other:?} in {name:?}"),
		});
	}
	Ok(unescaped)
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;

	const INPUT: &str = "tiny\t2\t0\tofficial\tintermediary\tnamed
\tescaped-names
c\ta\tclass_1\tcom/example/A
\tc\ta comment
\tf\tI\tb\tfield_2\tvalue
\tm\t(La;)V\tc\tmethod_3\t
\t\tp\t1\t\t\tother
\t\t\tc\tparameter comment
c\tb\tclass_4\t
";

	#[test]
	fn read() -> Result<()> {
		let mappings = super::read(INPUT.as_bytes())?;
		assert_eq!(mappings.namespaces, vec!["official", "intermediary", "named"]);
		assert_eq!(mappings.classes.len(), 2);

		let a = &mappings.classes["a"];
		assert_eq!(a.names, vec!["a", "class_1", "com/example/A"]);
		assert_eq!(a.fields[&("b".to_owned(), "I".to_owned())].names, vec!["b", "field_2", "value"]);
		assert_eq!(a.methods[&("c".to_owned(), "(La;)V".to_owned())].names, vec!["c", "method_3", "method_3"]);

		assert_eq!(mappings.classes["b"].names, vec!["b", "class_4", "class_4"]);
		Ok(())
	}

	#[test]
	fn escaped_names() -> Result<()> {
		let input = "tiny\t2\t0\ta\tb
\tescaped-names
c\tx\\ty\tname\\\\with\\nlines
\tf\tLx\\ty;\tf\tnul\\0
";
		let mappings = super::read(input.as_bytes())?;
		let x = &mappings.classes["x\ty"];
		assert_eq!(x.names, vec!["x\ty", "name\\with\nlines"]);
		assert_eq!(x.fields[&("f".to_owned(), "Lx\ty;".to_owned())].names, vec!["f", "nul\0"]);

		let wrong_escape = "tiny\t2\t0\ta\tb\n\tescaped-names\nc\tx\\q\ty\n";
		assert!(super::read(wrong_escape.as_bytes()).is_err());
		Ok(())
	}

	#[test]
	fn backslashes_kept_without_escaped_names() -> Result<()> {
		let input = "tiny\t2\t0\ta\tb\nc\tx\\ty\tz\n";
		let mappings = super::read(input.as_bytes())?;
		assert_eq!(mappings.classes["x\\ty"].names, vec!["x\\ty", "z"]);
		Ok(())
	}

	#[test]
	fn errors_name_the_line() {
		let wrong_count = "tiny\t2\t0\ta\tb\nc\tx\ty\tz\n";
		let error = super::read(wrong_count.as_bytes()).unwrap_err();
		assert!(format!("{error:#}").contains("in line 2"), "{error:#}");

		let wrong_indent = "tiny\t2\t0\ta\tb\nc\tx\ty\n\t\tf\tI\tb\tc\n";
		assert!(super::read(wrong_indent.as_bytes()).is_err());

		let wrong_header = "tiny\t3\t0\ta\tb\n";
		assert!(super::read(wrong_header.as_bytes()).is_err());

		let duplicate = "tiny\t2\t0\ta\tb\nc\tx\ty\nc\tx\tz\n";
		assert!(super::read(duplicate.as_bytes()).is_err());
	}
}
