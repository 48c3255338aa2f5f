use std::cmp::Ordering;
use std::iter::Peekable;
use anyhow::{anyhow, bail, Context, Result};

/// One line of a tab separated, tab indented file.
#[derive(Debug)]
pub(crate) struct TinyLine {
	pub(crate) line_number: usize,
	pub(crate) idents: usize,
	pub(crate) first_field: String,
	fields: std::vec::IntoIter<String>,
}

impl TinyLine {
	pub(crate) fn new(line_number: usize, line: &str) -> Result<TinyLine> {
		let rest = line.trim_start_matches('\t');
		// a tab is one byte, so this is fine for slicing
		let idents = line.len() - rest.len();

		let mut fields = rest.split('\t').map(|x| x.to_owned());

		let first_field = fields.next()
			.with_context(|| anyhow!("no first field in line {line_number}"))?;

		Ok(TinyLine {
			line_number,
			idents,
			first_field,
			fields: fields.collect::<Vec<_>>().into_iter(),
		})
	}

	pub(crate) fn next(&mut self) -> Result<String> {
		self.fields.next()
			.with_context(|| anyhow!("expected another field in line {}: {self:?}", self.line_number))
	}

	pub(crate) fn into_fields(self) -> Vec<String> {
		self.fields.collect()
	}

	/// Gives back all remaining fields, checking that there are exactly `n` of them.
	pub(crate) fn rest(self, n: usize) -> Result<Vec<String>> {
		let fields: Vec<String> = self.fields.collect();
		if fields.len() != n {
			bail!("line {} contained {} names, but there are {n} namespaces: {fields:?}", self.line_number, fields.len());
		}
		Ok(fields)
	}
}

/// Iterates over the lines with exactly `depth` indentation, stopping at the first line with less.
pub(crate) struct IndentedLines<'a, I: Iterator> {
	depth: usize,
	iter: &'a mut Peekable<I>,
}

impl<'a, I> IndentedLines<'a, I>
where
	I: Iterator<Item=Result<TinyLine>>,
{
	pub(crate) fn new(iter: &'a mut Peekable<I>) -> IndentedLines<'a, I> {
		IndentedLines { depth: 0, iter }
	}

	pub(crate) fn next_level(&mut self) -> IndentedLines<'_, I> {
		IndentedLines {
			depth: self.depth + 1,
			iter: self.iter,
		}
	}

	/// Skips all lines that are indented deeper than this level, like sub-sections nobody is interested in.
	pub(crate) fn skip_deeper(&mut self) {
		while let Some(Ok(line)) = self.iter.peek() {
			if line.idents <= self.depth {
				break;
			}
			self.iter.next();
		}
	}

	pub(crate) fn on_every_line(mut self, mut f: impl FnMut(&mut Self, TinyLine) -> Result<()>) -> Result<()> {
		while let Some(line) = self.next() {
			let line = line?;
			let line_number = line.line_number;

			f(&mut self, line)
				.with_context(|| anyhow!("in line {line_number}"))?;
		}
		Ok(())
	}
}

impl<I> Iterator for IndentedLines<'_, I>
where
	I: Iterator<Item=Result<TinyLine>>,
{
	type Item = Result<TinyLine>;

	fn next(&mut self) -> Option<Self::Item> {
		match self.iter.peek()? {
			Ok(line) => match line.idents.cmp(&self.depth) {
				Ordering::Less => None,
				Ordering::Equal => self.iter.next(),
				Ordering::Greater => Some(Err(anyhow!("expected an indentation of {} for line {}: {line:?}", self.depth, line.line_number))),
			},
			Err(_) => self.iter.next(),
		}
	}
}
