//! Remapping names inside data files of the archive that mirror class and member names.
//!
//! These are the access transformer (`META-INF/accesstransformer.cfg`) and the coremod scripts listed in
//! `META-INF/coremods.json`. Both are written with the names of the penultimate namespace.

use std::collections::HashMap;
use anyhow::{anyhow, Context, Result};
use indexmap::IndexSet;
use log::debug;
use duke::remapper::ClassRemapper;
use dukebox::{ArchiveImage, ResourceRewriter};
use quill::access_transform::{format_entry, parse_entry, Target};
use quill::table::MappingTable;

pub const ACCESS_TRANSFORMER: &str = "META-INF/accesstransformer.cfg";
pub const COREMODS: &str = "META-INF/coremods.json";

/// A [`ResourceRewriter`] for the access transformer and the coremod scripts.
#[derive(Debug, Clone)]
pub struct AuxiliaryFileRemapper {
	table: MappingTable,
	coremods: IndexSet<String>,
}

impl AuxiliaryFileRemapper {
	pub fn new(table: MappingTable, coremods: IndexSet<String>) -> AuxiliaryFileRemapper {
		AuxiliaryFileRemapper { table, coremods }
	}

	/// Reads the list of coremod scripts of the archive.
	pub fn for_image(table: MappingTable, image: &ArchiveImage) -> Result<AuxiliaryFileRemapper> {
		let coremods = match image.read_resource(COREMODS)? {
			Some(json) => {
				let scripts: HashMap<String, String> = serde_json::from_slice(&json)
					.with_context(|| anyhow!("failed to parse {COREMODS:?}"))?;
				let mut scripts: Vec<String> = scripts.into_values().collect();
				scripts.sort();
				scripts.into_iter().collect()
			},
			None => IndexSet::new(),
		};
		debug!("found {} coremod scripts", coremods.len());
		Ok(AuxiliaryFileRemapper::new(table, coremods))
	}

	fn remap_target(&self, target: Target) -> Result<Target> {
		Ok(match target {
			Target::Class(class) => Target::Class(self.table.map_class(&class)?),
			Target::Method { class, name, desc } => Target::Method {
				name: self.table.get_method(&class, &name, &desc)
					.or_else(|| self.table.get_method_by_name(&class, &name))
					.unwrap_or(&name)
					.to_owned(),
				desc: self.table.map_desc(&desc)?,
				class: self.table.map_class(&class)?,
			},
			Target::Field { class, name } => Target::Field {
				name: self.table.get_field_by_name(&class, &name)
					.unwrap_or(&name)
					.to_owned(),
				class: self.table.map_class(&class)?,
			},
		})
	}

	/// Remaps every entry line, keeping comments and blank lines.
	pub fn remap_access_transformer(&self, text: &str) -> Result<String> {
		let mut result = String::with_capacity(text.len());
		for (index, line) in text.lines().enumerate() {
			let (entry, comment) = match line.split_once('#') {
				Some((entry, comment)) => (entry, Some(comment)),
				None => (line, None),
			};
			let parsed = parse_entry(entry)
				.with_context(|| anyhow!("in line {}", index + 1))?;
			match parsed {
				Some((target, transform)) => {
					result.push_str(&format_entry(&self.remap_target(target)?, transform));
					if let Some(comment) = comment {
						result.push_str(" #");
						result.push_str(comment);
					}
				},
				None => result.push_str(line),
			}
			result.push('\n');
		}
		Ok(result)
	}

	/// Replaces string literals that are class names, in either `a/b/C` or `a.b.C` form.
	pub fn remap_coremod(&self, script: &str) -> String {
		let mut result = String::with_capacity(script.len());
		let mut rest = script;
		while let Some(start) = rest.find(|c: char| c == '"' || c == '\'') {
			let quote = &rest[start..=start];
			let Some(length) = rest[start + 1..].find(quote) else {
				break;
			};
			let literal = &rest[start + 1..start + 1 + length];

			result.push_str(&rest[..=start]);
			result.push_str(&self.remap_literal(literal));
			result.push_str(quote);
			rest = &rest[start + 2 + length..];
		}
		result.push_str(rest);
		result
	}

	fn remap_literal(&self, literal: &str) -> String {
		if let Some(class) = self.table.get_class(literal) {
			return class.to_owned();
		}
		if literal.contains('.') {
			if let Some(class) = self.table.get_class(&literal.replace('.', "/")) {
				return class.replace('/', ".");
			}
		}
		literal.to_owned()
	}
}

impl ResourceRewriter for AuxiliaryFileRemapper {
	fn claims(&self, path: &str) -> bool {
		path == ACCESS_TRANSFORMER || self.coremods.contains(path)
	}

	fn rewrite(&self, path: &str, data: &[u8]) -> Result<Vec<u8>> {
		let text = std::str::from_utf8(data)
			.with_context(|| anyhow!("{path:?} isn't utf8"))?;
		let text = if path == ACCESS_TRANSFORMER {
			self.remap_access_transformer(text)?
		} else {
			self.remap_coremod(text)
		};
		Ok(text.into_bytes())
	}
}
