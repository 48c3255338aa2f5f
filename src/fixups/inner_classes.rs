//! Renaming inner classes that aren't mapped themselves, along with their owner.
//!
//! Some inner classes only exist in a patched archive, or were left out of the mappings. Without this, `a$b` stays
//! `a$b` while `a` becomes `net/minecraft/Foo`, and the two end up in different packages. The owner of an inner class
//! can only be read from the `InnerClasses` attributes before remapping, so the owners are collected from the source
//! archive.

use anyhow::{anyhow, Context, Result};
use indexmap::{IndexMap, IndexSet};
use duke::ClassFile;
use dukebox::ArchiveImage;
use quill::table::MappingTable;

/// The owners of the inner classes of an archive, with names in the namespace of the archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InnerClassOwners {
	classes: IndexSet<String>,
	owners: IndexMap<String, String>,
}

impl InnerClassOwners {
	pub fn from_image(image: &ArchiveImage) -> Result<InnerClassOwners> {
		let mut result = InnerClassOwners::default();
		for entry in image.classes() {
			let class = ClassFile::read(&entry.bytes)
				.with_context(|| anyhow!("failed to read class {:?}", entry.path))?;
			result.classes.insert(class.name()?);
			for inner in class.inner_classes()? {
				if let Some(outer) = inner.outer_class {
					result.owners.entry(inner.inner_class).or_insert(outer);
				}
			}
		}
		Ok(result)
	}

	/// The owner of a class, from the `InnerClasses` attributes or else from the last `$` in the name.
	pub fn owner_of<'a>(&'a self, class: &'a str) -> Option<&'a str> {
		self.owners.get(class)
			.map(String::as_str)
			.or_else(|| class.rsplit_once('$').map(|(owner, _)| owner))
			.filter(|owner| !owner.is_empty())
	}

	fn renamed(&self, table: &MappingTable, class: &str) -> Option<String> {
		if let Some(name) = table.get_class(class) {
			return Some(name.to_owned());
		}
		let owner = self.owner_of(class)?;
		let inner = class.strip_prefix(owner).filter(|inner| inner.starts_with('$'))?;
		let new_owner = self.renamed(table, owner)?;
		Some(format!("{new_owner}{inner}"))
	}

	/// Gives the renames for all classes of the archive not renamed by `table` whose owner is renamed.
	pub fn fixup_table(&self, table: &MappingTable) -> MappingTable {
		let mut fixups = MappingTable::new(table.from(), table.to());
		for class in &self.classes {
			if table.get_class(class).is_some() {
				continue;
			}
			if let Some(new_name) = self.renamed(table, class) {
				fixups.insert_class(class, &new_name);
			}
		}
		fixups
	}
}
