//! An in memory mapping tree with any number of namespaces.
//!
//! Every class, field and method has one name per namespace. Descriptors are only stored in the first namespace,
//! see [`MappingTable::from_mappings`][crate::table::MappingTable::from_mappings] for how to get them in others.

use anyhow::{anyhow, bail, Result};
use indexmap::IndexMap;
use indexmap::map::Entry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mappings {
	pub namespaces: Vec<String>,
	/// Keyed by the name in the first namespace.
	pub classes: IndexMap<String, ClassMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMapping {
	pub names: Vec<String>,
	/// Keyed by name and descriptor in the first namespace.
	pub fields: IndexMap<(String, String), MemberMapping>,
	/// Keyed by name and descriptor in the first namespace.
	pub methods: IndexMap<(String, String), MemberMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberMapping {
	/// The descriptor in the first namespace.
	pub desc: String,
	pub names: Vec<String>,
}

/// Fills in names missing in a namespace with the name of the namespace before, so that a missing name means "not
/// renamed".
pub(crate) fn complete_names(names: Vec<String>) -> Result<Vec<String>> {
	let mut completed: Vec<String> = Vec::with_capacity(names.len());
	for name in names {
		if !name.is_empty() {
			completed.push(name);
		} else if let Some(last) = completed.last() {
			completed.push(last.clone());
		} else {
			bail!("name in the first namespace must not be empty");
		}
	}
	Ok(completed)
}

impl Mappings {
	pub fn new(namespaces: Vec<String>) -> Result<Mappings> {
		if namespaces.len() < 2 {
			bail!("mappings need at least two namespaces, got {namespaces:?}");
		}
		for (i, namespace) in namespaces.iter().enumerate() {
			if namespaces[..i].contains(namespace) {
				bail!("duplicate namespace {namespace:?} in {namespaces:?}");
			}
		}
		Ok(Mappings { namespaces, classes: IndexMap::new() })
	}

	pub fn namespace(&self, name: &str) -> Result<usize> {
		self.namespaces.iter()
			.position(|x| x == name)
			.ok_or_else(|| anyhow!("cannot find namespace {name:?}, only got {:?}", self.namespaces))
	}

	/// Checks that all of the given namespaces are present.
	pub fn check_namespaces(&self, expected: &[&str]) -> Result<()> {
		for namespace in expected {
			self.namespace(namespace)?;
		}
		Ok(())
	}

	/// Adds a class. Empty names are filled in from the namespace before.
	pub fn add_class(&mut self, names: Vec<String>) -> Result<&mut ClassMapping> {
		let names = self.check_names(names)?;
		match self.classes.entry(names[0].clone()) {
			Entry::Occupied(e) => bail!("cannot add class {names:?}, there's already {:?}", e.get().names),
			Entry::Vacant(e) => Ok(e.insert(ClassMapping {
				names,
				fields: IndexMap::new(),
				methods: IndexMap::new(),
			})),
		}
	}

	fn check_names(&self, names: Vec<String>) -> Result<Vec<String>> {
		if names.len() != self.namespaces.len() {
			bail!("expected {} names, got {names:?}", self.namespaces.len());
		}
		complete_names(names)
	}
}

impl ClassMapping {
	pub fn add_field(&mut self, desc: String, names: Vec<String>) -> Result<&mut MemberMapping> {
		add_member(&mut self.fields, "field", desc, names)
	}

	pub fn add_method(&mut self, desc: String, names: Vec<String>) -> Result<&mut MemberMapping> {
		add_member(&mut self.methods, "method", desc, names)
	}
}

fn add_member<'a>(
	members: &'a mut IndexMap<(String, String), MemberMapping>,
	kind: &str,
	desc: String,
	names: Vec<String>,
) -> Result<&'a mut MemberMapping> {
	let names = complete_names(names)?;
	match members.entry((names[0].clone(), desc.clone())) {
		Entry::Occupied(e) => bail!("cannot add {kind} {names:?} {desc:?}, there's already {:?}", e.get().names),
		Entry::Vacant(e) => Ok(e.insert(MemberMapping { desc, names })),
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::tree::{complete_names, Mappings};

	#[test]
	fn missing_names_fall_back() -> Result<()> {
		let names = complete_names(vec!["a".to_owned(), "".to_owned(), "c".to_owned(), "".to_owned()])?;
		assert_eq!(names, vec!["a", "a", "c", "c"]);
		assert!(complete_names(vec!["".to_owned(), "b".to_owned()]).is_err());
		Ok(())
	}

	#[test]
	fn duplicates() -> Result<()> {
		let mut mappings = Mappings::new(vec!["official".to_owned(), "named".to_owned()])?;
		mappings.add_class(vec!["a".to_owned(), "A".to_owned()])?
			.add_field("I".to_owned(), vec!["b".to_owned(), "".to_owned()])?;
		assert!(mappings.add_class(vec!["a".to_owned(), "B".to_owned()]).is_err());

		let class = &mut mappings.classes[0];
		assert!(class.add_field("I".to_owned(), vec!["b".to_owned(), "c".to_owned()]).is_err());
		// same name with another descriptor is fine
		class.add_field("J".to_owned(), vec!["b".to_owned(), "c".to_owned()])?;

		assert!(Mappings::new(vec!["a".to_owned(), "a".to_owned()]).is_err());
		assert!(mappings.check_namespaces(&["named", "intermediary"]).is_err());
		Ok(())
	}
}
