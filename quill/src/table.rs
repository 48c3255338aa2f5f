//! The rename table for one pair of namespaces.
//!
//! A [`MappingTable`] answers "what is the name of this class, field or method in the target namespace?" for
//! symbols given in the source namespace. Symbols that aren't in the table keep their name.

use std::hash::{Hash, Hasher};
use anyhow::{anyhow, bail, Result};
use indexmap::{IndexMap, IndexSet};
use duke::remapper::{ClassRemapper, MemberRemapper};
use crate::tree::Mappings;

/// The key of a field or method of some class: name and descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberKey {
	pub name: String,
	pub desc: String,
}

impl MemberKey {
	pub fn new(name: impl Into<String>, desc: impl Into<String>) -> MemberKey {
		MemberKey { name: name.into(), desc: desc.into() }
	}
}

/// Looks up a [`MemberKey`] without allocating. Hashes the same way as the derived `Hash` of [`MemberKey`].
#[derive(Debug, PartialEq, Eq)]
struct MemberQuery<'a>(&'a str, &'a str);

impl Hash for MemberQuery<'_> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.0.hash(state);
		self.1.hash(state);
	}
}

impl indexmap::Equivalent<MemberKey> for MemberQuery<'_> {
	fn equivalent(&self, key: &MemberKey) -> bool {
		self.0 == key.name && self.1 == key.desc
	}
}

/// The renamed fields and methods of one class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassMembers {
	pub fields: IndexMap<MemberKey, String>,
	pub methods: IndexMap<MemberKey, String>,
}

impl ClassMembers {
	fn is_empty(&self) -> bool {
		self.fields.is_empty() && self.methods.is_empty()
	}
}

/// Renames of classes, fields and methods from namespace `from` to namespace `to`.
///
/// Classes are keyed by their name in `from`. Members are keyed by owner, name and descriptor, all in `from`.
/// Every lookup falls back to "not renamed" if there's no entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingTable {
	from: String,
	to: String,
	classes: IndexMap<String, String>,
	members: IndexMap<String, ClassMembers>,
}

impl MappingTable {
	pub fn new(from: impl Into<String>, to: impl Into<String>) -> MappingTable {
		MappingTable {
			from: from.into(),
			to: to.into(),
			classes: IndexMap::new(),
			members: IndexMap::new(),
		}
	}

	/// Builds the table from namespace `from` to namespace `to` of the mapping tree.
	pub fn from_mappings(mappings: &Mappings, from: &str, to: &str) -> Result<MappingTable> {
		let from_index = mappings.namespace(from)?;
		let to_index = mappings.namespace(to)?;

		// descriptors are stored in the first namespace, this maps them into `from`
		let mut desc_remapper = MappingTable::new(&mappings.namespaces[0], from);
		for class in mappings.classes.values() {
			desc_remapper.insert_class(&class.names[0], &class.names[from_index]);
		}

		let mut table = MappingTable::new(from, to);
		for class in mappings.classes.values() {
			let owner = &class.names[from_index];
			table.insert_class(owner, &class.names[to_index]);

			for field in class.fields.values() {
				let desc = desc_remapper.map_desc(&field.desc)?;
				table.insert_field(owner, &field.names[from_index], &desc, &field.names[to_index]);
			}
			for method in class.methods.values() {
				let desc = desc_remapper.map_desc(&method.desc)?;
				table.insert_method(owner, &method.names[from_index], &desc, &method.names[to_index]);
			}
		}
		Ok(table)
	}

	pub fn from(&self) -> &str {
		&self.from
	}

	pub fn to(&self) -> &str {
		&self.to
	}

	pub fn is_empty(&self) -> bool {
		self.classes.is_empty() && self.members.values().all(ClassMembers::is_empty)
	}

	pub fn classes(&self) -> impl Iterator<Item=(&str, &str)> {
		self.classes.iter().map(|(a, b)| (a.as_str(), b.as_str()))
	}

	pub fn members(&self) -> impl Iterator<Item=(&str, &ClassMembers)> {
		self.members.iter().map(|(owner, members)| (owner.as_str(), members))
	}

	/// Inserts a class rename. An already present rename of the same class is replaced.
	pub fn insert_class(&mut self, from: &str, to: &str) {
		self.classes.insert(from.to_owned(), to.to_owned());
	}

	pub fn insert_field(&mut self, owner: &str, name: &str, desc: &str, to: &str) {
		self.members.entry(owner.to_owned()).or_default()
			.fields.insert(MemberKey::new(name, desc), to.to_owned());
	}

	pub fn insert_method(&mut self, owner: &str, name: &str, desc: &str, to: &str) {
		self.members.entry(owner.to_owned()).or_default()
			.methods.insert(MemberKey::new(name, desc), to.to_owned());
	}

	pub fn get_class(&self, class: &str) -> Option<&str> {
		self.classes.get(class).map(String::as_str)
	}

	pub fn get_field(&self, owner: &str, name: &str, desc: &str) -> Option<&str> {
		self.members.get(owner)?
			.fields.get(&MemberQuery(name, desc))
			.map(String::as_str)
	}

	pub fn get_method(&self, owner: &str, name: &str, desc: &str) -> Option<&str> {
		self.members.get(owner)?
			.methods.get(&MemberQuery(name, desc))
			.map(String::as_str)
	}

	/// Finds a field by name only, for places where the descriptor isn't known.
	///
	/// If there are multiple fields with that name, the first one added wins.
	pub fn get_field_by_name(&self, owner: &str, name: &str) -> Option<&str> {
		self.members.get(owner)?
			.fields.iter()
			.find(|(key, _)| key.name == name)
			.map(|(_, to)| to.as_str())
	}

	/// Finds a method by name only, for places where the descriptor isn't known.
	///
	/// If there are multiple methods with that name, the first one added wins.
	pub fn get_method_by_name(&self, owner: &str, name: &str) -> Option<&str> {
		self.members.get(owner)?
			.methods.iter()
			.find(|(key, _)| key.name == name)
			.map(|(_, to)| to.as_str())
	}

	/// Composes this table (`a -> b`) with `next` (`b -> c`) into a table `a -> c`.
	///
	/// Every symbol is looked up in `self` first, and the result of that in `next`, both falling back to the old
	/// name. Class names are composed first, as the member keys of `next` use the class names of `b`. Symbols only
	/// renamed by `next` are carried over, with their keys translated back into `a`.
	pub fn compose(&self, next: &MappingTable) -> Result<MappingTable> {
		if self.to != next.from {
			bail!("cannot compose mappings {} -> {} with {} -> {}", self.from, self.to, next.from, next.to);
		}

		let mut table = MappingTable::new(&self.from, &next.to);

		for (a, b) in &self.classes {
			table.insert_class(a, next.map_class_or_same(b));
		}
		let images: IndexSet<&str> = self.classes.values().map(String::as_str).collect();
		for (b, c) in &next.classes {
			if !self.classes.contains_key(b) && !images.contains(b.as_str()) {
				table.insert_class(b, c);
			}
		}

		let back = self.invert()?;
		let mut covered: IndexSet<(String, String, String)> = IndexSet::new();

		for (owner_a, members) in &self.members {
			let owner_b = self.map_class_or_same(owner_a);
			for (key, name_b) in &members.fields {
				let desc_b = self.map_desc(&key.desc)?;
				let name_c = next.get_field(owner_b, name_b, &desc_b).unwrap_or(name_b);
				table.insert_field(owner_a, &key.name, &key.desc, name_c);
				covered.insert((owner_b.to_owned(), name_b.clone(), desc_b));
			}
			for (key, name_b) in &members.methods {
				let desc_b = self.map_desc(&key.desc)?;
				let name_c = next.get_method(owner_b, name_b, &desc_b).unwrap_or(name_b);
				table.insert_method(owner_a, &key.name, &key.desc, name_c);
				covered.insert((owner_b.to_owned(), name_b.clone(), desc_b));
			}
		}

		for (owner_b, members) in &next.members {
			let owner_a = back.map_class_or_same(owner_b);
			for (key, name_c) in &members.fields {
				if covered.contains(&(owner_b.clone(), key.name.clone(), key.desc.clone())) {
					continue;
				}
				let desc_a = back.map_desc(&key.desc)?;
				if table.get_field(owner_a, &key.name, &desc_a).is_none() {
					table.insert_field(owner_a, &key.name, &desc_a, name_c);
				}
			}
			for (key, name_c) in &members.methods {
				if covered.contains(&(owner_b.clone(), key.name.clone(), key.desc.clone())) {
					continue;
				}
				let desc_a = back.map_desc(&key.desc)?;
				if table.get_method(owner_a, &key.name, &desc_a).is_none() {
					table.insert_method(owner_a, &key.name, &desc_a, name_c);
				}
			}
		}

		Ok(table)
	}

	/// Gives back the table `to -> from`.
	pub fn invert(&self) -> Result<MappingTable> {
		let mut table = MappingTable::new(&self.to, &self.from);
		for (a, b) in &self.classes {
			table.insert_class(b, a);
		}
		for (owner, members) in &self.members {
			let owner_b = self.map_class_or_same(owner);
			for (key, name_b) in &members.fields {
				table.insert_field(owner_b, name_b, &self.map_desc(&key.desc)?, &key.name);
			}
			for (key, name_b) in &members.methods {
				table.insert_method(owner_b, name_b, &self.map_desc(&key.desc)?, &key.name);
			}
		}
		Ok(table)
	}

	/// Adds all entries of `other` that aren't in `self`.
	///
	/// If both tables rename the same symbol to different names, this fails instead of picking one.
	pub fn union(&self, other: &MappingTable) -> Result<MappingTable> {
		let mut table = self.clone();

		for (from, to) in &other.classes {
			match table.classes.get(from) {
				Some(existing) if existing != to => {
					bail!("conflicting mappings for class {from:?}: {existing:?} and {to:?}");
				},
				Some(_) => {},
				None => table.insert_class(from, to),
			}
		}

		for (owner, members) in &other.members {
			let target = table.members.entry(owner.clone()).or_default();
			union_members(&mut target.fields, &members.fields, owner, "field")?;
			union_members(&mut target.methods, &members.methods, owner, "method")?;
		}

		Ok(table)
	}

	fn map_class_or_same<'a>(&'a self, class: &'a str) -> &'a str {
		self.get_class(class).unwrap_or(class)
	}
}

fn union_members(target: &mut IndexMap<MemberKey, String>, other: &IndexMap<MemberKey, String>, owner: &str, kind: &str) -> Result<()> {
	for (key, to) in other {
		match target.get(key) {
			Some(existing) if existing != to => {
				return Err(anyhow!("conflicting mappings for {kind} {owner}.{}{}: {existing:?} and {to:?}", key.name, key.desc));
			},
			Some(_) => {},
			None => {
				target.insert(key.clone(), to.clone());
			},
		}
	}
	Ok(())
}

impl ClassRemapper for MappingTable {
	fn map_class_fail(&self, class: &str) -> Result<Option<String>> {
		Ok(self.get_class(class).map(str::to_owned))
	}
}

/// Looks members up only on the class given. See [`crate::remapper::TableRemapper`] for looking at super classes.
impl MemberRemapper for MappingTable {
	fn map_field_fail(&self, owner: &str, name: &str, desc: &str) -> Result<Option<String>> {
		Ok(self.get_field(owner, name, desc).map(str::to_owned))
	}

	fn map_method_fail(&self, owner: &str, name: &str, desc: &str) -> Result<Option<String>> {
		Ok(self.get_method(owner, name, desc).map(str::to_owned))
	}

	fn map_annotation_element(&self, annotation: &str, name: &str) -> Result<Option<String>> {
		Ok(self.get_method_by_name(annotation, name).map(str::to_owned))
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use duke::remapper::ClassRemapper;
	use crate::table::MappingTable;

	fn first() -> MappingTable {
		let mut table = MappingTable::new("official", "intermediary");
		table.insert_class("a", "class_1");
		table.insert_class("b", "class_2");
		table.insert_field("a", "c", "Lb;", "field_3");
		table.insert_method("a", "d", "(Lb;)V", "method_4");
		table
	}

	fn second() -> MappingTable {
		let mut table = MappingTable::new("intermediary", "named");
		table.insert_class("class_1", "com/example/A");
		table.insert_class("class_5", "com/example/Five");
		table.insert_field("class_1", "field_3", "Lclass_2;", "value");
		table.insert_method("class_1", "method_4", "(Lclass_2;)V", "run");
		table.insert_method("class_1", "method_6", "()V", "other");
		table
	}

	#[test]
	fn compose() -> Result<()> {
		let composed = first().compose(&second())?;
		assert_eq!((composed.from(), composed.to()), ("official", "named"));

		assert_eq!(composed.get_class("a"), Some("com/example/A"));
		// not in the second table, so the intermediary name stays
		assert_eq!(composed.get_class("b"), Some("class_2"));
		// only in the second table
		assert_eq!(composed.get_class("class_5"), Some("com/example/Five"));

		assert_eq!(composed.get_field("a", "c", "Lb;"), Some("value"));
		assert_eq!(composed.get_method("a", "d", "(Lb;)V"), Some("run"));
		assert_eq!(composed.get_method("a", "method_6", "()V"), Some("other"));

		assert!(second().compose(&first()).is_err());
		Ok(())
	}

	#[test]
	fn invert() -> Result<()> {
		let inverted = first().invert()?;
		assert_eq!((inverted.from(), inverted.to()), ("intermediary", "official"));
		assert_eq!(inverted.get_class("class_1"), Some("a"));
		assert_eq!(inverted.get_field("class_1", "field_3", "Lclass_2;"), Some("c"));
		assert_eq!(inverted.invert()?, first());
		Ok(())
	}

	#[test]
	fn union() -> Result<()> {
		let mut secondary = MappingTable::new("official", "intermediary");
		secondary.insert_class("javax/annotation/Nullable", "org/jetbrains/annotations/Nullable");
		secondary.insert_class("a", "class_1");

		let union = first().union(&secondary)?;
		assert_eq!(union.get_class("javax/annotation/Nullable"), Some("org/jetbrains/annotations/Nullable"));
		assert_eq!(union.get_class("a"), Some("class_1"));
		assert_eq!(union.get_field("a", "c", "Lb;"), Some("field_3"));

		secondary.insert_class("a", "class_99");
		let error = first().union(&secondary).unwrap_err();
		assert!(error.to_string().contains("conflicting"), "{error}");

		let mut members = MappingTable::new("official", "intermediary");
		members.insert_method("a", "d", "(Lb;)V", "method_99");
		assert!(first().union(&members).is_err());
		Ok(())
	}

	#[test]
	fn lookups_fall_back_to_identity() -> Result<()> {
		let table = first();
		assert_eq!(table.map_class("x")?, "x");
		assert_eq!(table.map_desc("(La;Lx;)Lb;")?, "(Lclass_1;Lx;)Lclass_2;");
		assert_eq!(table.get_field("a", "c", "I"), None);
		assert_eq!(table.get_method_by_name("a", "d"), Some("method_4"));
		assert!(MappingTable::new("a", "b").is_empty());
		Ok(())
	}
}
