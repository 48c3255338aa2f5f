//! Remapping with a [`MappingTable`], looking at super classes for inherited members.
//!
//! A field or method reference names the class it's called on, which isn't necessarily the class that declares
//! it. The mappings however only know the declaring class. The [`TableRemapper`] therefore looks at the super
//! classes and interfaces of the owner, as given by a [`SuperClassProvider`], if there's no mapping for the owner
//! itself.

use anyhow::Result;
use indexmap::{IndexMap, IndexSet};
use duke::ClassFile;
use duke::remapper::{ClassRemapper, MemberRemapper};
use crate::table::MappingTable;

pub trait SuperClassProvider {
	/// Gives the super class and the interfaces of the class, if the class is known.
	fn get_super_classes(&self, class: &str) -> Result<Option<&IndexSet<String>>>;
}

impl<S: SuperClassProvider + ?Sized> SuperClassProvider for &S {
	fn get_super_classes(&self, class: &str) -> Result<Option<&IndexSet<String>>> {
		(**self).get_super_classes(class)
	}
}

impl<S: SuperClassProvider> SuperClassProvider for Vec<S> {
	fn get_super_classes(&self, class: &str) -> Result<Option<&IndexSet<String>>> {
		for i in self {
			if let Some(x) = i.get_super_classes(class)? {
				return Ok(Some(x));
			}
		}
		Ok(None)
	}
}

pub struct NoSuperClassProvider;

impl SuperClassProvider for NoSuperClassProvider {
	fn get_super_classes(&self, _class: &str) -> Result<Option<&IndexSet<String>>> {
		Ok(None)
	}
}

/// The super classes and interfaces of a set of classes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassHierarchy {
	super_classes: IndexMap<String, IndexSet<String>>,
}

impl ClassHierarchy {
	pub fn new() -> ClassHierarchy {
		ClassHierarchy::default()
	}

	pub fn len(&self) -> usize {
		self.super_classes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.super_classes.is_empty()
	}

	/// Adds a class. If the class is already known, the first one added is kept.
	pub fn insert(&mut self, class: String, super_class: Option<String>, interfaces: Vec<String>) {
		self.super_classes.entry(class)
			.or_insert_with(|| super_class.into_iter().chain(interfaces).collect());
	}

	pub fn add_class_file(&mut self, class: &ClassFile) -> Result<()> {
		self.insert(class.name()?, class.super_name()?, class.interface_names()?);
		Ok(())
	}
}

impl SuperClassProvider for ClassHierarchy {
	fn get_super_classes(&self, class: &str) -> Result<Option<&IndexSet<String>>> {
		Ok(self.super_classes.get(class))
	}
}

/// A [`MemberRemapper`] for a [`MappingTable`] that finds inherited members through the class hierarchy.
#[derive(Debug)]
pub struct TableRemapper<'a, I: ?Sized> {
	table: &'a MappingTable,
	inheritance: &'a I,
}

impl<'a, I: SuperClassProvider + ?Sized> TableRemapper<'a, I> {
	pub fn new(table: &'a MappingTable, inheritance: &'a I) -> TableRemapper<'a, I> {
		TableRemapper { table, inheritance }
	}

	fn walk(
		&self,
		owner: &str,
		visited: &mut IndexSet<String>,
		get: &impl Fn(&MappingTable, &str) -> Option<String>,
	) -> Result<Option<String>> {
		if !visited.insert(owner.to_owned()) {
			return Ok(None);
		}
		if let Some(name) = get(self.table, owner) {
			return Ok(Some(name));
		}
		if let Some(super_classes) = self.inheritance.get_super_classes(owner)? {
			for super_class in super_classes {
				if let Some(name) = self.walk(super_class, visited, get)? {
					return Ok(Some(name));
				}
			}
		}
		Ok(None)
	}
}

impl<I: ?Sized> ClassRemapper for TableRemapper<'_, I> {
	fn map_class_fail(&self, class: &str) -> Result<Option<String>> {
		self.table.map_class_fail(class)
	}
}

impl<I: SuperClassProvider + ?Sized> MemberRemapper for TableRemapper<'_, I> {
	fn map_field_fail(&self, owner: &str, name: &str, desc: &str) -> Result<Option<String>> {
		self.walk(owner, &mut IndexSet::new(), &|table, owner| {
			table.get_field(owner, name, desc).map(str::to_owned)
		})
	}

	fn map_method_fail(&self, owner: &str, name: &str, desc: &str) -> Result<Option<String>> {
		self.walk(owner, &mut IndexSet::new(), &|table, owner| {
			table.get_method(owner, name, desc).map(str::to_owned)
		})
	}

	fn map_annotation_element(&self, annotation: &str, name: &str) -> Result<Option<String>> {
		self.table.map_annotation_element(annotation, name)
	}
}
