//! Making package private classes and members public where a class of another package uses them.
//!
//! Remapping moves classes into new packages, but a class that isn't mapped stays in its old package. Any package
//! private access between the two fails at run time unless it's widened.

use anyhow::{anyhow, Context, Result};
use indexmap::{IndexMap, IndexSet};
use log::debug;
use duke::class_file::Member;
use duke::pool::PoolEntry;
use duke::ClassFile;
use dukebox::ClassEntry;
use quill::access_transform::{AccessTransform, Visibility};

/// What to widen, by index into the classes and into their fields or methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Widening {
	Class(usize),
	Field(usize, usize),
	Method(usize, usize),
}

struct Archive {
	files: Vec<ClassFile>,
	names: Vec<String>,
	index: IndexMap<String, usize>,
}

impl Archive {
	fn read(classes: &[ClassEntry]) -> Result<Archive> {
		let files = classes.iter()
			.map(|entry| ClassFile::read(&entry.bytes).with_context(|| anyhow!("failed to read class {:?}", entry.path)))
			.collect::<Result<Vec<_>>>()?;
		let names = files.iter().map(ClassFile::name).collect::<Result<Vec<_>>>()?;
		let index = names.iter().enumerate().map(|(index, name)| (name.clone(), index)).collect();
		Ok(Archive { files, names, index })
	}

	fn crosses_package(&self, user: usize, target: usize) -> bool {
		package_of(&self.names[user]) != package_of(&self.names[target])
	}

	/// Finds the declaration of a member, looking at the superclasses in the archive too.
	fn find_member(&self, owner: &str, name: &str, desc: &str, method: bool) -> Result<Option<(Widening, u16)>> {
		let mut current = self.index.get(owner).copied();
		// bounded, so that a broken hierarchy with cycles can't hang
		for _ in 0..=self.files.len() {
			let Some(class) = current else {
				break;
			};
			let file = &self.files[class];
			let members: &[Member] = if method { &file.methods } else { &file.fields };
			for (position, member) in members.iter().enumerate() {
				if file.pool.utf8(member.name_index)? == name && file.pool.utf8(member.descriptor_index)? == desc {
					let widening = if method { Widening::Method(class, position) } else { Widening::Field(class, position) };
					return Ok(Some((widening, member.access)));
				}
			}
			current = match file.super_name()? {
				Some(super_name) => self.index.get(&super_name).copied(),
				None => None,
			};
		}
		Ok(None)
	}

	fn widenings(&self) -> Result<IndexSet<Widening>> {
		let mut widenings = IndexSet::new();
		for (user, file) in self.files.iter().enumerate() {
			for (_, entry) in file.pool.iter() {
				let (class_index, name_and_type_index, method) = match *entry {
					PoolEntry::Class { name_index } => {
						let name = file.pool.utf8(name_index)?;
						let target = element_class(&name).and_then(|name| self.index.get(name));
						if let Some(&target) = target {
							if self.crosses_package(user, target) && is_package_private(self.files[target].access) {
								widenings.insert(Widening::Class(target));
							}
						}
						continue;
					},
					PoolEntry::FieldRef { class_index, name_and_type_index } => (class_index, name_and_type_index, false),
					PoolEntry::MethodRef { class_index, name_and_type_index }
					| PoolEntry::InterfaceMethodRef { class_index, name_and_type_index } => (class_index, name_and_type_index, true),
					_ => continue,
				};

				let owner = file.pool.class_name(class_index)?;
				let (name, desc) = file.pool.name_and_type(name_and_type_index)?;
				if let Some((widening, access)) = self.find_member(&owner, &name, &desc, method)? {
					let (Widening::Class(target) | Widening::Field(target, _) | Widening::Method(target, _)) = widening;
					if self.crosses_package(user, target) && is_package_private(access) {
						widenings.insert(widening);
					}
				}
			}
		}
		Ok(widenings)
	}
}

/// Widens the package private classes and members of `classes` that are used from another package to public, and
/// gives the number of classes that changed. Classes that don't change keep their bytes.
pub fn fix_package_access(classes: &mut [ClassEntry]) -> Result<usize> {
	let archive = Archive::read(classes)?;
	let widenings = archive.widenings()?;

	let mut files = archive.files;
	let mut changed = IndexSet::new();
	for widening in widenings {
		let (class, access) = match widening {
			Widening::Class(class) => (class, &mut files[class].access),
			Widening::Field(class, position) => (class, &mut files[class].fields[position].access),
			Widening::Method(class, position) => (class, &mut files[class].methods[position].access),
		};
		*access = AccessTransform::PUBLIC.apply(*access);
		changed.insert(class);
	}

	for &class in &changed {
		classes[class].bytes = files[class].to_bytes()
			.with_context(|| anyhow!("failed to write class {:?}", classes[class].path))?;
		debug!("widened access in {}", archive.names[class]);
	}
	Ok(changed.len())
}

fn is_package_private(access: u16) -> bool {
	Visibility::from_access_flags(access) == Visibility::Default
}

fn package_of(class: &str) -> &str {
	class.rsplit_once('/').map_or("", |(package, _)| package)
}

/// The class of a class name or an array class name, `None` for arrays of primitives.
fn element_class(name: &str) -> Option<&str> {
	let element = name.trim_start_matches('[');
	if element.len() == name.len() {
		Some(name)
	} else {
		element.strip_prefix('L')?.strip_suffix(';')
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use duke::ClassFile;
	use dukebox::ClassEntry;
	use crate::fixups::package_access::{element_class, fix_package_access, package_of};

	fn entry(class: ClassFile) -> Result<ClassEntry> {
		Ok(ClassEntry {
			path: format!("{}.class", class.name()?),
			bytes: class.to_bytes()?,
			last_modified: None,
		})
	}

	/// `net/Foo` with package private members, its subclass `net/Sub`, the package private `net/Bar` and `net/Baz`,
	/// and the unmapped `a$1` using `net/Foo` through `net/Sub`, and `net/Bar`.
	fn classes() -> Result<Vec<ClassEntry>> {
		let mut foo = ClassFile::new(52, 0x21, "net/Foo", Some("java/lang/Object"))?;
		foo.add_method(0x0, "tick", "()V")?;
		foo.add_method(0x2, "hidden", "()V")?;
		foo.add_field(0x10, "count", "I")?;
		foo.pool.put_class("net/Baz")?;

		let sub = ClassFile::new(52, 0x21, "net/Sub", Some("net/Foo"))?;
		let bar = ClassFile::new(52, 0x20, "net/Bar", Some("java/lang/Object"))?;
		let baz = ClassFile::new(52, 0x20, "net/Baz", Some("java/lang/Object"))?;

		let mut user = ClassFile::new(52, 0x20, "a$1", Some("java/lang/Object"))?;
		user.pool.put_method_ref("net/Sub", "tick", "()V")?;
		user.pool.put_method_ref("net/Foo", "hidden", "()V")?;
		user.pool.put_field_ref("net/Foo", "count", "I")?;
		user.pool.put_class("[[Lnet/Bar;")?;
		user.pool.put_class("[I")?;

		[foo, sub, bar, baz, user].into_iter().map(entry).collect()
	}

	#[test]
	fn widens_uses_from_other_packages() -> Result<()> {
		let mut classes = classes()?;
		let before = self::classes()?;

		assert_eq!(fix_package_access(&mut classes)?, 2);

		let foo = ClassFile::read(&classes[0].bytes)?;
		assert_eq!(foo.access, 0x21);
		let methods: Vec<_> = foo.methods.iter().map(|x| x.access).collect();
		assert_eq!(methods, [0x1, 0x2]);
		assert_eq!(foo.fields[0].access, 0x11);

		assert_eq!(ClassFile::read(&classes[2].bytes)?.access, 0x21);

		// used only from its own package
		assert!(classes[3].bytes == before[3].bytes);
		assert!(classes[1].bytes == before[1].bytes);
		assert!(classes[4].bytes == before[4].bytes);
		Ok(())
	}

	#[test]
	fn same_package_is_kept() -> Result<()> {
		let mut classes = classes()?;
		classes.truncate(4);
		assert_eq!(fix_package_access(&mut classes)?, 0);
		Ok(())
	}

	#[test]
	fn names() {
		assert_eq!(package_of("net/minecraft/Foo"), "net/minecraft");
		assert_eq!(package_of("a$1"), "");
		assert_eq!(element_class("[[Lnet/Bar;"), Some("net/Bar"));
		assert_eq!(element_class("net/Bar"), Some("net/Bar"));
		assert_eq!(element_class("[I"), None);
	}
}
