use std::collections::HashMap;
use std::io::{Read, Write};
use anyhow::{anyhow, bail, Context, Result};
use crate::io::{ClassRead, ClassWrite};
use crate::jstring;

pub(crate) mod tag {
	pub(crate) const UTF8: u8 = 1;
	pub(crate) const INTEGER: u8 = 3;
	pub(crate) const FLOAT: u8 = 4;
	pub(crate) const LONG: u8 = 5;
	pub(crate) const DOUBLE: u8 = 6;
	pub(crate) const CLASS: u8 = 7;
	pub(crate) const STRING: u8 = 8;
	pub(crate) const FIELD_REF: u8 = 9;
	pub(crate) const METHOD_REF: u8 = 10;
	pub(crate) const INTERFACE_METHOD_REF: u8 = 11;
	pub(crate) const NAME_AND_TYPE: u8 = 12;
	pub(crate) const METHOD_HANDLE: u8 = 15;
	pub(crate) const METHOD_TYPE: u8 = 16;
	pub(crate) const DYNAMIC: u8 = 17;
	pub(crate) const INVOKE_DYNAMIC: u8 = 18;
	pub(crate) const MODULE: u8 = 19;
	pub(crate) const PACKAGE: u8 = 20;
}

/// One entry of the constant pool, with all references as raw pool indices.
///
/// This graph shows what references what:
/// ```txt
/// Long  Double  Utf8  Integer  Float
///      __________/\_______________
///     /      /     \    \         \
/// String  Class  NameAndType  MethodType
///           |      |      \
///           FieldRef    InvokeDynamic
///           MethodRef     Dynamic
///       InterfaceMethodRef
///              |
///         MethodHandle
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PoolEntry {
	Utf8 { bytes: Vec<u8> },
	Integer { bytes: u32 },
	Float { bytes: u32 },
	Long { bytes: u64 },
	Double { bytes: u64 },
	Class { name_index: u16 },
	String { string_index: u16 },
	FieldRef { class_index: u16, name_and_type_index: u16 },
	MethodRef { class_index: u16, name_and_type_index: u16 },
	InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
	NameAndType { name_index: u16, descriptor_index: u16 },
	MethodHandle { reference_kind: u8, reference_index: u16 },
	MethodType { descriptor_index: u16 },
	Dynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
	InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
	Module { name_index: u16 },
	Package { name_index: u16 },
}

impl PoolEntry {
	/// `Long` and `Double` take up two slots of the pool.
	fn is_wide(&self) -> bool {
		matches!(self, PoolEntry::Long { .. } | PoolEntry::Double { .. })
	}

	fn read(reader: &mut impl Read) -> Result<PoolEntry> {
		Ok(match reader.read_u8()? {
			tag::UTF8 => {
				let length = reader.read_u16()? as usize;
				PoolEntry::Utf8 { bytes: reader.read_u8_vec(length)? }
			},
			tag::INTEGER => PoolEntry::Integer { bytes: reader.read_u32()? },
			tag::FLOAT => PoolEntry::Float { bytes: reader.read_u32()? },
			tag::LONG => PoolEntry::Long { bytes: reader.read_u64()? },
			tag::DOUBLE => PoolEntry::Double { bytes: reader.read_u64()? },
			tag::CLASS => PoolEntry::Class { name_index: reader.read_u16()? },
			tag::STRING => PoolEntry::String { string_index: reader.read_u16()? },
			tag::FIELD_REF => PoolEntry::FieldRef { class_index: reader.read_u16()?, name_and_type_index: reader.read_u16()? },
			tag::METHOD_REF => PoolEntry::MethodRef { class_index: reader.read_u16()?, name_and_type_index: reader.read_u16()? },
			tag::INTERFACE_METHOD_REF => PoolEntry::InterfaceMethodRef {
				class_index: reader.read_u16()?,
				name_and_type_index: reader.read_u16()?,
			},
			tag::NAME_AND_TYPE => PoolEntry::NameAndType { name_index: reader.read_u16()?, descriptor_index: reader.read_u16()? },
			tag::METHOD_HANDLE => PoolEntry::MethodHandle { reference_kind: reader.read_u8()?, reference_index: reader.read_u16()? },
			tag::METHOD_TYPE => PoolEntry::MethodType { descriptor_index: reader.read_u16()? },
			tag::DYNAMIC => PoolEntry::Dynamic {
				bootstrap_method_attr_index: reader.read_u16()?,
				name_and_type_index: reader.read_u16()?,
			},
			tag::INVOKE_DYNAMIC => PoolEntry::InvokeDynamic {
				bootstrap_method_attr_index: reader.read_u16()?,
				name_and_type_index: reader.read_u16()?,
			},
			tag::MODULE => PoolEntry::Module { name_index: reader.read_u16()? },
			tag::PACKAGE => PoolEntry::Package { name_index: reader.read_u16()? },
			tag => bail!("unknown constant pool tag {tag}"),
		})
	}

	fn write(&self, writer: &mut impl Write) -> Result<()> {
		match self {
			PoolEntry::Utf8 { bytes } => {
				writer.write_u8(tag::UTF8)?;
				writer.write_usize_as_u16(bytes.len())?;
				writer.write_all(bytes)?;
			},
			&PoolEntry::Integer { bytes } => { writer.write_u8(tag::INTEGER)?; writer.write_u32(bytes)?; },
			&PoolEntry::Float { bytes } => { writer.write_u8(tag::FLOAT)?; writer.write_u32(bytes)?; },
			&PoolEntry::Long { bytes } => { writer.write_u8(tag::LONG)?; writer.write_u64(bytes)?; },
			&PoolEntry::Double { bytes } => { writer.write_u8(tag::DOUBLE)?; writer.write_u64(bytes)?; },
			&PoolEntry::Class { name_index } => { writer.write_u8(tag::CLASS)?; writer.write_u16(name_index)?; },
			&PoolEntry::String { string_index } => { writer.write_u8(tag::STRING)?; writer.write_u16(string_index)?; },
			&PoolEntry::FieldRef { class_index, name_and_type_index } => {
				writer.write_u8(tag::FIELD_REF)?;
				writer.write_u16(class_index)?;
				writer.write_u16(name_and_type_index)?;
			},
			&PoolEntry::MethodRef { class_index, name_and_type_index } => {
				writer.write_u8(tag::METHOD_REF)?;
				writer.write_u16(class_index)?;
				writer.write_u16(name_and_type_index)?;
			},
			&PoolEntry::InterfaceMethodRef { class_index, name_and_type_index } => {
				writer.write_u8(tag::INTERFACE_METHOD_REF)?;
				writer.write_u16(class_index)?;
				writer.write_u16(name_and_type_index)?;
			},
			&PoolEntry::NameAndType { name_index, descriptor_index } => {
				writer.write_u8(tag::NAME_AND_TYPE)?;
				writer.write_u16(name_index)?;
				writer.write_u16(descriptor_index)?;
			},
			&PoolEntry::MethodHandle { reference_kind, reference_index } => {
				writer.write_u8(tag::METHOD_HANDLE)?;
				writer.write_u8(reference_kind)?;
				writer.write_u16(reference_index)?;
			},
			&PoolEntry::MethodType { descriptor_index } => { writer.write_u8(tag::METHOD_TYPE)?; writer.write_u16(descriptor_index)?; },
			&PoolEntry::Dynamic { bootstrap_method_attr_index, name_and_type_index } => {
				writer.write_u8(tag::DYNAMIC)?;
				writer.write_u16(bootstrap_method_attr_index)?;
				writer.write_u16(name_and_type_index)?;
			},
			&PoolEntry::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index } => {
				writer.write_u8(tag::INVOKE_DYNAMIC)?;
				writer.write_u16(bootstrap_method_attr_index)?;
				writer.write_u16(name_and_type_index)?;
			},
			&PoolEntry::Module { name_index } => { writer.write_u8(tag::MODULE)?; writer.write_u16(name_index)?; },
			&PoolEntry::Package { name_index } => { writer.write_u8(tag::PACKAGE)?; writer.write_u16(name_index)?; },
		}
		Ok(())
	}
}

/// The constant pool of a class file.
///
/// Indices start at `1`. The slot after a `Long` or `Double` is unusable and stored as `None`, as is slot `0`.
///
/// Entries can be added with the `put_*` methods. These reuse an existing equal entry if there is one, so that
/// putting an entry that's already present never grows the pool.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
	entries: Vec<Option<PoolEntry>>,
	lookup: HashMap<PoolEntry, u16>,
}

impl ConstantPool {
	pub fn new() -> ConstantPool {
		ConstantPool {
			entries: vec![None],
			lookup: HashMap::new(),
		}
	}

	pub(crate) fn read(reader: &mut impl Read) -> Result<ConstantPool> {
		let count = reader.read_u16()?;
		let mut pool = ConstantPool::new();

		let mut index = 1;
		while index < count {
			let entry = PoolEntry::read(reader)
				.with_context(|| anyhow!("failed to read constant pool entry number {index}"))?;
			let wide = entry.is_wide();

			pool.lookup.entry(entry.clone()).or_insert(index);
			pool.entries.push(Some(entry));
			index += 1;

			if wide {
				pool.entries.push(None);
				index += 1;
			}
		}

		if pool.entries.len() != count as usize {
			bail!("wide constant pool entry overflows the constant pool count of {count}");
		}

		Ok(pool)
	}

	pub(crate) fn write(&self, writer: &mut impl Write) -> Result<()> {
		writer.write_usize_as_u16(self.entries.len())?;
		for entry in self.entries.iter().flatten() {
			entry.write(writer)?;
		}
		Ok(())
	}

	/// The `constant_pool_count` of the class file, one more than the largest valid index.
	pub fn count(&self) -> usize {
		self.entries.len()
	}

	pub fn iter(&self) -> impl Iterator<Item=(u16, &PoolEntry)> {
		self.entries.iter()
			.enumerate()
			.filter_map(|(index, entry)| Some((index as u16, entry.as_ref()?)))
	}

	pub fn get(&self, index: u16) -> Result<&PoolEntry> {
		self.entries.get(index as usize)
			.and_then(Option::as_ref)
			.with_context(|| anyhow!("constant pool index {index} is not a valid entry, pool count is {}", self.entries.len()))
	}

	/// Replaces the entry at `index`.
	///
	/// Only use this on entries that are referenced from a single logical place, such as `Class` or `FieldRef`
	/// entries. `Utf8` and `NameAndType` entries are shared, and must be added with `put_*` instead.
	pub fn replace(&mut self, index: u16, entry: PoolEntry) -> Result<()> {
		let slot = self.entries.get_mut(index as usize)
			.with_context(|| anyhow!("constant pool index {index} out of bounds"))?;
		let Some(old) = slot.as_ref() else {
			bail!("constant pool index {index} is not a valid entry");
		};
		if old.is_wide() != entry.is_wide() {
			bail!("cannot replace {old:?} with {entry:?}, they use a different amount of slots");
		}
		if old == &entry {
			return Ok(());
		}

		let old = slot.replace(entry.clone());
		if let Some(old) = old {
			if self.lookup.get(&old) == Some(&index) {
				self.lookup.remove(&old);
			}
		}
		self.lookup.entry(entry).or_insert(index);
		Ok(())
	}

	pub fn put(&mut self, entry: PoolEntry) -> Result<u16> {
		if let Some(&index) = self.lookup.get(&entry) {
			return Ok(index);
		}

		let wide = entry.is_wide();
		let needed = if wide { 2 } else { 1 };
		let Ok(index) = u16::try_from(self.entries.len()) else {
			bail!("constant pool is full");
		};
		if self.entries.len() + needed > u16::MAX as usize {
			bail!("constant pool is full, cannot add {entry:?}");
		}

		self.lookup.insert(entry.clone(), index);
		self.entries.push(Some(entry));
		if wide {
			self.entries.push(None);
		}
		Ok(index)
	}

	pub fn put_utf8(&mut self, string: &str) -> Result<u16> {
		self.put(PoolEntry::Utf8 { bytes: jstring::encode(string).into_owned() })
	}

	pub fn put_class(&mut self, name: &str) -> Result<u16> {
		let name_index = self.put_utf8(name)?;
		self.put(PoolEntry::Class { name_index })
	}

	pub fn put_string(&mut self, string: &str) -> Result<u16> {
		let string_index = self.put_utf8(string)?;
		self.put(PoolEntry::String { string_index })
	}

	pub fn put_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
		let name_index = self.put_utf8(name)?;
		let descriptor_index = self.put_utf8(descriptor)?;
		self.put(PoolEntry::NameAndType { name_index, descriptor_index })
	}

	pub fn put_field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
		let class_index = self.put_class(owner)?;
		let name_and_type_index = self.put_name_and_type(name, descriptor)?;
		self.put(PoolEntry::FieldRef { class_index, name_and_type_index })
	}

	pub fn put_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
		let class_index = self.put_class(owner)?;
		let name_and_type_index = self.put_name_and_type(name, descriptor)?;
		self.put(PoolEntry::MethodRef { class_index, name_and_type_index })
	}

	pub fn put_interface_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
		let class_index = self.put_class(owner)?;
		let name_and_type_index = self.put_name_and_type(name, descriptor)?;
		self.put(PoolEntry::InterfaceMethodRef { class_index, name_and_type_index })
	}

	pub fn utf8(&self, index: u16) -> Result<String> {
		let entry = self.get(index)?;
		let PoolEntry::Utf8 { bytes } = entry else {
			bail!("entry {index} isn't Utf8, we got: {entry:?}");
		};
		jstring::decode(bytes)
	}

	pub fn class_name(&self, index: u16) -> Result<String> {
		let entry = self.get(index)?;
		let &PoolEntry::Class { name_index } = entry else {
			bail!("entry {index} isn't Class, we got: {entry:?}");
		};
		self.utf8(name_index)
			.with_context(|| anyhow!("failed to read name of class entry {index}"))
	}

	/// Like [`ConstantPool::class_name`], but index `0` gives `None`.
	pub fn optional_class_name(&self, index: u16) -> Result<Option<String>> {
		if index == 0 {
			Ok(None)
		} else {
			self.class_name(index).map(Some)
		}
	}

	/// Gives back the name and descriptor strings of a `NameAndType` entry.
	pub fn name_and_type(&self, index: u16) -> Result<(String, String)> {
		let entry = self.get(index)?;
		let &PoolEntry::NameAndType { name_index, descriptor_index } = entry else {
			bail!("entry {index} isn't NameAndType, we got: {entry:?}");
		};
		Ok((self.utf8(name_index)?, self.utf8(descriptor_index)?))
	}
}

#[cfg(test)]
mod testing {
	use std::io::Cursor;
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::pool::{ConstantPool, PoolEntry};

	#[test]
	fn put_reuses_entries() -> Result<()> {
		let mut pool = ConstantPool::new();
		let a = pool.put_field_ref("a", "b", "I")?;
		let count = pool.count();
		assert_eq!(pool.put_field_ref("a", "b", "I")?, a);
		assert_eq!(pool.count(), count);
		assert_eq!(pool.put_class("a")?, 2);
		Ok(())
	}

	#[test]
	fn wide_entries_take_two_slots() -> Result<()> {
		let mut pool = ConstantPool::new();
		let long = pool.put(PoolEntry::Long { bytes: 7 })?;
		let utf8 = pool.put_utf8("x")?;
		assert_eq!((long, utf8), (1, 3));
		assert!(pool.get(2).is_err());

		let mut bytes = Vec::new();
		pool.write(&mut bytes)?;
		let read = ConstantPool::read(&mut Cursor::new(bytes))?;
		assert_eq!(read.count(), 4);
		assert_eq!(read.utf8(3)?, "x");
		Ok(())
	}

	#[test]
	fn replace_updates_lookup() -> Result<()> {
		let mut pool = ConstantPool::new();
		let class = pool.put_class("a")?;
		let name_index = pool.put_utf8("b")?;
		pool.replace(class, PoolEntry::Class { name_index })?;

		assert_eq!(pool.class_name(class)?, "b");
		assert_eq!(pool.put_class("b")?, class);
		// the old entry is gone, putting it again makes a new one
		assert_ne!(pool.put_class("a")?, class);
		Ok(())
	}
}
