use std::io::{Cursor, Read, Write};
use anyhow::{anyhow, bail, Context, Result};
use crate::io::{ClassRead, ClassWrite};
use crate::pool::ConstantPool;

const MAGIC: u32 = 0xCAFE_BABE;

/// A class file, with all references kept as constant pool indices.
///
/// Attributes are kept as their raw bytes, use the methods here to read the ones you're interested in.
#[derive(Debug, Clone)]
pub struct ClassFile {
	pub minor_version: u16,
	pub major_version: u16,
	pub pool: ConstantPool,
	pub access: u16,
	pub this_class: u16,
	/// `0` for `java/lang/Object` and `module-info`.
	pub super_class: u16,
	pub interfaces: Vec<u16>,
	pub fields: Vec<Member>,
	pub methods: Vec<Member>,
	pub attributes: Vec<Attribute>,
}

/// A field or a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
	pub access: u16,
	pub name_index: u16,
	pub descriptor_index: u16,
	pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
	pub name_index: u16,
	pub info: Vec<u8>,
}

/// One entry of the `InnerClasses` attribute, resolved to names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClass {
	pub inner_class: String,
	pub outer_class: Option<String>,
	pub inner_name: Option<String>,
	pub flags: u16,
}

impl ClassFile {
	/// Creates an empty class file, with `Object` as super class if `super_class` is `None`.
	pub fn new(major_version: u16, access: u16, name: &str, super_class: Option<&str>) -> Result<ClassFile> {
		let mut pool = ConstantPool::new();
		let this_class = pool.put_class(name)?;
		let super_class = pool.put_class(super_class.unwrap_or("java/lang/Object"))?;
		Ok(ClassFile {
			minor_version: 0,
			major_version,
			pool,
			access,
			this_class,
			super_class,
			interfaces: Vec::new(),
			fields: Vec::new(),
			methods: Vec::new(),
			attributes: Vec::new(),
		})
	}

	pub fn read(bytes: &[u8]) -> Result<ClassFile> {
		let mut reader = Cursor::new(bytes);
		let class = ClassFile::read_from(&mut reader)?;
		if reader.position() != bytes.len() as u64 {
			bail!("class file has {} trailing bytes", bytes.len() as u64 - reader.position());
		}
		Ok(class)
	}

	fn read_from(reader: &mut impl Read) -> Result<ClassFile> {
		let magic = reader.read_u32()?;
		if magic != MAGIC {
			bail!("invalid class file magic {magic:#x}");
		}

		let minor_version = reader.read_u16()?;
		let major_version = reader.read_u16()?;
		let pool = ConstantPool::read(reader)?;

		let access = reader.read_u16()?;
		let this_class = reader.read_u16()?;
		let super_class = reader.read_u16()?;
		let interfaces = reader.read_vec(|r| r.read_u16())?;

		let fields = reader.read_vec(Member::read)
			.context("failed to read fields")?;
		let methods = reader.read_vec(Member::read)
			.context("failed to read methods")?;
		let attributes = reader.read_vec(Attribute::read)
			.context("failed to read class attributes")?;

		Ok(ClassFile {
			minor_version, major_version, pool, access, this_class, super_class, interfaces, fields, methods, attributes,
		})
	}

	pub fn write(&self, writer: &mut impl Write) -> Result<()> {
		writer.write_u32(MAGIC)?;
		writer.write_u16(self.minor_version)?;
		writer.write_u16(self.major_version)?;
		self.pool.write(writer)?;
		writer.write_u16(self.access)?;
		writer.write_u16(self.this_class)?;
		writer.write_u16(self.super_class)?;
		writer.write_vec(&self.interfaces, |w, &x| w.write_u16(x))?;
		writer.write_vec(&self.fields, |w, x| x.write(w))?;
		writer.write_vec(&self.methods, |w, x| x.write(w))?;
		writer.write_vec(&self.attributes, |w, x| x.write(w))?;
		Ok(())
	}

	pub fn to_bytes(&self) -> Result<Vec<u8>> {
		let mut bytes = Vec::new();
		self.write(&mut bytes)?;
		Ok(bytes)
	}

	pub fn name(&self) -> Result<String> {
		self.pool.class_name(self.this_class)
	}

	pub fn super_name(&self) -> Result<Option<String>> {
		self.pool.optional_class_name(self.super_class)
	}

	pub fn interface_names(&self) -> Result<Vec<String>> {
		self.interfaces.iter()
			.map(|&index| self.pool.class_name(index))
			.collect()
	}

	/// Finds the first attribute with the given name in `attributes`.
	pub fn find_attribute<'a>(&self, attributes: &'a [Attribute], name: &str) -> Result<Option<&'a Attribute>> {
		for attribute in attributes {
			if self.pool.utf8(attribute.name_index)? == name {
				return Ok(Some(attribute));
			}
		}
		Ok(None)
	}

	/// Reads the `InnerClasses` attribute, giving an empty list if there's none.
	pub fn inner_classes(&self) -> Result<Vec<InnerClass>> {
		let Some(attribute) = self.find_attribute(&self.attributes, "InnerClasses")? else {
			return Ok(Vec::new());
		};

		let mut reader = Cursor::new(&attribute.info);
		reader.read_vec(|r| {
			let inner_class = self.pool.class_name(r.read_u16()?)?;
			let outer_class = self.pool.optional_class_name(r.read_u16()?)?;
			let inner_name = match r.read_u16()? {
				0 => None,
				index => Some(self.pool.utf8(index)?),
			};
			let flags = r.read_u16()?;
			Ok(InnerClass { inner_class, outer_class, inner_name, flags })
		})
			.with_context(|| anyhow!("failed to read InnerClasses attribute of {:?}", self.name()))
	}

	pub fn add_interface(&mut self, name: &str) -> Result<()> {
		let index = self.pool.put_class(name)?;
		self.interfaces.push(index);
		Ok(())
	}

	pub fn add_field(&mut self, access: u16, name: &str, descriptor: &str) -> Result<&mut Member> {
		let member = Member::new(&mut self.pool, access, name, descriptor)?;
		self.fields.push(member);
		self.fields.last_mut().context("field was just added")
	}

	pub fn add_method(&mut self, access: u16, name: &str, descriptor: &str) -> Result<&mut Member> {
		let member = Member::new(&mut self.pool, access, name, descriptor)?;
		self.methods.push(member);
		self.methods.last_mut().context("method was just added")
	}

	pub fn add_attribute(&mut self, name: &str, info: Vec<u8>) -> Result<()> {
		let attribute = Attribute::new(&mut self.pool, name, info)?;
		self.attributes.push(attribute);
		Ok(())
	}
}

impl Member {
	fn new(pool: &mut ConstantPool, access: u16, name: &str, descriptor: &str) -> Result<Member> {
		Ok(Member {
			access,
			name_index: pool.put_utf8(name)?,
			descriptor_index: pool.put_utf8(descriptor)?,
			attributes: Vec::new(),
		})
	}

	fn read(reader: &mut impl Read) -> Result<Member> {
		Ok(Member {
			access: reader.read_u16()?,
			name_index: reader.read_u16()?,
			descriptor_index: reader.read_u16()?,
			attributes: reader.read_vec(Attribute::read)?,
		})
	}

	fn write(&self, writer: &mut impl Write) -> Result<()> {
		writer.write_u16(self.access)?;
		writer.write_u16(self.name_index)?;
		writer.write_u16(self.descriptor_index)?;
		writer.write_vec(&self.attributes, |w, x| x.write(w))
	}
}

impl Attribute {
	pub fn new(pool: &mut ConstantPool, name: &str, info: Vec<u8>) -> Result<Attribute> {
		Ok(Attribute { name_index: pool.put_utf8(name)?, info })
	}

	pub(crate) fn read(reader: &mut impl Read) -> Result<Attribute> {
		let name_index = reader.read_u16()?;
		let length = reader.read_u32()? as usize;
		let info = reader.read_u8_vec(length)?;
		Ok(Attribute { name_index, info })
	}

	pub(crate) fn write(&self, writer: &mut impl Write) -> Result<()> {
		writer.write_u16(self.name_index)?;
		writer.write_usize_as_u32(self.info.len())?;
		writer.write_all(&self.info)?;
		Ok(())
	}
}

/// The contents of a `Code` attribute.
///
/// The bytecode only references the constant pool by index, and is kept as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
	pub max_stack: u16,
	pub max_locals: u16,
	pub code: Vec<u8>,
	/// Entries of `start_pc`, `end_pc`, `handler_pc`, `catch_type`.
	pub exception_table: Vec<[u16; 4]>,
	pub attributes: Vec<Attribute>,
}

impl Code {
	pub fn read(info: &[u8]) -> Result<Code> {
		let mut reader = Cursor::new(info);
		let max_stack = reader.read_u16()?;
		let max_locals = reader.read_u16()?;
		let length = reader.read_u32()? as usize;
		let code = reader.read_u8_vec(length)?;
		let exception_table = reader.read_vec(|r| {
			Ok([r.read_u16()?, r.read_u16()?, r.read_u16()?, r.read_u16()?])
		})?;
		let attributes = reader.read_vec(Attribute::read)?;
		Ok(Code { max_stack, max_locals, code, exception_table, attributes })
	}

	pub fn to_bytes(&self) -> Result<Vec<u8>> {
		let mut writer = Vec::new();
		writer.write_u16(self.max_stack)?;
		writer.write_u16(self.max_locals)?;
		writer.write_usize_as_u32(self.code.len())?;
		writer.write_all(&self.code)?;
		writer.write_vec(&self.exception_table, |w, entry| {
			for &x in entry {
				w.write_u16(x)?;
			}
			Ok(())
		})?;
		writer.write_vec(&self.attributes, |w, x| x.write(w))?;
		Ok(writer)
	}
}
