//! Rewriting all references in a class file with a [`MemberRemapper`].
//!
//! The constant pool is rewritten in place: `Class` entries and member references keep their index, so the
//! bytecode (which only refers to the pool by index) stays untouched. Strings that don't change keep their original
//! `Utf8` entries, new strings are added at the end of the pool. This means that remapping with a remapper that
//! doesn't change anything gives back the exact input bytes.

use std::io::Cursor;
use anyhow::{anyhow, bail, Context, Result};
use crate::class_file::{Attribute, ClassFile, Code, Member};
use crate::io::{ClassRead, ClassWrite};
use crate::pool::{ConstantPool, PoolEntry};
use crate::remapper::MemberRemapper;

const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";

/// Reserved words of the java language, `this` excluded as it names the receiver in local variable tables.
const KEYWORDS: [&str; 53] = [
	"abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const", "continue",
	"default", "do", "double", "else", "enum", "extends", "final", "finally", "float", "for", "goto", "if",
	"implements", "import", "instanceof", "int", "interface", "long", "native", "new", "package", "private",
	"protected", "public", "return", "short", "static", "strictfp", "super", "switch", "synchronized", "throw",
	"throws", "transient", "try", "void", "volatile", "while", "true", "false", "null", "_",
];

#[derive(Debug, Clone)]
pub struct RemapOptions {
	/// Replace the `SourceFile` attribute of renamed classes with `<outermost simple name>.java`.
	pub rebuild_source_file: bool,
	/// Rename local variables whose names aren't valid java identifiers to `lv<slot>`.
	pub rename_invalid_locals: bool,
}

impl Default for RemapOptions {
	fn default() -> Self {
		RemapOptions { rebuild_source_file: true, rename_invalid_locals: false }
	}
}

/// One entry of the `BootstrapMethods` attribute.
#[derive(Debug, Clone)]
struct BootstrapMethod {
	method_handle: u16,
	arguments: Vec<u16>,
}

fn read_bootstrap_methods(class: &ClassFile) -> Result<Vec<BootstrapMethod>> {
	let Some(attribute) = class.find_attribute(&class.attributes, "BootstrapMethods")? else {
		return Ok(Vec::new());
	};
	Cursor::new(&attribute.info)
		.read_vec(|r| Ok(BootstrapMethod {
			method_handle: r.read_u16()?,
			arguments: r.read_vec(|r| r.read_u16())?,
		}))
		.context("failed to read BootstrapMethods attribute")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemappedClass {
	/// The internal name of the class before remapping.
	pub original_name: String,
	/// The new internal name of the class.
	pub name: String,
	pub bytes: Vec<u8>,
}

/// Remaps the class given by `bytes`.
pub fn remap_class(bytes: &[u8], remapper: &(impl MemberRemapper + ?Sized), options: &RemapOptions) -> Result<RemappedClass> {
	let mut class = ClassFile::read(bytes)?;
	let bootstrap_methods = read_bootstrap_methods(&class)?;

	let old = class.pool.clone();
	let owner = old.class_name(class.this_class)?;
	let new_owner = remapper.map_class(&owner)?;

	let mut rewriter = Rewriter {
		old: &old,
		pool: &mut class.pool,
		remapper,
		owner: &owner,
		new_owner: &new_owner,
		options,
		bootstrap_methods: &bootstrap_methods,
	};

	rewriter.pool_entries()
		.with_context(|| anyhow!("failed to remap constant pool of {owner:?}"))?;
	for field in &mut class.fields {
		rewriter.field(field)
			.with_context(|| anyhow!("failed to remap field of {owner:?}"))?;
	}
	for method in &mut class.methods {
		rewriter.method(method)
			.with_context(|| anyhow!("failed to remap method of {owner:?}"))?;
	}
	rewriter.attributes(&mut class.attributes)
		.with_context(|| anyhow!("failed to remap attributes of {owner:?}"))?;

	Ok(RemappedClass {
		bytes: class.to_bytes()?,
		original_name: owner,
		name: new_owner,
	})
}

type MapMember<R> = fn(&R, &str, &str, &str) -> Result<String>;

struct Rewriter<'a, R: ?Sized> {
	/// The pool as it was before remapping, all reads of old names go here.
	old: &'a ConstantPool,
	pool: &'a mut ConstantPool,
	remapper: &'a R,
	owner: &'a str,
	new_owner: &'a str,
	options: &'a RemapOptions,
	bootstrap_methods: &'a [BootstrapMethod],
}

impl<R: MemberRemapper + ?Sized> Rewriter<'_, R> {
	/// Gives back `index` if it already holds `new`, otherwise puts `new` into the pool.
	fn utf8(&mut self, index: u16, new: &str) -> Result<u16> {
		if self.old.utf8(index)? == new {
			Ok(index)
		} else {
			self.pool.put_utf8(new)
		}
	}

	fn name_and_type(&mut self, index: u16, name: &str, desc: &str) -> Result<u16> {
		let (old_name, old_desc) = self.old.name_and_type(index)?;
		if old_name == name && old_desc == desc {
			Ok(index)
		} else {
			self.pool.put_name_and_type(name, desc)
		}
	}

	fn pool_entries(&mut self) -> Result<()> {
		let old = self.old;
		for (index, entry) in old.iter() {
			let new = match *entry {
				PoolEntry::Class { name_index } => {
					let name = old.utf8(name_index)?;
					let mapped = self.remapper.map_class_any(&name)?;
					PoolEntry::Class { name_index: self.utf8(name_index, &mapped)? }
				},
				PoolEntry::FieldRef { class_index, name_and_type_index } => PoolEntry::FieldRef {
					class_index,
					name_and_type_index: self.member_ref(class_index, name_and_type_index, R::map_field)?,
				},
				PoolEntry::MethodRef { class_index, name_and_type_index } => PoolEntry::MethodRef {
					class_index,
					name_and_type_index: self.member_ref(class_index, name_and_type_index, R::map_method)?,
				},
				PoolEntry::InterfaceMethodRef { class_index, name_and_type_index } => PoolEntry::InterfaceMethodRef {
					class_index,
					name_and_type_index: self.member_ref(class_index, name_and_type_index, R::map_method)?,
				},
				PoolEntry::MethodType { descriptor_index } => {
					let desc = old.utf8(descriptor_index)?;
					let mapped = self.remapper.map_desc(&desc)?;
					PoolEntry::MethodType { descriptor_index: self.utf8(descriptor_index, &mapped)? }
				},
				PoolEntry::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index } => PoolEntry::InvokeDynamic {
					bootstrap_method_attr_index,
					name_and_type_index: self.invoke_dynamic(bootstrap_method_attr_index, name_and_type_index)?,
				},
				PoolEntry::Dynamic { bootstrap_method_attr_index, name_and_type_index } => PoolEntry::Dynamic {
					bootstrap_method_attr_index,
					name_and_type_index: self.dynamic_name_and_type(name_and_type_index)?,
				},
				_ => continue,
			};
			self.pool.replace(index, new)
				.with_context(|| anyhow!("failed to replace constant pool entry {index}"))?;
		}
		Ok(())
	}

	fn member_ref(&mut self, class_index: u16, name_and_type_index: u16, map: MapMember<R>) -> Result<u16> {
		let owner = self.old.class_name(class_index)?;
		let (name, desc) = self.old.name_and_type(name_and_type_index)?;

		// methods called on arrays, like `clone`, are never mapped, neither are constructors
		let new_name = if owner.starts_with('[') || name.starts_with('<') {
			name
		} else {
			map(self.remapper, &owner, &name, &desc)
				.with_context(|| anyhow!("failed to remap reference to {owner}.{name}{desc}"))?
		};
		let new_desc = self.remapper.map_desc(&desc)?;
		self.name_and_type(name_and_type_index, &new_name, &new_desc)
	}

	/// Only the descriptor is remapped, the name is given to the bootstrap method as is.
	fn dynamic_name_and_type(&mut self, name_and_type_index: u16) -> Result<u16> {
		let (name, desc) = self.old.name_and_type(name_and_type_index)?;
		let new_desc = self.remapper.map_desc(&desc)?;
		self.name_and_type(name_and_type_index, &name, &new_desc)
	}

	/// For lambdas and method references, the name is the name of the method of the functional interface.
	fn invoke_dynamic(&mut self, bootstrap_method_attr_index: u16, name_and_type_index: u16) -> Result<u16> {
		let (name, desc) = self.old.name_and_type(name_and_type_index)?;
		let new_name = match self.lambda_sam_desc(bootstrap_method_attr_index)? {
			Some(sam_desc) => {
				let interface = desc.rsplit_once(')')
					.and_then(|(_, ret)| ret.strip_prefix('L')?.strip_suffix(';'))
					.with_context(|| anyhow!("lambda call site {name}{desc} doesn't return an object"))?;
				self.remapper.map_method(interface, &name, &sam_desc)
					.with_context(|| anyhow!("failed to remap lambda call site {name}{desc}"))?
			},
			None => name,
		};
		let new_desc = self.remapper.map_desc(&desc)?;
		self.name_and_type(name_and_type_index, &new_name, &new_desc)
	}

	/// Gives the descriptor of the implemented method, if the bootstrap method is one of the `LambdaMetafactory`.
	fn lambda_sam_desc(&self, bootstrap_method_attr_index: u16) -> Result<Option<String>> {
		let Some(bootstrap) = self.bootstrap_methods.get(bootstrap_method_attr_index as usize) else {
			bail!("invokedynamic refers to missing bootstrap method {bootstrap_method_attr_index}");
		};
		let PoolEntry::MethodHandle { reference_index, .. } = *self.old.get(bootstrap.method_handle)? else {
			bail!("bootstrap method {bootstrap_method_attr_index} isn't a method handle");
		};
		let (PoolEntry::MethodRef { class_index, name_and_type_index }
			| PoolEntry::InterfaceMethodRef { class_index, name_and_type_index }) = *self.old.get(reference_index)? else {
			return Ok(None);
		};

		let (name, _) = self.old.name_and_type(name_and_type_index)?;
		if self.old.class_name(class_index)? != LAMBDA_METAFACTORY || !(name == "metafactory" || name == "altMetafactory") {
			return Ok(None);
		}

		let Some(&sam) = bootstrap.arguments.first() else {
			bail!("lambda bootstrap method {bootstrap_method_attr_index} has no arguments");
		};
		let PoolEntry::MethodType { descriptor_index } = *self.old.get(sam)? else {
			bail!("first argument of lambda bootstrap method {bootstrap_method_attr_index} isn't a method type");
		};
		self.old.utf8(descriptor_index).map(Some)
	}

	fn local_name(&mut self, name_index: u16, slot: u16) -> Result<u16> {
		if !self.options.rename_invalid_locals || is_java_identifier(&self.old.utf8(name_index)?) {
			Ok(name_index)
		} else {
			self.utf8(name_index, &format!("lv{slot}"))
		}
	}

	fn field(&mut self, field: &mut Member) -> Result<()> {
		let name = self.old.utf8(field.name_index)?;
		let desc = self.old.utf8(field.descriptor_index)?;

		let new_name = self.remapper.map_field(self.owner, &name, &desc)?;
		let new_desc = self.remapper.map_desc(&desc)?;
		field.name_index = self.utf8(field.name_index, &new_name)?;
		field.descriptor_index = self.utf8(field.descriptor_index, &new_desc)?;

		self.attributes(&mut field.attributes)
			.with_context(|| anyhow!("failed to remap attributes of field {name:?} {desc:?}"))
	}

	fn method(&mut self, method: &mut Member) -> Result<()> {
		let name = self.old.utf8(method.name_index)?;
		let desc = self.old.utf8(method.descriptor_index)?;

		// <init> and <clinit>
		if !name.starts_with('<') {
			let new_name = self.remapper.map_method(self.owner, &name, &desc)?;
			method.name_index = self.utf8(method.name_index, &new_name)?;
		}
		let new_desc = self.remapper.map_desc(&desc)?;
		method.descriptor_index = self.utf8(method.descriptor_index, &new_desc)?;

		self.attributes(&mut method.attributes)
			.with_context(|| anyhow!("failed to remap attributes of method {name:?} {desc:?}"))
	}

	fn attributes(&mut self, attributes: &mut [Attribute]) -> Result<()> {
		for attribute in attributes {
			let name = self.old.utf8(attribute.name_index)?;
			let new_info = self.attribute(&name, &attribute.info)
				.with_context(|| anyhow!("failed to remap {name} attribute"))?;
			if let Some(new_info) = new_info {
				attribute.info = new_info;
			}
		}
		Ok(())
	}

	/// Gives back the new contents of the attribute, or `None` if it's copied as is.
	///
	/// Type annotations are copied as is, the type paths in them don't need remapping, and the annotation types in
	/// them are left as they are.
	fn attribute(&mut self, name: &str, info: &[u8]) -> Result<Option<Vec<u8>>> {
		let mut r = Cursor::new(info);
		let mut w = Vec::with_capacity(info.len());
		match name {
			"Code" => {
				let mut code = Code::read(info)?;
				self.attributes(&mut code.attributes)?;
				return code.to_bytes().map(Some);
			},
			"Signature" => {
				let index = r.read_u16()?;
				let signature = self.old.utf8(index)?;
				let mapped = self.remapper.map_signature(&signature)?;
				w.write_u16(self.utf8(index, &mapped)?)?;
			},
			"LocalVariableTable" | "LocalVariableTypeTable" => {
				let generic = name == "LocalVariableTypeTable";
				let count = r.read_u16()?;
				w.write_u16(count)?;
				for _ in 0..count {
					let start_pc = r.read_u16()?;
					let length = r.read_u16()?;
					let name_index = r.read_u16()?;
					let desc_index = r.read_u16()?;
					let slot = r.read_u16()?;

					let desc = self.old.utf8(desc_index)?;
					let mapped = if generic {
						self.remapper.map_signature(&desc)?
					} else {
						self.remapper.map_desc(&desc)?
					};
					w.write_u16(start_pc)?;
					w.write_u16(length)?;
					w.write_u16(self.local_name(name_index, slot)?)?;
					w.write_u16(self.utf8(desc_index, &mapped)?)?;
					w.write_u16(slot)?;
				}
			},
			"InnerClasses" => {
				let count = r.read_u16()?;
				w.write_u16(count)?;
				for _ in 0..count {
					let inner_index = r.read_u16()?;
					let outer_index = r.read_u16()?;
					let inner_name_index = r.read_u16()?;
					let flags = r.read_u16()?;

					w.write_u16(inner_index)?;
					w.write_u16(outer_index)?;
					w.write_u16(self.inner_name(inner_index, outer_index, inner_name_index)?)?;
					w.write_u16(flags)?;
				}
			},
			"EnclosingMethod" => {
				let class_index = r.read_u16()?;
				let method_index = r.read_u16()?;
				w.write_u16(class_index)?;
				if method_index == 0 {
					w.write_u16(0)?;
				} else {
					let owner = self.old.class_name(class_index)?;
					let (name, desc) = self.old.name_and_type(method_index)?;
					let new_name = self.remapper.map_method(&owner, &name, &desc)?;
					let new_desc = self.remapper.map_desc(&desc)?;
					w.write_u16(self.name_and_type(method_index, &new_name, &new_desc)?)?;
				}
			},
			"RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
				self.annotations(&mut r, &mut w)?;
			},
			"RuntimeVisibleParameterAnnotations" | "RuntimeInvisibleParameterAnnotations" => {
				let parameters = r.read_u8()?;
				w.write_u8(parameters)?;
				for _ in 0..parameters {
					self.annotations(&mut r, &mut w)?;
				}
			},
			"AnnotationDefault" => {
				self.element_value(&mut r, &mut w)?;
			},
			"Record" => {
				let count = r.read_u16()?;
				w.write_u16(count)?;
				for _ in 0..count {
					let mut component = Member {
						access: 0,
						name_index: r.read_u16()?,
						descriptor_index: r.read_u16()?,
						attributes: r.read_vec(Attribute::read)?,
					};
					// record components are named like their fields
					self.field(&mut component)?;
					w.write_u16(component.name_index)?;
					w.write_u16(component.descriptor_index)?;
					w.write_vec(&component.attributes, |w, x| x.write(w))?;
				}
			},
			"SourceFile" if self.options.rebuild_source_file && self.owner != self.new_owner => {
				let index = r.read_u16()?;
				let new_owner = self.new_owner;
				let simple = new_owner.rsplit('/').next().unwrap_or(new_owner);
				let outermost = simple.split('$').next().unwrap_or(simple);
				w.write_u16(self.utf8(index, &format!("{outermost}.java"))?)?;
			},
			_ => return Ok(None),
		}

		if r.position() != info.len() as u64 {
			bail!("attribute has {} trailing bytes", info.len() as u64 - r.position());
		}
		Ok(Some(w))
	}

	/// The simple name of an inner class follows the new name of the inner class, if it could be derived from the old
	/// name in the same way.
	fn inner_name(&mut self, inner_index: u16, outer_index: u16, inner_name_index: u16) -> Result<u16> {
		if inner_name_index == 0 {
			return Ok(0);
		}

		let old_inner = self.old.class_name(inner_index)?;
		let new_inner = self.pool.class_name(inner_index)?;
		if old_inner == new_inner {
			return Ok(inner_name_index);
		}
		let old_outer = self.old.optional_class_name(outer_index)?;
		let new_outer = self.pool.optional_class_name(outer_index)?;

		let old_simple = self.old.utf8(inner_name_index)?;
		if inner_simple_name(&old_inner, old_outer.as_deref()) != old_simple {
			return Ok(inner_name_index);
		}

		let new_simple = inner_simple_name(&new_inner, new_outer.as_deref()).to_owned();
		self.utf8(inner_name_index, &new_simple)
	}

	fn annotations(&mut self, r: &mut Cursor<&[u8]>, w: &mut Vec<u8>) -> Result<()> {
		let count = r.read_u16()?;
		w.write_u16(count)?;
		for _ in 0..count {
			self.annotation(r, w)?;
		}
		Ok(())
	}

	fn annotation(&mut self, r: &mut Cursor<&[u8]>, w: &mut Vec<u8>) -> Result<()> {
		let type_index = r.read_u16()?;
		let desc = self.old.utf8(type_index)?;
		let new_desc = self.remapper.map_desc(&desc)?;
		w.write_u16(self.utf8(type_index, &new_desc)?)?;

		let annotation = class_of_desc(&desc);

		let pairs = r.read_u16()?;
		w.write_u16(pairs)?;
		for _ in 0..pairs {
			let name_index = r.read_u16()?;
			let name = self.old.utf8(name_index)?;
			if let Some(new_name) = self.remapper.map_annotation_element(annotation, &name)? {
				w.write_u16(self.utf8(name_index, &new_name)?)?;
			} else {
				w.write_u16(name_index)?;
			}
			self.element_value(r, w)?;
		}
		Ok(())
	}

	fn element_value(&mut self, r: &mut Cursor<&[u8]>, w: &mut Vec<u8>) -> Result<()> {
		let tag = r.read_u8()?;
		w.write_u8(tag)?;
		match tag {
			b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => {
				w.write_u16(r.read_u16()?)?;
			},
			b'e' => {
				let type_index = r.read_u16()?;
				let const_index = r.read_u16()?;
				let desc = self.old.utf8(type_index)?;
				let name = self.old.utf8(const_index)?;

				let new_name = self.remapper.map_field(class_of_desc(&desc), &name, &desc)?;
				let new_desc = self.remapper.map_desc(&desc)?;
				w.write_u16(self.utf8(type_index, &new_desc)?)?;
				w.write_u16(self.utf8(const_index, &new_name)?)?;
			},
			b'c' => {
				let index = r.read_u16()?;
				let desc = self.old.utf8(index)?;
				let new_desc = self.remapper.map_desc(&desc)?;
				w.write_u16(self.utf8(index, &new_desc)?)?;
			},
			b'@' => self.annotation(r, w)?,
			b'[' => {
				let count = r.read_u16()?;
				w.write_u16(count)?;
				for _ in 0..count {
					self.element_value(r, w)?;
				}
			},
			tag => bail!("unknown element value tag {:?}", tag as char),
		}
		Ok(())
	}
}

/// `Lpkg/Name;` to `pkg/Name`.
fn class_of_desc(desc: &str) -> &str {
	desc.strip_prefix('L')
		.and_then(|x| x.strip_suffix(';'))
		.unwrap_or(desc)
}

fn is_java_identifier(name: &str) -> bool {
	let mut chars = name.chars();
	chars.next().is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
		&& chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
		&& !KEYWORDS.contains(&name)
}

fn inner_simple_name<'a>(inner: &'a str, outer: Option<&str>) -> &'a str {
	outer.and_then(|outer| inner.strip_prefix(outer)?.strip_prefix('$'))
		.or_else(|| inner.rsplit_once('$').map(|(_, simple)| simple))
		.unwrap_or_else(|| inner.rsplit('/').next().unwrap_or(inner))
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use crate::remap::{class_of_desc, inner_simple_name, is_java_identifier};

	#[test]
	fn simple_names() {
		assert_eq!(inner_simple_name("com/example/A$Inner", Some("com/example/A")), "Inner");
		assert_eq!(inner_simple_name("com/example/A$B$C", Some("com/example/A$B")), "C");
		assert_eq!(inner_simple_name("com/example/Other$Inner", Some("com/example/A")), "Inner");
		assert_eq!(inner_simple_name("com/example/Flat", None), "Flat");
		assert_eq!(class_of_desc("Lcom/example/A;"), "com/example/A");
	}

	#[test]
	fn java_identifiers() {
		for valid in ["this", "value", "$x", "_a", "i2", "\u{e4}rger"] {
			assert!(is_java_identifier(valid), "{valid:?}");
		}
		for invalid in ["", "2x", "\u{2603}", "a-b", "if", "class", "_", "null"] {
			assert!(!is_java_identifier(invalid), "{invalid:?}");
		}
	}
}
