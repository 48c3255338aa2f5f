//! Remappers for remapping class names, descriptors, signatures, fields and methods.
//!
//! For remapping just classes, descriptors and signatures, you're interested in [`ClassRemapper`].
//! If you also want to remap field names and method names, use the [`MemberRemapper`].
//!
//! In case you want to implement a remapper yourself, you only need to define the trait methods that don't have
//! a default implementation.
//!
//! # What is a "remapper"?
//! A remapper answers the question for you "what is the name of X in namespace Y?"
//!
//! All names here are internal names, so `java/lang/Object` and not `java.lang.Object`.

use std::iter::Peekable;
use std::str::Chars;
use anyhow::{anyhow, bail, Context, Result};

/// A remapper supporting remapping of class names, descriptors and signatures.
pub trait ClassRemapper {
	/// Maps a class name to a new one, if the mapping exists.
	///
	/// If the mapping doesn't exist, returns `Ok(None)`.
	fn map_class_fail(&self, class: &str) -> Result<Option<String>>;

	/// Maps a class name to a new one, if the mapping doesn't exist, return the old one.
	///
	/// Do not implement this yourself.
	fn map_class(&self, class: &str) -> Result<String> {
		Ok(self.map_class_fail(class)?.unwrap_or_else(|| class.to_owned()))
	}

	/// Maps any class name, including array class names like `[[La;`, to a new one.
	///
	/// Do not implement this yourself.
	fn map_class_any(&self, class: &str) -> Result<String> {
		if class.starts_with('[') {
			self.map_desc(class)
		} else {
			self.map_class(class)
		}
	}

	/// Maps a field, method or return descriptor to a new one.
	///
	/// Note that this relies on the fact that for non-existing class mappings class names are just copied over.
	///
	/// Do not implement this yourself.
	fn map_desc(&self, desc: &str) -> Result<String> {
		map_desc(self, desc)
			.with_context(|| anyhow!("failed to remap descriptor {desc:?}"))
	}

	/// Maps a generic signature, as found in the `Signature` attribute, to a new one.
	///
	/// This handles class, method and field signatures. Inner class segments (`LOuter<TT;>.Inner;`) are mapped
	/// by looking up `Outer$Inner`.
	///
	/// Do not implement this yourself.
	fn map_signature(&self, signature: &str) -> Result<String> {
		let mut mapper = SignatureMapper {
			remapper: self,
			chars: signature.chars().peekable(),
			out: String::with_capacity(signature.len()),
		};
		mapper.signature()
			.with_context(|| anyhow!("failed to remap signature {signature:?}"))?;
		Ok(mapper.out)
	}
}

/// A remapper supporting remapping fields and methods, as well as class names and descriptors.
///
/// If you only want to remap class names and descriptors, consider using [`ClassRemapper`] instead.
///
/// Owners and descriptors given to the methods here are always in the source namespace.
pub trait MemberRemapper: ClassRemapper {
	/// Maps a field name to a new one, if the mapping exists.
	///
	/// If the mapping doesn't exist, returns `Ok(None)`.
	fn map_field_fail(&self, owner: &str, name: &str, desc: &str) -> Result<Option<String>>;

	/// Maps a field name to a new one, if the mapping doesn't exist returns the old name.
	///
	/// Do not implement this yourself.
	fn map_field(&self, owner: &str, name: &str, desc: &str) -> Result<String> {
		Ok(self.map_field_fail(owner, name, desc)?.unwrap_or_else(|| name.to_owned()))
	}

	/// Maps a method name to a new one, if the mapping exists.
	///
	/// If the mapping doesn't exist, returns `Ok(None)`.
	fn map_method_fail(&self, owner: &str, name: &str, desc: &str) -> Result<Option<String>>;

	/// Maps a method name to a new one, if the mapping doesn't exist returns the old name.
	///
	/// Do not implement this yourself.
	fn map_method(&self, owner: &str, name: &str, desc: &str) -> Result<String> {
		Ok(self.map_method_fail(owner, name, desc)?.unwrap_or_else(|| name.to_owned()))
	}

	/// Maps the name of an annotation element.
	///
	/// Annotations only store the element name, not the descriptor of the element method, so a remapper that can
	/// look up a method by name alone can implement this. The default keeps all element names.
	fn map_annotation_element(&self, annotation: &str, name: &str) -> Result<Option<String>> {
		let _ = (annotation, name);
		Ok(None)
	}
}

impl<R: ClassRemapper + ?Sized> ClassRemapper for &R {
	fn map_class_fail(&self, class: &str) -> Result<Option<String>> {
		(**self).map_class_fail(class)
	}
}

impl<R: MemberRemapper + ?Sized> MemberRemapper for &R {
	fn map_field_fail(&self, owner: &str, name: &str, desc: &str) -> Result<Option<String>> {
		(**self).map_field_fail(owner, name, desc)
	}

	fn map_method_fail(&self, owner: &str, name: &str, desc: &str) -> Result<Option<String>> {
		(**self).map_method_fail(owner, name, desc)
	}

	fn map_annotation_element(&self, annotation: &str, name: &str) -> Result<Option<String>> {
		(**self).map_annotation_element(annotation, name)
	}
}

/// A remapper that doesn't remap anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityRemapper;

impl ClassRemapper for IdentityRemapper {
	fn map_class_fail(&self, _class: &str) -> Result<Option<String>> {
		Ok(None)
	}
}

impl MemberRemapper for IdentityRemapper {
	fn map_field_fail(&self, _owner: &str, _name: &str, _desc: &str) -> Result<Option<String>> {
		Ok(None)
	}

	fn map_method_fail(&self, _owner: &str, _name: &str, _desc: &str) -> Result<Option<String>> {
		Ok(None)
	}
}

fn map_desc(remapper: &(impl ClassRemapper + ?Sized), desc: &str) -> Result<String> {
	let mut s = String::with_capacity(desc.len());

	let mut iter = desc.chars();

	while let Some(ch) = iter.next() {
		s.push(ch);

		if ch == 'L' {
			let mut class_name = String::new();
			for ch in iter.by_ref() {
				class_name.push(ch);
				if ch == ';' {
					break;
				}
			}
			if class_name.pop() != Some(';') {
				bail!("descriptor {desc:?} has a missing semicolon somewhere");
			}

			s.push_str(&remapper.map_class(&class_name)?);
			s.push(';');
		}
	}

	Ok(s)
}

// The grammar for signatures is (simplified):
//   ClassSignature:
//     TypeParameters? SuperclassSignature SuperinterfaceSignature*
//   MethodSignature:
//     TypeParameters? "(" JavaTypeSignature* ")" Result ThrowsSignature*
//   TypeParameters:
//     "<" (Identifier ":" ReferenceTypeSignature? (":" ReferenceTypeSignature)*)+ ">"
//   ClassTypeSignature:
//     "L" Name TypeArguments? ("." Identifier TypeArguments?)* ";"
//   TypeVariableSignature:
//     "T" Identifier ";"
struct SignatureMapper<'a, R: ?Sized> {
	remapper: &'a R,
	chars: Peekable<Chars<'a>>,
	out: String,
}

impl<R: ClassRemapper + ?Sized> SignatureMapper<'_, R> {
	fn next(&mut self) -> Result<char> {
		self.chars.next().context("unexpected end of signature")
	}

	fn expect(&mut self, expected: char) -> Result<()> {
		let ch = self.next()?;
		if ch != expected {
			bail!("expected {expected:?}, got {ch:?}");
		}
		self.out.push(ch);
		Ok(())
	}

	/// Reads an identifier up to (not including) one of the `end` chars.
	fn identifier(&mut self, end: &[char]) -> Result<String> {
		let mut identifier = String::new();
		while let Some(&ch) = self.chars.peek() {
			if end.contains(&ch) {
				return Ok(identifier);
			}
			identifier.push(ch);
			self.chars.next();
		}
		bail!("unexpected end of signature in identifier {identifier:?}")
	}

	fn signature(&mut self) -> Result<()> {
		if self.chars.peek() == Some(&'<') {
			self.type_parameters()?;
		}
		while let Some(&ch) = self.chars.peek() {
			match ch {
				'(' | ')' | '^' => {
					self.chars.next();
					self.out.push(ch);
				},
				_ => self.type_signature()?,
			}
		}
		Ok(())
	}

	fn type_parameters(&mut self) -> Result<()> {
		self.expect('<')?;
		while self.chars.peek().is_some_and(|&ch| ch != '>') {
			let name = self.identifier(&[':'])?;
			self.out.push_str(&name);
			while self.chars.peek() == Some(&':') {
				self.chars.next();
				self.out.push(':');
				if matches!(self.chars.peek(), Some('L' | 'T' | '[')) {
					self.type_signature()?;
				}
			}
		}
		self.expect('>')
	}

	fn type_signature(&mut self) -> Result<()> {
		match self.next()? {
			ch @ ('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' | 'V') => self.out.push(ch),
			'[' => {
				self.out.push('[');
				self.type_signature()?;
			},
			'T' => {
				self.out.push('T');
				let name = self.identifier(&[';'])?;
				self.out.push_str(&name);
				self.expect(';')?;
			},
			'L' => self.class_type_signature()?,
			ch => bail!("unexpected {ch:?} at the start of a type signature"),
		}
		Ok(())
	}

	/// Called after the `L` was consumed.
	fn class_type_signature(&mut self) -> Result<()> {
		let mut class = self.identifier(&['<', '.', ';'])?;
		let mut mapped = self.remapper.map_class(&class)?;
		self.out.push('L');
		self.out.push_str(&mapped);

		loop {
			match self.next()? {
				'<' => {
					self.out.push('<');
					self.type_arguments()?;
				},
				'.' => {
					let inner = self.identifier(&['<', '.', ';'])?;
					let outer_prefix = format!("{mapped}$");
					class = format!("{class}${inner}");
					mapped = self.remapper.map_class(&class)?;

					let simple = mapped.strip_prefix(&outer_prefix)
						.or_else(|| mapped.rsplit_once('$').map(|(_, simple)| simple))
						.unwrap_or(&mapped);
					self.out.push('.');
					self.out.push_str(simple);
				},
				';' => {
					self.out.push(';');
					return Ok(());
				},
				ch => bail!("unexpected {ch:?} in class type signature"),
			}
		}
	}

	/// Called after the `<` was consumed and written.
	fn type_arguments(&mut self) -> Result<()> {
		loop {
			match self.chars.peek() {
				Some('>') => {
					self.chars.next();
					self.out.push('>');
					return Ok(());
				},
				Some('*') => {
					self.chars.next();
					self.out.push('*');
				},
				Some(&wildcard) if wildcard == '+' || wildcard == '-' => {
					self.chars.next();
					self.out.push(wildcard);
					self.type_signature()?;
				},
				Some(_) => self.type_signature()?,
				None => bail!("unexpected end of signature in type arguments"),
			}
		}
	}
}

#[cfg(test)]
mod testing {
	use std::collections::HashMap;
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::remapper::ClassRemapper;

	struct Classes(HashMap<&'static str, &'static str>);

	impl ClassRemapper for Classes {
		fn map_class_fail(&self, class: &str) -> Result<Option<String>> {
			Ok(self.0.get(class).map(|&x| x.to_owned()))
		}
	}

	fn remapper() -> Classes {
		Classes(HashMap::from([
			("a", "com/example/A"),
			("a$b", "com/example/A$Inner"),
			("c", "com/example/Other"),
			("L", "com/example/L"),
		]))
	}

	#[test]
	fn descriptors() -> Result<()> {
		let r = remapper();
		assert_eq!(r.map_desc("(La;[[Lc;IJ)La$b;")?, "(Lcom/example/A;[[Lcom/example/Other;IJ)Lcom/example/A$Inner;");
		assert_eq!(r.map_desc("Ljava/lang/String;")?, "Ljava/lang/String;");
		assert_eq!(r.map_class_any("[La;")?, "[Lcom/example/A;");
		assert!(r.map_desc("(La").is_err());
		Ok(())
	}

	#[test]
	fn signatures() -> Result<()> {
		let r = remapper();
		assert_eq!(
			r.map_signature("<L:La;T::Ljava/lang/Comparable<TT;>;>Ljava/lang/Object;Ljava/util/List<+Lc;>;")?,
			"<L:Lcom/example/A;T::Ljava/lang/Comparable<TT;>;>Ljava/lang/Object;Ljava/util/List<+Lcom/example/Other;>;"
		);
		assert_eq!(
			r.map_signature("<T:Ljava/lang/Object;>(TT;La<*>.b<TT;>;)[TL;^Lc;")?,
			"<T:Ljava/lang/Object;>(TT;Lcom/example/A<*>.Inner<TT;>;)[TL;^Lcom/example/Other;"
		);
		assert_eq!(r.map_signature("Ljava/util/Map<La;[La;>;")?, "Ljava/util/Map<Lcom/example/A;[Lcom/example/A;>;");
		Ok(())
	}
}
