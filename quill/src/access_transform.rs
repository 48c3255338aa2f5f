//! Access transforms: the low level "make this public" and "remove final" changes applied to classes, methods and
//! fields.
//!
//! An [`AccessTransformSet`] is usually created from access widener entries with
//! [`AccessTransformSet::compile`]. It can be written to and read from the access transformer text format:
//! ```txt
//! public net.minecraft.Foo
//! public-f net.minecraft.Foo bar()V
//! -f net.minecraft.Foo baz
//! ```

use std::fmt::{Display, Formatter};
use std::io::{BufRead, BufReader, Read, Write};
use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexMap;
use crate::access_widener::{AccessWidening, ClassAccess, FieldAccess, MethodAccess};
use crate::table::MemberKey;

const ACC_PUBLIC: u16 = 0x0001;
const ACC_PRIVATE: u16 = 0x0002;
const ACC_PROTECTED: u16 = 0x0004;
const ACC_FINAL: u16 = 0x0010;

/// Java visibility levels, ordered from least to most visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Visibility {
	Private,
	Default,
	Protected,
	Public,
}

impl Visibility {
	fn keyword(self) -> &'static str {
		match self {
			Visibility::Private => "private",
			Visibility::Default => "default",
			Visibility::Protected => "protected",
			Visibility::Public => "public",
		}
	}

	pub fn from_access_flags(access: u16) -> Visibility {
		if access & ACC_PUBLIC != 0 {
			Visibility::Public
		} else if access & ACC_PROTECTED != 0 {
			Visibility::Protected
		} else if access & ACC_PRIVATE != 0 {
			Visibility::Private
		} else {
			Visibility::Default
		}
	}

	fn access_flags(self) -> u16 {
		match self {
			Visibility::Private => ACC_PRIVATE,
			Visibility::Default => 0,
			Visibility::Protected => ACC_PROTECTED,
			Visibility::Public => ACC_PUBLIC,
		}
	}
}

/// What happens to the `final` modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModifierChange {
	#[default]
	None,
	Remove,
	Add,
}

impl ModifierChange {
	fn merge(self, other: ModifierChange) -> Result<ModifierChange> {
		match (self, other) {
			(ModifierChange::None, x) | (x, ModifierChange::None) => Ok(x),
			(a, b) if a == b => Ok(a),
			(a, b) => bail!("cannot merge conflicting modifier changes {a:?} and {b:?}"),
		}
	}
}

/// The change of access of one class, method or field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessTransform {
	/// The visibility is raised to at least this level.
	pub visibility: Option<Visibility>,
	pub final_change: ModifierChange,
}

impl AccessTransform {
	pub const EMPTY: AccessTransform = AccessTransform { visibility: None, final_change: ModifierChange::None };
	pub const PUBLIC: AccessTransform = AccessTransform { visibility: Some(Visibility::Public), final_change: ModifierChange::None };
	pub const PUBLIC_REMOVE_FINAL: AccessTransform = AccessTransform {
		visibility: Some(Visibility::Public),
		final_change: ModifierChange::Remove,
	};
	pub const REMOVE_FINAL: AccessTransform = AccessTransform { visibility: None, final_change: ModifierChange::Remove };

	pub fn is_empty(&self) -> bool {
		*self == AccessTransform::EMPTY
	}

	/// Merges two transforms into one that does both. The wider visibility wins.
	pub fn merge(self, other: AccessTransform) -> Result<AccessTransform> {
		Ok(AccessTransform {
			visibility: self.visibility.max(other.visibility),
			final_change: self.final_change.merge(other.final_change)?,
		})
	}

	/// Applies this transform to the access flags of a class, method or field.
	pub fn apply(&self, access: u16) -> u16 {
		let mut access = access;
		if let Some(visibility) = self.visibility {
			let current = Visibility::from_access_flags(access);
			if visibility > current {
				access = (access & !(ACC_PUBLIC | ACC_PRIVATE | ACC_PROTECTED)) | visibility.access_flags();
			}
		}
		match self.final_change {
			ModifierChange::None => access,
			ModifierChange::Remove => access & !ACC_FINAL,
			ModifierChange::Add => access | ACC_FINAL,
		}
	}
}

impl Display for AccessTransform {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		if let Some(visibility) = self.visibility {
			f.write_str(visibility.keyword())?;
		}
		match self.final_change {
			ModifierChange::None => Ok(()),
			ModifierChange::Remove => f.write_str("-f"),
			ModifierChange::Add => f.write_str("+f"),
		}
	}
}

/// The access transforms of one class and its members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassTransforms {
	pub access: AccessTransform,
	pub methods: IndexMap<MemberKey, AccessTransform>,
	/// Keyed by the field name only.
	pub fields: IndexMap<String, AccessTransform>,
}

/// Access transforms for a set of classes, keyed by internal class name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessTransformSet {
	classes: IndexMap<String, ClassTransforms>,
}

/// The target of one line of an access transformer file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
	Class(String),
	Method { class: String, name: String, desc: String },
	Field { class: String, name: String },
}

impl AccessTransformSet {
	pub fn new() -> AccessTransformSet {
		AccessTransformSet::default()
	}

	/// Folds access widener entries into a set, merging entries for the same symbol.
	///
	/// The visibility part is an approximation: both `accessible` and `extendable` make the symbol `public`. The
	/// access widener itself would make private methods final on `accessible`, and only make package private methods
	/// protected on `extendable`. Neither can be expressed here without looking at the class file.
	pub fn compile(widenings: impl IntoIterator<Item=AccessWidening>) -> Result<AccessTransformSet> {
		let mut set = AccessTransformSet::new();
		for widening in widenings {
			set.add_widening(widening)?;
		}
		Ok(set)
	}

	/// Like [`AccessTransformSet::compile`], but for entries directly out of a reader.
	pub fn compile_results(widenings: impl IntoIterator<Item=Result<AccessWidening>>) -> Result<AccessTransformSet> {
		let mut set = AccessTransformSet::new();
		for widening in widenings {
			set.add_widening(widening?)?;
		}
		Ok(set)
	}

	pub fn add_widening(&mut self, widening: AccessWidening) -> Result<()> {
		match widening {
			AccessWidening::Class { name, access } => {
				let transform = match access {
					ClassAccess::Accessible => AccessTransform::PUBLIC,
					ClassAccess::Extendable => AccessTransform::PUBLIC_REMOVE_FINAL,
				};
				self.merge_class(&name, transform)
			},
			AccessWidening::Method { class, name, descriptor, access } => {
				let transform = match access {
					MethodAccess::Accessible => AccessTransform::PUBLIC,
					MethodAccess::Extendable => AccessTransform::PUBLIC_REMOVE_FINAL,
				};
				self.merge_method(&class, &name, &descriptor, transform)
			},
			AccessWidening::Field { class, name, descriptor: _, access } => {
				let transform = match access {
					FieldAccess::Accessible => AccessTransform::PUBLIC,
					FieldAccess::Mutable => AccessTransform::REMOVE_FINAL,
				};
				self.merge_field(&class, &name, transform)
			},
		}
	}

	fn class_mut(&mut self, class: &str) -> &mut ClassTransforms {
		self.classes.entry(class.to_owned()).or_default()
	}

	pub fn merge_class(&mut self, class: &str, transform: AccessTransform) -> Result<()> {
		let entry = self.class_mut(class);
		entry.access = entry.access.merge(transform)
			.with_context(|| anyhow!("for class {class:?}"))?;
		Ok(())
	}

	pub fn merge_method(&mut self, class: &str, name: &str, desc: &str, transform: AccessTransform) -> Result<()> {
		let entry = self.class_mut(class).methods.entry(MemberKey::new(name, desc)).or_default();
		*entry = entry.merge(transform)
			.with_context(|| anyhow!("for method {class}.{name}{desc}"))?;
		Ok(())
	}

	pub fn merge_field(&mut self, class: &str, name: &str, transform: AccessTransform) -> Result<()> {
		let entry = self.class_mut(class).fields.entry(name.to_owned()).or_default();
		*entry = entry.merge(transform)
			.with_context(|| anyhow!("for field {class}.{name}"))?;
		Ok(())
	}

	pub fn merge_target(&mut self, target: &Target, transform: AccessTransform) -> Result<()> {
		match target {
			Target::Class(class) => self.merge_class(class, transform),
			Target::Method { class, name, desc } => self.merge_method(class, name, desc, transform),
			Target::Field { class, name } => self.merge_field(class, name, transform),
		}
	}

	/// Merges all transforms of `other` into this set.
	pub fn merge(&mut self, other: &AccessTransformSet) -> Result<()> {
		for (class, transforms) in &other.classes {
			self.merge_class(class, transforms.access)?;
			for (key, &transform) in &transforms.methods {
				self.merge_method(class, &key.name, &key.desc, transform)?;
			}
			for (name, &transform) in &transforms.fields {
				self.merge_field(class, name, transform)?;
			}
		}
		Ok(())
	}

	pub fn get_class(&self, class: &str) -> Option<&ClassTransforms> {
		self.classes.get(class)
	}

	pub fn classes(&self) -> impl Iterator<Item=(&str, &ClassTransforms)> {
		self.classes.iter().map(|(class, transforms)| (class.as_str(), transforms))
	}

	/// All non-empty entries, sorted by target.
	pub fn entries(&self) -> Vec<(Target, AccessTransform)> {
		let mut entries = Vec::new();
		for (class, transforms) in &self.classes {
			if !transforms.access.is_empty() {
				entries.push((Target::Class(class.clone()), transforms.access));
			}
			for (key, &transform) in &transforms.methods {
				if !transform.is_empty() {
					entries.push((Target::Method { class: class.clone(), name: key.name.clone(), desc: key.desc.clone() }, transform));
				}
			}
			for (name, &transform) in &transforms.fields {
				if !transform.is_empty() {
					entries.push((Target::Field { class: class.clone(), name: name.clone() }, transform));
				}
			}
		}
		entries.sort_by(|(a, _), (b, _)| format_target(a).cmp(&format_target(b)));
		entries
	}

	/// Writes the set in the access transformer format, sorted, one entry per line.
	pub fn write(&self, writer: &mut impl Write) -> Result<()> {
		for (target, transform) in self.entries() {
			writeln!(writer, "{}", format_entry(&target, transform))?;
		}
		Ok(())
	}

	pub fn write_string(&self) -> Result<String> {
		let mut vec = Vec::new();
		self.write(&mut vec)?;
		String::from_utf8(vec).context("failed to convert written access transformer to utf8")
	}

	/// Reads the access transformer format. Entries for the same target are merged.
	pub fn read(reader: impl Read) -> Result<AccessTransformSet> {
		let mut set = AccessTransformSet::new();
		for (index, line) in BufReader::new(reader).lines().enumerate() {
			let line = line?;
			let entry = parse_entry(&line)
				.with_context(|| anyhow!("in line {}", index + 1))?;
			if let Some((target, transform)) = entry {
				set.merge_target(&target, transform)
					.with_context(|| anyhow!("in line {}", index + 1))?;
			}
		}
		Ok(set)
	}
}

fn format_target(target: &Target) -> String {
	match target {
		Target::Class(class) => class.replace('/', "."),
		Target::Method { class, name, desc } => format!("{} {name}{desc}", class.replace('/', ".")),
		Target::Field { class, name } => format!("{} {name}", class.replace('/', ".")),
	}
}

/// Formats one line of the access transformer format, like `public-f net.minecraft.Foo bar()V`.
pub fn format_entry(target: &Target, transform: AccessTransform) -> String {
	format!("{transform} {}", format_target(target))
}

/// Parses one line of the access transformer format, giving `None` for blank lines and comments.
pub fn parse_entry(line: &str) -> Result<Option<(Target, AccessTransform)>> {
	let line = line.split_once('#').map_or(line, |(before, _)| before);
	let fields: Vec<&str> = line.split_whitespace().collect();
	let (modifier, class, member) = match fields.as_slice() {
		[] => return Ok(None),
		&[modifier, class] => (modifier, class, None),
		&[modifier, class, member] => (modifier, class, Some(member)),
		_ => bail!("expected two or three fields, got {fields:?}"),
	};

	let transform = parse_transform(modifier)?;
	let class = class.replace('.', "/");
	let target = match member {
		None => Target::Class(class),
		Some(member) => match member.find('(') {
			Some(index) => Target::Method {
				class,
				name: member[..index].to_owned(),
				desc: member[index..].to_owned(),
			},
			None => Target::Field { class, name: member.to_owned() },
		},
	};
	Ok(Some((target, transform)))
}

fn parse_transform(modifier: &str) -> Result<AccessTransform> {
	let (visibility, final_change) = if let Some(rest) = modifier.strip_suffix("-f") {
		(rest, ModifierChange::Remove)
	} else if let Some(rest) = modifier.strip_suffix("+f") {
		(rest, ModifierChange::Add)
	} else {
		(modifier, ModifierChange::None)
	};
	let visibility = match visibility {
		"" => None,
		"public" => Some(Visibility::Public),
		"protected" => Some(Visibility::Protected),
		"default" => Some(Visibility::Default),
		"private" => Some(Visibility::Private),
		_ => bail!("unknown access modifier {modifier:?}"),
	};
	if visibility.is_none() && final_change == ModifierChange::None {
		return Err(anyhow!("access modifier {modifier:?} doesn't change anything"));
	}
	Ok(AccessTransform { visibility, final_change })
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::access_transform::{AccessTransform, AccessTransformSet, ModifierChange, Visibility};
	use crate::access_widener::{AccessWidening, ClassAccess, FieldAccess, MethodAccess};

	fn class(name: &str, access: ClassAccess) -> AccessWidening {
		AccessWidening::Class { name: name.to_owned(), access }
	}

	fn widenings() -> Vec<AccessWidening> {
		vec![
			class("Foo", ClassAccess::Accessible),
			class("Foo", ClassAccess::Extendable),
			AccessWidening::Method {
				class: "a/Bar".to_owned(),
				name: "run".to_owned(),
				descriptor: "(La/Foo;)V".to_owned(),
				access: MethodAccess::Accessible,
			},
			AccessWidening::Field {
				class: "a/Bar".to_owned(),
				name: "count".to_owned(),
				descriptor: "I".to_owned(),
				access: FieldAccess::Mutable,
			},
			AccessWidening::Field {
				class: "a/Bar".to_owned(),
				name: "count".to_owned(),
				descriptor: "I".to_owned(),
				access: FieldAccess::Accessible,
			},
		]
	}

	#[test]
	fn compile_merges() -> Result<()> {
		let set = AccessTransformSet::compile(widenings())?;

		let foo = set.get_class("Foo").unwrap();
		assert_eq!(foo.access, AccessTransform { visibility: Some(Visibility::Public), final_change: ModifierChange::Remove });

		let bar = set.get_class("a/Bar").unwrap();
		assert_eq!(bar.access, AccessTransform::EMPTY);
		assert_eq!(bar.fields["count"], AccessTransform::PUBLIC_REMOVE_FINAL);
		assert_eq!(bar.methods.len(), 1);
		Ok(())
	}

	#[test]
	fn order_does_not_matter() -> Result<()> {
		let forwards = AccessTransformSet::compile(widenings())?;
		let backwards = AccessTransformSet::compile(widenings().into_iter().rev())?;
		assert_eq!(forwards, backwards);

		let written = forwards.write_string()?;
		assert_eq!(written, backwards.write_string()?);
		assert_eq!(AccessTransformSet::read(written.as_bytes())?, forwards);
		Ok(())
	}

	#[test]
	fn write() -> Result<()> {
		let set = AccessTransformSet::compile(widenings())?;
		assert_eq!(set.write_string()?, "\
public-f Foo
public-f a.Bar count
public a.Bar run(La/Foo;)V
");
		Ok(())
	}

	#[test]
	fn read_errors() {
		assert!(AccessTransformSet::read("publik Foo\n".as_bytes()).is_err());
		assert!(AccessTransformSet::read("public\n".as_bytes()).is_err());
		assert!(AccessTransformSet::read("-f Foo\n+f Foo\n".as_bytes()).is_err());
	}

	#[test]
	fn apply() {
		let private_final = 0x0002 | 0x0010;
		assert_eq!(AccessTransform::PUBLIC_REMOVE_FINAL.apply(private_final), 0x0001);
		assert_eq!(AccessTransform::PUBLIC.apply(private_final), 0x0001 | 0x0010);
		assert_eq!(AccessTransform::REMOVE_FINAL.apply(0x0004 | 0x0010), 0x0004);
		let protected = AccessTransform { visibility: Some(Visibility::Protected), final_change: ModifierChange::None };
		assert_eq!(protected.apply(0x0001), 0x0001);
	}
}
