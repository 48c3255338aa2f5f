use std::collections::HashMap;
use anyhow::{Context, Result};
use pretty_assertions::assert_eq;
use duke::class_file::{Attribute, ClassFile, Code, InnerClass};
use duke::pool::PoolEntry;
use duke::remapper::{ClassRemapper, IdentityRemapper, MemberRemapper};
use duke::{remap_class, RemapOptions};

type Key = (String, String, String);

#[derive(Default)]
struct Table {
	classes: HashMap<String, String>,
	fields: HashMap<Key, String>,
	methods: HashMap<Key, String>,
}

fn key(owner: &str, name: &str, desc: &str) -> Key {
	(owner.to_owned(), name.to_owned(), desc.to_owned())
}

impl ClassRemapper for Table {
	fn map_class_fail(&self, class: &str) -> Result<Option<String>> {
		Ok(self.classes.get(class).cloned())
	}
}

impl MemberRemapper for Table {
	fn map_field_fail(&self, owner: &str, name: &str, desc: &str) -> Result<Option<String>> {
		Ok(self.fields.get(&key(owner, name, desc)).cloned())
	}

	fn map_method_fail(&self, owner: &str, name: &str, desc: &str) -> Result<Option<String>> {
		Ok(self.methods.get(&key(owner, name, desc)).cloned())
	}
}

fn table() -> Table {
	let mut table = Table::default();
	table.classes.insert("a".to_owned(), "com/example/A".to_owned());
	table.classes.insert("a$b".to_owned(), "com/example/A$Inner".to_owned());
	table.fields.insert(key("a", "f", "La;"), "value".to_owned());
	table.methods.insert(key("a", "m", "(La;)La;"), "run".to_owned());
	table.methods.insert(key("a", "clone", "()Ljava/lang/Object;"), "wrong".to_owned());
	table.methods.insert(key("a", "<init>", "()V"), "wrong".to_owned());
	table
}

/// The class `a` with a field `f`, a method `m` reading that field, a constructor, and an inner class `a$b`.
fn class_a() -> Result<Vec<u8>> {
	let mut class = ClassFile::new(52, 0x21, "a", None)?;

	let field_ref = class.pool.put_field_ref("a", "f", "La;")?.to_be_bytes();
	let clone_ref = class.pool.put_method_ref("[La;", "clone", "()Ljava/lang/Object;")?.to_be_bytes();
	let code = Code {
		max_stack: 1,
		max_locals: 2,
		code: vec![
			0x2a, // aload_0
			0xb4, field_ref[0], field_ref[1], // getfield
			0xb6, clone_ref[0], clone_ref[1], // invokevirtual
			0xb0, // areturn
		],
		exception_table: Vec::new(),
		attributes: Vec::new(),
	};
	let code = Attribute::new(&mut class.pool, "Code", code.to_bytes()?)?;

	let signature = class.pool.put_utf8("Ljava/util/List<La$b;>;")?.to_be_bytes();
	let signature = Attribute::new(&mut class.pool, "Signature", signature.to_vec())?;

	class.add_field(0x2, "f", "La;")?.attributes.push(signature);
	class.add_method(0x1, "m", "(La;)La;")?.attributes.push(code);
	class.add_method(0x1, "<init>", "()V")?;

	let source_file = class.pool.put_utf8("SourceFile")?.to_be_bytes();
	class.add_attribute("SourceFile", source_file.to_vec())?;

	let inner = class.pool.put_class("a$b")?.to_be_bytes();
	let outer = class.pool.put_class("a")?.to_be_bytes();
	let name = class.pool.put_utf8("b")?.to_be_bytes();
	let inner_classes = [&[0, 1][..], &inner[..], &outer[..], &name[..], &[0, 0x9][..]].concat();
	class.add_attribute("InnerClasses", inner_classes)?;

	class.to_bytes()
}

fn utf8_of(class: &ClassFile, index: u16) -> Result<String> {
	class.pool.utf8(index)
}

#[test]
fn identity_keeps_bytes() -> Result<()> {
	let bytes = class_a()?;

	let remapped = remap_class(&bytes, &IdentityRemapper, &RemapOptions::default())?;
	assert_eq!(remapped.name, "a");
	assert!(remapped.bytes == bytes, "identity remapping changed the class bytes");

	// a table that has nothing for this class must also leave it alone
	let mut unrelated = Table::default();
	unrelated.classes.insert("x".to_owned(), "com/example/X".to_owned());
	let remapped = remap_class(&bytes, &unrelated, &RemapOptions::default())?;
	assert!(remapped.bytes == bytes, "unrelated remapping changed the class bytes");
	Ok(())
}

#[test]
fn renames_declarations_and_references() -> Result<()> {
	let remapped = remap_class(&class_a()?, &table(), &RemapOptions::default())?;
	assert_eq!(remapped.name, "com/example/A");

	let class = ClassFile::read(&remapped.bytes)?;
	assert_eq!(class.name()?, "com/example/A");

	let field = &class.fields[0];
	assert_eq!(utf8_of(&class, field.name_index)?, "value");
	assert_eq!(utf8_of(&class, field.descriptor_index)?, "Lcom/example/A;");
	let signature = class.find_attribute(&field.attributes, "Signature")?.context("no signature")?;
	let signature = u16::from_be_bytes([signature.info[0], signature.info[1]]);
	assert_eq!(utf8_of(&class, signature)?, "Ljava/util/List<Lcom/example/A$Inner;>;");

	let method = &class.methods[0];
	assert_eq!(utf8_of(&class, method.name_index)?, "run");
	assert_eq!(utf8_of(&class, method.descriptor_index)?, "(Lcom/example/A;)Lcom/example/A;");
	assert_eq!(utf8_of(&class, class.methods[1].name_index)?, "<init>");

	let code = class.find_attribute(&method.attributes, "Code")?.context("no code")?;
	let code = Code::read(&code.info)?;

	let &PoolEntry::FieldRef { class_index, name_and_type_index } = class.pool.get(u16::from_be_bytes([code.code[2], code.code[3]]))? else {
		panic!("getfield doesn't point to a field ref");
	};
	assert_eq!(class.pool.class_name(class_index)?, "com/example/A");
	assert_eq!(class.pool.name_and_type(name_and_type_index)?, ("value".to_owned(), "Lcom/example/A;".to_owned()));

	let &PoolEntry::MethodRef { class_index, name_and_type_index } = class.pool.get(u16::from_be_bytes([code.code[5], code.code[6]]))? else {
		panic!("invokevirtual doesn't point to a method ref");
	};
	assert_eq!(class.pool.class_name(class_index)?, "[Lcom/example/A;");
	assert_eq!(class.pool.name_and_type(name_and_type_index)?.0, "clone");

	assert_eq!(class.inner_classes()?, vec![InnerClass {
		inner_class: "com/example/A$Inner".to_owned(),
		outer_class: Some("com/example/A".to_owned()),
		inner_name: Some("Inner".to_owned()),
		flags: 0x9,
	}]);

	let source_file = class.find_attribute(&class.attributes, "SourceFile")?.context("no source file")?;
	assert_eq!(utf8_of(&class, u16::from_be_bytes([source_file.info[0], source_file.info[1]]))?, "A.java");
	Ok(())
}

#[test]
fn source_file_kept_if_not_rebuilding() -> Result<()> {
	let options = RemapOptions { rebuild_source_file: false, ..RemapOptions::default() };
	let class = ClassFile::read(&remap_class(&class_a()?, &table(), &options)?.bytes)?;

	let source_file = class.find_attribute(&class.attributes, "SourceFile")?.context("no source file")?;
	assert_eq!(utf8_of(&class, u16::from_be_bytes([source_file.info[0], source_file.info[1]]))?, "SourceFile");
	Ok(())
}

#[test]
fn broken_class_fails() {
	let mut bytes = class_a().unwrap();
	bytes.truncate(bytes.len() - 3);
	assert!(remap_class(&bytes, &table(), &RemapOptions::default()).is_err());
}

/// The class `c` with one lambda call site creating a `b` whose method `a` is implemented by `c.lambda$0`, and one
/// string concatenation call site named `a` too.
fn class_with_call_sites() -> Result<Vec<u8>> {
	let mut class = ClassFile::new(52, 0x21, "c", None)?;

	let metafactory = class.pool.put_method_ref(
		"java/lang/invoke/LambdaMetafactory",
		"metafactory",
		"(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;",
	)?;
	let metafactory = class.pool.put(PoolEntry::MethodHandle { reference_kind: 6, reference_index: metafactory })?;
	let sam = class.pool.put_utf8("()V")?;
	let sam = class.pool.put(PoolEntry::MethodType { descriptor_index: sam })?;
	let implementation = class.pool.put_method_ref("c", "lambda$0", "()V")?;
	let implementation = class.pool.put(PoolEntry::MethodHandle { reference_kind: 6, reference_index: implementation })?;

	let concat = class.pool.put_method_ref(
		"java/lang/invoke/StringConcatFactory",
		"makeConcatWithConstants",
		"(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;",
	)?;
	let concat = class.pool.put(PoolEntry::MethodHandle { reference_kind: 6, reference_index: concat })?;
	let recipe = class.pool.put_string("\u{1}!")?;

	let bootstrap_methods = [
		&[0, 2][..],
		&metafactory.to_be_bytes(), &[0, 3], &sam.to_be_bytes(), &implementation.to_be_bytes(), &sam.to_be_bytes(),
		&concat.to_be_bytes(), &[0, 1], &recipe.to_be_bytes(),
	].concat();
	class.add_attribute("BootstrapMethods", bootstrap_methods)?;

	let lambda = class.pool.put_name_and_type("a", "()Lb;")?;
	class.pool.put(PoolEntry::InvokeDynamic { bootstrap_method_attr_index: 0, name_and_type_index: lambda })?;
	let concat = class.pool.put_name_and_type("a", "(Lb;)Ljava/lang/String;")?;
	class.pool.put(PoolEntry::InvokeDynamic { bootstrap_method_attr_index: 1, name_and_type_index: concat })?;

	class.to_bytes()
}

#[test]
fn lambda_call_sites_are_named_after_the_interface_method() -> Result<()> {
	let mut table = Table::default();
	table.classes.insert("b".to_owned(), "com/example/Task".to_owned());
	table.methods.insert(key("b", "a", "()V"), "run".to_owned());

	let class = ClassFile::read(&remap_class(&class_with_call_sites()?, &table, &RemapOptions::default())?.bytes)?;

	let mut call_sites = Vec::new();
	for (_, entry) in class.pool.iter() {
		if let &PoolEntry::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index } = entry {
			call_sites.push((bootstrap_method_attr_index, class.pool.name_and_type(name_and_type_index)?));
		}
	}
	assert_eq!(call_sites, vec![
		(0, ("run".to_owned(), "()Lcom/example/Task;".to_owned())),
		(1, ("a".to_owned(), "(Lcom/example/Task;)Ljava/lang/String;".to_owned())),
	]);
	Ok(())
}

#[test]
fn lambda_call_site_without_bootstrap_method_fails() -> Result<()> {
	let mut class = ClassFile::new(52, 0x21, "c", None)?;
	let name_and_type = class.pool.put_name_and_type("a", "()Lb;")?;
	class.pool.put(PoolEntry::InvokeDynamic { bootstrap_method_attr_index: 0, name_and_type_index: name_and_type })?;

	assert!(remap_class(&class.to_bytes()?, &table(), &RemapOptions::default()).is_err());
	Ok(())
}

/// The class `d` with a method whose local variable tables name the slots `this`, a snowman, `if` and `valid`.
fn class_with_locals() -> Result<Vec<u8>> {
	let mut class = ClassFile::new(52, 0x21, "d", None)?;

	let mut table = vec![0, 4];
	let mut type_table = vec![0, 4];
	for (slot, name) in ["this", "\u{2603}", "if", "valid"].into_iter().enumerate() {
		let name = class.pool.put_utf8(name)?.to_be_bytes();
		let desc = class.pool.put_utf8("La;")?.to_be_bytes();
		let signature = class.pool.put_utf8("Ljava/util/List<La;>;")?.to_be_bytes();
		let slot = (slot as u16).to_be_bytes();
		table.extend([&[0, 0, 0, 1][..], &name, &desc, &slot].concat());
		type_table.extend([&[0, 0, 0, 1][..], &name, &signature, &slot].concat());
	}

	let code = Code {
		max_stack: 0,
		max_locals: 4,
		code: vec![0xb1], // return
		exception_table: Vec::new(),
		attributes: vec![
			Attribute::new(&mut class.pool, "LocalVariableTable", table)?,
			Attribute::new(&mut class.pool, "LocalVariableTypeTable", type_table)?,
		],
	};
	let code = Attribute::new(&mut class.pool, "Code", code.to_bytes()?)?;
	class.add_method(0x1, "m", "(La;La;La;)V")?.attributes.push(code);

	class.to_bytes()
}

fn local_names(bytes: &[u8]) -> Result<Vec<(String, String)>> {
	let class = ClassFile::read(bytes)?;
	let code = class.find_attribute(&class.methods[0].attributes, "Code")?.context("no code")?;
	let code = Code::read(&code.info)?;

	let mut names = Vec::new();
	for attribute in ["LocalVariableTable", "LocalVariableTypeTable"] {
		let info = &class.find_attribute(&code.attributes, attribute)?.context("no local variable table")?.info;
		for entry in info[2..].chunks(10) {
			names.push((
				utf8_of(&class, u16::from_be_bytes([entry[4], entry[5]]))?,
				utf8_of(&class, u16::from_be_bytes([entry[6], entry[7]]))?,
			));
		}
	}
	Ok(names)
}

#[test]
fn invalid_local_names_are_renamed() -> Result<()> {
	let options = RemapOptions { rename_invalid_locals: true, ..RemapOptions::default() };
	let names = local_names(&remap_class(&class_with_locals()?, &table(), &options)?.bytes)?;

	let desc = "Lcom/example/A;";
	let signature = "Ljava/util/List<Lcom/example/A;>;";
	let expected: Vec<_> = [(0, desc), (1, desc), (2, desc), (3, desc), (0, signature), (1, signature), (2, signature), (3, signature)]
		.into_iter()
		.map(|(slot, desc)| (["this", "lv1", "lv2", "valid"][slot].to_owned(), desc.to_owned()))
		.collect();
	assert_eq!(names, expected);
	Ok(())
}

#[test]
fn invalid_local_names_are_kept_by_default() -> Result<()> {
	let names = local_names(&remap_class(&class_with_locals()?, &table(), &RemapOptions::default())?.bytes)?;

	let names: Vec<_> = names.into_iter().map(|(name, _)| name).take(4).collect();
	assert_eq!(names, ["this", "\u{2603}", "if", "valid"]);
	Ok(())
}
