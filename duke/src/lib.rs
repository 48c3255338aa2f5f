//! Reading, writing and remapping java class files.
//!
//! The class file is kept close to its binary form: everything refers to the [`pool::ConstantPool`] by index, and
//! attributes are only parsed when they need to be rewritten. This is enough for [`remap::remap_class`], which
//! renames classes, fields and methods according to a [`remapper::MemberRemapper`].

pub mod class_file;
pub(crate) mod io;
pub(crate) mod jstring;
pub mod pool;
pub mod remap;
pub mod remapper;

pub use class_file::ClassFile;
pub use remap::{remap_class, RemapOptions, RemappedClass};
