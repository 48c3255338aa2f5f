//! Crate for reading and writing archives of class files.
//!
//! An [`ArchiveLoader`] reads the class entries of an archive into an [`ArchiveImage`], in parallel. The
//! [`ArchiveWriter`] writes (remapped) class entries back out, copying the other entries from the source archive.
//! A [`ClasspathIndex`] knows the super classes of all library classes.

pub mod loader;
pub mod classpath;
pub mod writer;

pub use loader::{ArchiveImage, ArchiveLoader, ClassEntry};
pub use classpath::ClasspathIndex;
pub use writer::{ArchiveWriter, NonClassCopyMode, ResourceRewriter};
