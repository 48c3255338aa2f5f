//! Extra steps for hops of toolchains that need them, see [`crate::variant::Fixup`].

pub mod aux_files;
pub mod inner_classes;
pub mod package_access;
