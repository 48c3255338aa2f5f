//! Crate for reading mapping files and turning them into tables that can remap class files.
//!
//! Mappings are read from Tiny v2 (`.tiny`) files, see [`tiny_v2`]. A [`tree::Mappings`] holds the names of each
//! class, field and method in every namespace. From that, [`chain::NamespaceChain`] builds one
//! [`table::MappingTable`] for each pair of adjacent namespaces, and resolves the table between any two of them.
//!
//! The crate also reads access widener files ([`access_widener`]) and compiles them into access transformers
//! ([`access_transform`]).

mod lines;

pub mod tree;
pub mod tiny_v2;

pub mod table;
pub mod chain;
pub mod remapper;

pub mod access_widener;
pub mod access_transform;
