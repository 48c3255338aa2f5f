use duke::RemapOptions;
use dukebox::NonClassCopyMode;
use quill::table::MappingTable;
use crate::config::Toolchain;

/// The `javax.annotation` annotations, and their replacements.
const JSR_TO_JETBRAINS: [(&str, &str); 3] = [
	("javax/annotation/Nullable", "org/jetbrains/annotations/Nullable"),
	("javax/annotation/Nonnull", "org/jetbrains/annotations/NotNull"),
	("javax/annotation/concurrent/Immutable", "org/jetbrains/annotations/Unmodifiable"),
];

/// An extra step for hops whose target isn't the penultimate namespace of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fixup {
	/// Remaps names in data files mirroring class and member names, see [`crate::fixups::aux_files`].
	AuxiliaryFiles,
	/// Renames unmapped inner classes along with their owner, see [`crate::fixups::inner_classes`].
	InnerClasses,
}

/// Everything that differs between toolchains, selected once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantProfile {
	pub toolchain: Toolchain,
	/// The namespace chain, starting with the namespace of the input archives.
	pub namespaces: Vec<String>,
	pub fixups: Vec<Fixup>,
	/// Class renames added to every hop.
	pub secondary_classes: Vec<(String, String)>,
	pub copy_mode: NonClassCopyMode,
	/// Rename local variables that aren't valid java identifiers.
	pub rename_invalid_locals: bool,
	/// Make package private classes and members public if they're used from another package after remapping, see
	/// [`crate::fixups::package_access`].
	pub fix_package_access: bool,
}

impl VariantProfile {
	pub fn new(toolchain: Toolchain) -> VariantProfile {
		let namespaces = |names: &[&str]| names.iter().map(|&name| name.to_owned()).collect();
		match toolchain {
			Toolchain::Fabric => VariantProfile {
				toolchain,
				namespaces: namespaces(&["official", "intermediary", "named"]),
				fixups: Vec::new(),
				secondary_classes: JSR_TO_JETBRAINS.iter()
					.map(|&(from, to)| (from.to_owned(), to.to_owned()))
					.collect(),
				copy_mode: NonClassCopyMode::Unchanged,
				rename_invalid_locals: true,
				fix_package_access: false,
			},
			Toolchain::Forge => VariantProfile {
				toolchain,
				namespaces: namespaces(&["official", "intermediary", "srg", "named"]),
				fixups: vec![Fixup::AuxiliaryFiles, Fixup::InnerClasses],
				secondary_classes: Vec::new(),
				copy_mode: NonClassCopyMode::FixMetaInf,
				rename_invalid_locals: true,
				fix_package_access: true,
			},
		}
	}

	pub fn remap_options(&self) -> RemapOptions {
		RemapOptions {
			rename_invalid_locals: self.rename_invalid_locals,
			..RemapOptions::default()
		}
	}

	pub fn namespaces(&self) -> Vec<&str> {
		self.namespaces.iter().map(String::as_str).collect()
	}

	/// The fixups to run for a hop with the given target.
	pub fn fixups_for(&self, target: &str) -> &[Fixup] {
		let len = self.namespaces.len();
		let penultimate = (len >= 3).then(|| self.namespaces[len - 2].as_str());
		if penultimate == Some(target) {
			&[]
		} else {
			&self.fixups
		}
	}

	/// The table of secondary renames, for unioning with the table of a hop.
	pub fn secondary_table(&self, from: &str, to: &str) -> MappingTable {
		let mut table = MappingTable::new(from, to);
		for (class_from, class_to) in &self.secondary_classes {
			table.insert_class(class_from, class_to);
		}
		table
	}
}
