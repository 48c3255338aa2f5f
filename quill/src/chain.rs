use anyhow::{anyhow, bail, Context, Result};
use crate::table::MappingTable;
use crate::tree::Mappings;

/// A linear chain of namespaces `n0 -> n1 -> ... -> nk`, with one [`MappingTable`] for each adjacent pair.
///
/// Remapping between namespaces that aren't adjacent always goes through the chain, see
/// [`NamespaceChain::resolve`].
#[derive(Debug, Clone)]
pub struct NamespaceChain {
	namespaces: Vec<String>,
	/// `hops[i]` maps `namespaces[i]` to `namespaces[i + 1]`.
	hops: Vec<MappingTable>,
}

impl NamespaceChain {
	/// Builds the chain over the given namespaces of the mapping tree. The tree may have more namespaces than that.
	pub fn new(mappings: &Mappings, namespaces: &[&str]) -> Result<NamespaceChain> {
		mappings.check_namespaces(namespaces)?;

		let hops = namespaces.windows(2)
			.map(|pair| MappingTable::from_mappings(mappings, pair[0], pair[1])
				.with_context(|| anyhow!("failed to build mappings {} -> {}", pair[0], pair[1])))
			.collect::<Result<Vec<_>>>()?;

		NamespaceChain::from_hops(hops)
	}

	/// Builds the chain from tables for each hop, where each table must start at the namespace the one before ends.
	pub fn from_hops(hops: Vec<MappingTable>) -> Result<NamespaceChain> {
		let Some(first) = hops.first() else {
			bail!("a namespace chain needs at least one hop");
		};

		let mut namespaces = vec![first.from().to_owned()];
		for hop in &hops {
			let last = namespaces.last().map(String::as_str);
			if last != Some(hop.from()) {
				bail!("mappings {} -> {} don't continue the chain {namespaces:?}", hop.from(), hop.to());
			}
			if namespaces.iter().any(|x| x == hop.to()) {
				bail!("namespace {:?} appears twice in the chain", hop.to());
			}
			namespaces.push(hop.to().to_owned());
		}

		Ok(NamespaceChain { namespaces, hops })
	}

	pub fn namespaces(&self) -> &[String] {
		&self.namespaces
	}

	pub fn first(&self) -> &str {
		&self.namespaces[0]
	}

	pub fn last(&self) -> &str {
		&self.namespaces[self.namespaces.len() - 1]
	}

	/// The namespace before the last one, if the chain has at least three namespaces.
	pub fn penultimate(&self) -> Option<&str> {
		let len = self.namespaces.len();
		if len >= 3 {
			Some(&self.namespaces[len - 2])
		} else {
			None
		}
	}

	fn position(&self, namespace: &str) -> Result<usize> {
		self.namespaces.iter()
			.position(|x| x == namespace)
			.ok_or_else(|| anyhow!("namespace {namespace:?} isn't part of the chain {:?}", self.namespaces))
	}

	/// Gives the table for remapping from `from` to `to`.
	///
	/// Forwards, the hops in between are composed in order. Backwards, the inverted hops are composed. For `from`
	/// equal to `to` this is an empty table.
	pub fn resolve(&self, from: &str, to: &str) -> Result<MappingTable> {
		let start = self.position(from)?;
		let end = self.position(to)?;

		let mut tables: Vec<MappingTable> = if start <= end {
			self.hops[start..end].to_vec()
		} else {
			self.hops[end..start].iter()
				.rev()
				.map(MappingTable::invert)
				.collect::<Result<_>>()?
		};

		if tables.is_empty() {
			return Ok(MappingTable::new(from, to));
		}

		let mut table = tables.remove(0);
		for next in &tables {
			table = table.compose(next)
				.with_context(|| anyhow!("failed to resolve mappings {from} -> {to}"))?;
		}
		Ok(table)
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::chain::NamespaceChain;

	const MAPPINGS: &str = "tiny\t2\t0\tofficial\tintermediary\tsrg\tnamed
c\ta\tclass_1\tC_1\tcom/example/A
\tf\tLa;\tb\tfield_2\tf_2\tvalue
\tm\t()La;\tc\tmethod_3\t\trun
c\td\tclass_4\t\t
";

	#[test]
	fn resolve() -> Result<()> {
		let mappings = crate::tiny_v2::read(MAPPINGS.as_bytes())?;
		let chain = NamespaceChain::new(&mappings, &["official", "intermediary", "srg", "named"])?;
		assert_eq!(chain.penultimate(), Some("srg"));

		let table = chain.resolve("official", "named")?;
		assert_eq!(table.get_class("a"), Some("com/example/A"));
		assert_eq!(table.get_class("d"), Some("class_4"));
		assert_eq!(table.get_field("a", "b", "La;"), Some("value"));
		assert_eq!(table.get_method("a", "c", "()La;"), Some("run"));

		let table = chain.resolve("srg", "intermediary")?;
		assert_eq!(table.get_class("C_1"), Some("class_1"));
		assert_eq!(table.get_field("C_1", "f_2", "LC_1;"), Some("field_2"));

		let table = chain.resolve("named", "official")?;
		assert_eq!(table.get_method("com/example/A", "run", "()Lcom/example/A;"), Some("c"));

		assert!(chain.resolve("official", "official")?.is_empty());
		assert!(chain.resolve("official", "mojang").is_err());
		Ok(())
	}

	#[test]
	fn chain_must_be_connected() -> Result<()> {
		use crate::table::MappingTable;
		let hops = vec![MappingTable::new("a", "b"), MappingTable::new("c", "d")];
		assert!(NamespaceChain::from_hops(hops).is_err());
		assert!(NamespaceChain::from_hops(Vec::new()).is_err());
		Ok(())
	}
}
