// ---------------------------------------------------------------------------
// Signal Index: author / publisher / category lookups over a catalog snapshot
// ---------------------------------------------------------------------------
//
// Three multi-maps built in one pass:
//
// 1. author       -> items   (exact, case-sensitive key)
// 2. publisher    -> items   (normalized name, spans both catalog kinds)
// 3. category id  -> items
//
// Publisher matching is by name because the two kinds carry no shared
// publisher identifier. Name matching is fragile to typos and legal-name
// variants; a shared publisher entity would remove the risk.
// ---------------------------------------------------------------------------

use std::collections::{HashMap, HashSet};

use crate::types::{CatalogItem, ItemKey};

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Trim, collapse whitespace runs, lowercase. Returns `None` for blank names.
pub fn normalize_publisher(name: &str) -> Option<String> {
	let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
	if collapsed.is_empty() {
		return None;
	}
	Some(collapsed.to_lowercase())
}

// ---------------------------------------------------------------------------
// SignalIndex
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SignalIndex {
	/// author -> items, catalog order
	by_author: HashMap<String, Vec<ItemKey>>,
	/// normalized publisher name -> items of either kind
	by_publisher: HashMap<String, Vec<ItemKey>>,
	/// category id -> items
	by_category: HashMap<String, Vec<ItemKey>>,
	/// every indexed item
	items: HashSet<ItemKey>,
}

fn push_posting(map: &mut HashMap<String, Vec<ItemKey>>, key: String, item: &ItemKey) {
	map.entry(key).or_default().push(item.clone());
}

impl SignalIndex {
	/// Build all three indices from a catalog snapshot in a single pass.
	pub fn build(catalog: &[CatalogItem]) -> Self {
		let mut index = Self::default();

		for item in catalog {
			// Blank ids cannot be sources, so they are never targets either.
			if item.id.trim().is_empty() {
				continue;
			}
			let key = item.key();
			if !index.items.insert(key.clone()) {
				continue;
			}

			if let Some(author) = item.author.as_deref() {
				if !author.trim().is_empty() {
					push_posting(&mut index.by_author, author.to_string(), &key);
				}
			}
			if let Some(normalized) = item.publisher_name.as_deref().and_then(normalize_publisher) {
				push_posting(&mut index.by_publisher, normalized, &key);
			}
			if let Some(category) = item.category_id.as_deref() {
				if !category.is_empty() {
					push_posting(&mut index.by_category, category.to_string(), &key);
				}
			}
		}

		index
	}

	pub fn items_by_author(&self, author: &str) -> &[ItemKey] {
		self.by_author.get(author).map(Vec::as_slice).unwrap_or(&[])
	}

	/// Lookup by raw publisher name; the name is normalized first.
	pub fn items_by_publisher(&self, publisher_name: &str) -> &[ItemKey] {
		match normalize_publisher(publisher_name) {
			Some(normalized) => self
				.by_publisher
				.get(&normalized)
				.map(Vec::as_slice)
				.unwrap_or(&[]),
			None => &[],
		}
	}

	pub fn items_by_category(&self, category_id: &str) -> &[ItemKey] {
		self.by_category.get(category_id).map(Vec::as_slice).unwrap_or(&[])
	}

	/// Whether `key` is a catalog item of this snapshot.
	pub fn contains(&self, key: &ItemKey) -> bool {
		self.items.contains(key)
	}

	pub fn item_count(&self) -> usize {
		self.items.len()
	}

	pub fn author_count(&self) -> usize {
		self.by_author.len()
	}

	pub fn publisher_count(&self) -> usize {
		self.by_publisher.len()
	}

	pub fn category_count(&self) -> usize {
		self.by_category.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
