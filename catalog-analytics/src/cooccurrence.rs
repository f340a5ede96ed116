// ---------------------------------------------------------------------------
// Co-occurrence Miner: pairwise counts of items held by the same user
// ---------------------------------------------------------------------------
//
// Activity rows are grouped by user; every unordered pair of distinct items
// in one user's collection increments a counter recorded in both directions.
//
// Cost is O(U · m²) in the per-user collection size m. That is accepted for
// collections of hundreds of items. Larger collections are still processed
// but logged, since the pair count grows quadratically and the weight is
// not dampened.
// ---------------------------------------------------------------------------

use std::collections::{BTreeSet, HashMap};

use crate::types::{ActivityRecord, ItemKey};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Collections above this many distinct items are logged when mined.
pub const DEFAULT_LARGE_COLLECTION_WARN: usize = 1000;

// ---------------------------------------------------------------------------
// CoOccurrenceIndex
// ---------------------------------------------------------------------------

/// Symmetric co-occurrence counts.
///
/// `pairs` maps item -> { partner -> number of distinct users holding both }.
#[derive(Debug, Default)]
pub struct CoOccurrenceIndex {
	pairs: HashMap<ItemKey, HashMap<ItemKey, u64>>,
	users_mined: usize,
	users_skipped: usize,
}

impl CoOccurrenceIndex {
	/// Mine co-occurrence counts with the default large-collection threshold.
	pub fn mine(records: &[ActivityRecord]) -> Self {
		Self::mine_with_threshold(records, DEFAULT_LARGE_COLLECTION_WARN)
	}

	pub fn mine_with_threshold(records: &[ActivityRecord], large_collection_warn: usize) -> Self {
		// user -> distinct items, sorted so pairing is input-order independent
		let mut by_user: HashMap<&str, BTreeSet<ItemKey>> = HashMap::new();
		for record in records {
			by_user
				.entry(record.user_id.as_str())
				.or_default()
				.insert(record.key());
		}

		let mut index = Self::default();

		for (user_id, items) in &by_user {
			if items.len() < 2 {
				index.users_skipped += 1;
				continue;
			}
			if items.len() > large_collection_warn {
				tracing::warn!(
					user = %user_id,
					items = items.len(),
					pairs = items.len() * (items.len() - 1) / 2,
					"Large collection in co-occurrence mining"
				);
			}

			let items: Vec<&ItemKey> = items.iter().collect();
			for i in 0..items.len() {
				for j in (i + 1)..items.len() {
					let a = items[i];
					let b = items[j];

					*index
						.pairs
						.entry(a.clone())
						.or_default()
						.entry(b.clone())
						.or_insert(0) += 1;

					*index
						.pairs
						.entry(b.clone())
						.or_default()
						.entry(a.clone())
						.or_insert(0) += 1;
				}
			}
			index.users_mined += 1;
		}

		tracing::debug!(
			users_mined = index.users_mined,
			users_skipped = index.users_skipped,
			pairs = index.pair_count(),
			"Co-occurrence mining complete"
		);

		index
	}

	/// Number of distinct users holding both `a` and `b`.
	pub fn count(&self, a: &ItemKey, b: &ItemKey) -> u64 {
		self.pairs
			.get(a)
			.and_then(|partners| partners.get(b))
			.copied()
			.unwrap_or(0)
	}

	/// Partners of `item`, sorted by count descending then key ascending.
	pub fn partners(&self, item: &ItemKey) -> Vec<(ItemKey, u64)> {
		let map = match self.pairs.get(item) {
			Some(m) => m,
			None => return vec![],
		};

		let mut results: Vec<(ItemKey, u64)> =
			map.iter().map(|(key, &count)| (key.clone(), count)).collect();
		results.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
		results
	}

	/// Raw partner map for `item`, unsorted.
	pub fn partner_map(&self, item: &ItemKey) -> Option<&HashMap<ItemKey, u64>> {
		self.pairs.get(item)
	}

	/// Distinct unordered pairs with a non-zero count.
	pub fn pair_count(&self) -> usize {
		self.pairs.values().map(HashMap::len).sum::<usize>() / 2
	}

	pub fn users_mined(&self) -> usize {
		self.users_mined
	}

	pub fn users_skipped(&self) -> usize {
		self.users_skipped
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
