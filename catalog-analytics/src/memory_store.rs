// ---------------------------------------------------------------------------
// In-memory store: every source and sink over plain collections
// ---------------------------------------------------------------------------
//
// Backs the file store and the test suite. Failure switches let tests
// simulate store outages and single-item query errors.
// ---------------------------------------------------------------------------

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::AnalyticsError;
use crate::sources::{
	ActivitySource, CatalogSource, HighlightSource, RelationshipSink, ReviewSource,
	SessionSource, StatsSink,
};
use crate::types::{
	ActivityRecord, CatalogItem, HighlightRecord, ItemKey, ItemKind, ItemStats,
	RelatedItemEdge, ReviewAggregate, ReviewRecord, SessionRecord,
};

#[derive(Default)]
struct Inner {
	catalog: Vec<CatalogItem>,
	activity: Vec<ActivityRecord>,
	/// item -> individual ratings
	ratings: HashMap<ItemKey, Vec<f64>>,
	/// item -> summed session seconds
	session_seconds: HashMap<ItemKey, u64>,
	/// item -> highlight (book) or bookmark (audiobook) count
	highlights: HashMap<ItemKey, u64>,
	edges: Vec<RelatedItemEdge>,
	stats: BTreeMap<ItemKey, ItemStats>,
	replace_calls: usize,
	flush_calls: usize,
	// failure switches
	fail_catalog: bool,
	fail_activity: bool,
	fail_replace: bool,
	failing_reviews: HashSet<ItemKey>,
	failing_upserts: HashSet<ItemKey>,
}

#[derive(Default)]
pub struct MemoryStore {
	inner: RwLock<Inner>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn read(&self) -> RwLockReadGuard<'_, Inner> {
		self.inner.read().unwrap_or_else(|e| e.into_inner())
	}

	fn write(&self) -> RwLockWriteGuard<'_, Inner> {
		self.inner.write().unwrap_or_else(|e| e.into_inner())
	}

	// -- Seeding ----------------------------------------------------------

	pub fn set_catalog(&self, catalog: Vec<CatalogItem>) {
		self.write().catalog = catalog;
	}

	pub fn set_activity(&self, activity: Vec<ActivityRecord>) {
		self.write().activity = activity;
	}

	pub fn add_review(&self, review: &ReviewRecord) {
		self.write()
			.ratings
			.entry(ItemKey::new(review.kind, review.item_id.clone()))
			.or_default()
			.push(review.rating);
	}

	pub fn add_session(&self, session: &SessionRecord) {
		let mut inner = self.write();
		let total = inner
			.session_seconds
			.entry(ItemKey::new(session.kind, session.item_id.clone()))
			.or_insert(0);
		*total = total.saturating_add(session.duration_seconds);
	}

	pub fn add_highlight(&self, highlight: &HighlightRecord) {
		*self
			.write()
			.highlights
			.entry(ItemKey::new(highlight.kind, highlight.item_id.clone()))
			.or_insert(0) += 1;
	}

	pub fn set_edges(&self, edges: Vec<RelatedItemEdge>) {
		self.write().edges = edges;
	}

	pub fn set_stats(&self, stats: Vec<ItemStats>) {
		self.write().stats = stats.into_iter().map(|s| (s.key(), s)).collect();
	}

	// -- Failure switches -------------------------------------------------

	pub fn fail_catalog(&self, fail: bool) {
		self.write().fail_catalog = fail;
	}

	pub fn fail_activity(&self, fail: bool) {
		self.write().fail_activity = fail;
	}

	pub fn fail_replace(&self, fail: bool) {
		self.write().fail_replace = fail;
	}

	/// Make `aggregate_for` error for one item only.
	pub fn fail_reviews_for(&self, key: ItemKey) {
		self.write().failing_reviews.insert(key);
	}

	pub fn fail_upsert_for(&self, key: ItemKey) {
		self.write().failing_upserts.insert(key);
	}

	// -- Inspection -------------------------------------------------------

	pub fn edges(&self) -> Vec<RelatedItemEdge> {
		self.read().edges.clone()
	}

	/// Stats rows ordered by key.
	pub fn stats(&self) -> Vec<ItemStats> {
		self.read().stats.values().cloned().collect()
	}

	pub fn stats_for(&self, key: &ItemKey) -> Option<ItemStats> {
		self.read().stats.get(key).cloned()
	}

	pub fn replace_calls(&self) -> usize {
		self.read().replace_calls
	}

	pub fn flush_calls(&self) -> usize {
		self.read().flush_calls
	}
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[async_trait]
impl CatalogSource for MemoryStore {
	async fn list_items(&self, kind: ItemKind) -> Result<Vec<CatalogItem>, AnalyticsError> {
		let inner = self.read();
		if inner.fail_catalog {
			return Err(AnalyticsError::Source("catalog unavailable".into()));
		}
		Ok(inner
			.catalog
			.iter()
			.filter(|item| item.kind == kind)
			.cloned()
			.collect())
	}
}

#[async_trait]
impl ActivitySource for MemoryStore {
	async fn list_user_item_pairs(&self) -> Result<Vec<ActivityRecord>, AnalyticsError> {
		let inner = self.read();
		if inner.fail_activity {
			return Err(AnalyticsError::Source("activity unavailable".into()));
		}
		Ok(inner.activity.clone())
	}
}

#[async_trait]
impl ReviewSource for MemoryStore {
	async fn aggregate_for(
		&self,
		kind: ItemKind,
		id: &str,
	) -> Result<ReviewAggregate, AnalyticsError> {
		let inner = self.read();
		let key = ItemKey::new(kind, id);
		if inner.failing_reviews.contains(&key) {
			return Err(AnalyticsError::Source(format!("review query failed for {key}")));
		}
		let aggregate = match inner.ratings.get(&key) {
			Some(ratings) if !ratings.is_empty() => ReviewAggregate {
				count: ratings.len() as u64,
				average_rating: Some(ratings.iter().sum::<f64>() / ratings.len() as f64),
			},
			_ => ReviewAggregate::default(),
		};
		Ok(aggregate)
	}
}

#[async_trait]
impl SessionSource for MemoryStore {
	async fn total_duration_for(&self, kind: ItemKind, id: &str) -> Result<u64, AnalyticsError> {
		Ok(self
			.read()
			.session_seconds
			.get(&ItemKey::new(kind, id))
			.copied()
			.unwrap_or(0))
	}
}

#[async_trait]
impl HighlightSource for MemoryStore {
	async fn count_for(&self, kind: ItemKind, id: &str) -> Result<u64, AnalyticsError> {
		Ok(self
			.read()
			.highlights
			.get(&ItemKey::new(kind, id))
			.copied()
			.unwrap_or(0))
	}
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

#[async_trait]
impl RelationshipSink for MemoryStore {
	async fn replace_all(&self, edges: Vec<RelatedItemEdge>) -> Result<(), AnalyticsError> {
		let mut inner = self.write();
		if inner.fail_replace {
			return Err(AnalyticsError::Sink("relationship store unavailable".into()));
		}
		inner.replace_calls += 1;
		inner.edges.clear();
		inner.edges.extend(edges);
		Ok(())
	}
}

#[async_trait]
impl StatsSink for MemoryStore {
	async fn upsert(&self, stats: ItemStats) -> Result<(), AnalyticsError> {
		let key = stats.key();
		let mut inner = self.write();
		if inner.failing_upserts.contains(&key) {
			return Err(AnalyticsError::Sink(format!("stats upsert failed for {key}")));
		}
		inner.stats.insert(key, stats);
		Ok(())
	}

	async fn flush(&self) -> Result<(), AnalyticsError> {
		self.write().flush_calls += 1;
		Ok(())
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
