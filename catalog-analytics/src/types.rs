// ---------------------------------------------------------------------------
// Shared types: catalog rows, store records, job outputs
// ---------------------------------------------------------------------------

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Catalog identity
// ---------------------------------------------------------------------------

/// The two disjoint catalog kinds. Ordering (`Book < Audiobook`) is part of
/// the deterministic tie-break for equal-score candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
	Book,
	Audiobook,
}

impl ItemKind {
	pub const ALL: [ItemKind; 2] = [ItemKind::Book, ItemKind::Audiobook];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Book => "book",
			Self::Audiobook => "audiobook",
		}
	}
}

impl fmt::Display for ItemKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// `(kind, id)`, the identity of a catalog item in every index and store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
	pub kind: ItemKind,
	pub id: String,
}

impl ItemKey {
	pub fn new(kind: ItemKind, id: impl Into<String>) -> Self {
		Self {
			kind,
			id: id.into(),
		}
	}
}

impl fmt::Display for ItemKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.kind, self.id)
	}
}

// ---------------------------------------------------------------------------
// Inputs (externally owned)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
	pub kind: ItemKind,
	pub id: String,
	#[serde(default)]
	pub author: Option<String>,
	#[serde(rename = "publisherName", default)]
	pub publisher_name: Option<String>,
	#[serde(rename = "categoryId", default)]
	pub category_id: Option<String>,
}

impl CatalogItem {
	pub fn key(&self) -> ItemKey {
		ItemKey::new(self.kind, self.id.clone())
	}
}

/// One item held in one user's personal collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
	#[serde(rename = "userId")]
	pub user_id: String,
	pub kind: ItemKind,
	#[serde(rename = "itemId")]
	pub item_id: String,
}

impl ActivityRecord {
	pub fn key(&self) -> ItemKey {
		ItemKey::new(self.kind, self.item_id.clone())
	}
}

/// Raw store rows behind the review, session and highlight sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
	pub kind: ItemKind,
	#[serde(rename = "itemId")]
	pub item_id: String,
	pub rating: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
	pub kind: ItemKind,
	#[serde(rename = "itemId")]
	pub item_id: String,
	#[serde(rename = "durationSeconds")]
	pub duration_seconds: u64,
}

/// A highlight on a book or a bookmark on an audiobook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightRecord {
	pub kind: ItemKind,
	#[serde(rename = "itemId")]
	pub item_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReviewAggregate {
	pub count: u64,
	#[serde(rename = "averageRating")]
	pub average_rating: Option<f64>,
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

/// The signal a related-item edge was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
	SameAuthor,
	SamePublisher,
	SameCategory,
	CoOccurrence,
}

impl RelationKind {
	/// Static per-signal weight. Co-occurrence is multiplied by the pair count
	/// when scoring, but tag priority always compares these static values.
	pub fn base_weight(&self) -> u64 {
		match self {
			Self::SameAuthor => 100,
			Self::SamePublisher => 50,
			Self::SameCategory => 30,
			Self::CoOccurrence => 20,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::SameAuthor => "same_author",
			Self::SamePublisher => "same_publisher",
			Self::SameCategory => "same_category",
			Self::CoOccurrence => "co_occurrence",
		}
	}
}

impl fmt::Display for RelationKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A merged, scored candidate for one source item. Lives only inside a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationCandidate {
	pub key: ItemKey,
	pub relation: RelationKind,
	pub score: u64,
}

/// A persisted, directed, scored relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedItemEdge {
	#[serde(rename = "sourceKind")]
	pub source_kind: ItemKind,
	#[serde(rename = "sourceId")]
	pub source_id: String,
	#[serde(rename = "relatedKind")]
	pub related_kind: ItemKind,
	#[serde(rename = "relatedId")]
	pub related_id: String,
	#[serde(rename = "relationKind")]
	pub relation: RelationKind,
	#[serde(rename = "similarityScore")]
	pub similarity_score: f64,
}

impl RelatedItemEdge {
	pub fn source_key(&self) -> ItemKey {
		ItemKey::new(self.source_kind, self.source_id.clone())
	}

	pub fn related_key(&self) -> ItemKey {
		ItemKey::new(self.related_kind, self.related_id.clone())
	}
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStats {
	pub kind: ItemKind,
	#[serde(rename = "itemId")]
	pub item_id: String,
	#[serde(rename = "totalReaders")]
	pub total_readers: u64,
	#[serde(rename = "averageRating")]
	pub average_rating: Option<f64>,
	#[serde(rename = "totalReviews")]
	pub total_reviews: u64,
	#[serde(rename = "totalReadingSeconds")]
	pub total_reading_seconds: u64,
	#[serde(rename = "totalHighlights")]
	pub total_highlights: u64,
	#[serde(rename = "updatedAt")]
	pub updated_at: DateTime<Utc>,
}

impl ItemStats {
	pub fn key(&self) -> ItemKey {
		ItemKey::new(self.kind, self.item_id.clone())
	}
}

// ---------------------------------------------------------------------------
// Run summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelationshipRunSummary {
	#[serde(rename = "itemsProcessed")]
	pub items_processed: usize,
	#[serde(rename = "itemsFailed")]
	pub items_failed: usize,
	#[serde(rename = "edgesWritten")]
	pub edges_written: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsRunSummary {
	#[serde(rename = "itemsProcessed")]
	pub items_processed: usize,
	#[serde(rename = "rowsWritten")]
	pub rows_written: usize,
	#[serde(rename = "rowsSkipped")]
	pub rows_skipped: usize,
	#[serde(rename = "itemsFailed")]
	pub items_failed: usize,
}

/// What a job hands back to the scheduler on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobReport {
	Relationships(RelationshipRunSummary),
	Stats(StatsRunSummary),
	Empty,
}
