// ---------------------------------------------------------------------------
// Store seams: the sources the engine reads and the sinks it writes
// ---------------------------------------------------------------------------
//
// Every external store is reached through one of these traits. The engine
// never assumes a storage format; `MemoryStore` and `FileStore` are the two
// implementations shipped with the crate.
// ---------------------------------------------------------------------------

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AnalyticsError;
use crate::types::{
	ActivityRecord, CatalogItem, ItemKind, ItemStats, RelatedItemEdge, ReviewAggregate,
};

// ---------------------------------------------------------------------------
// Consumed
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CatalogSource: Send + Sync {
	async fn list_items(&self, kind: ItemKind) -> Result<Vec<CatalogItem>, AnalyticsError>;
}

#[async_trait]
pub trait ActivitySource: Send + Sync {
	async fn list_user_item_pairs(&self) -> Result<Vec<ActivityRecord>, AnalyticsError>;
}

#[async_trait]
pub trait ReviewSource: Send + Sync {
	async fn aggregate_for(
		&self,
		kind: ItemKind,
		id: &str,
	) -> Result<ReviewAggregate, AnalyticsError>;
}

#[async_trait]
pub trait SessionSource: Send + Sync {
	/// Total reading/listening time in seconds.
	async fn total_duration_for(&self, kind: ItemKind, id: &str) -> Result<u64, AnalyticsError>;
}

#[async_trait]
pub trait HighlightSource: Send + Sync {
	async fn count_for(&self, kind: ItemKind, id: &str) -> Result<u64, AnalyticsError>;
}

// ---------------------------------------------------------------------------
// Produced
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RelationshipSink: Send + Sync {
	/// Replace the entire persisted edge set with `edges`.
	async fn replace_all(&self, edges: Vec<RelatedItemEdge>) -> Result<(), AnalyticsError>;
}

#[async_trait]
pub trait StatsSink: Send + Sync {
	/// Insert or update the row keyed by `(kind, item_id)`.
	async fn upsert(&self, stats: ItemStats) -> Result<(), AnalyticsError>;

	/// Called once after a stats batch. Buffered sinks persist here.
	async fn flush(&self) -> Result<(), AnalyticsError> {
		Ok(())
	}
}

// ---------------------------------------------------------------------------
// Store bundle
// ---------------------------------------------------------------------------

/// All seven seams, usually backed by one implementation.
#[derive(Clone)]
pub struct Store {
	pub catalog: Arc<dyn CatalogSource>,
	pub activity: Arc<dyn ActivitySource>,
	pub reviews: Arc<dyn ReviewSource>,
	pub sessions: Arc<dyn SessionSource>,
	pub highlights: Arc<dyn HighlightSource>,
	pub relationships: Arc<dyn RelationshipSink>,
	pub stats: Arc<dyn StatsSink>,
}

impl Store {
	/// Build a bundle where every seam is served by the same backend.
	pub fn from_backend<B>(backend: Arc<B>) -> Self
	where
		B: CatalogSource
			+ ActivitySource
			+ ReviewSource
			+ SessionSource
			+ HighlightSource
			+ RelationshipSink
			+ StatsSink
			+ 'static,
	{
		Self {
			catalog: backend.clone(),
			activity: backend.clone(),
			reviews: backend.clone(),
			sessions: backend.clone(),
			highlights: backend.clone(),
			relationships: backend.clone(),
			stats: backend,
		}
	}
}
