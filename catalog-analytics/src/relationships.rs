// ---------------------------------------------------------------------------
// Related Items: pipeline and full-replace writer
// ---------------------------------------------------------------------------
//
// The weekly relationship job:
//
// 1. list catalog items of every kind
// 2. list user/item activity
// 3. build signal indices and mine co-occurrence
// 4. aggregate candidates per item (failed items are logged and skipped)
// 5. replace the persisted edge set wholesale
//
// Between the sink's delete and insert, readers see an empty edge set rather
// than a stale/fresh mix. A crash mid-run leaves edges missing until the next
// successful run; rows outside the edge set are never touched.
// ---------------------------------------------------------------------------

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::candidates::{CandidateAggregator, DEFAULT_MAX_RELATED};
use crate::cooccurrence::{CoOccurrenceIndex, DEFAULT_LARGE_COLLECTION_WARN};
use crate::error::AnalyticsError;
use crate::scheduler::{Job, duration_ms};
use crate::signal_index::SignalIndex;
use crate::sources::{RelationshipSink, Store};
use crate::types::{
	ActivityRecord, CatalogItem, ItemKey, ItemKind, JobReport, RelatedItemEdge,
	RelationshipRunSummary,
};

pub const RELATED_ITEMS_JOB: &str = "related-items";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct RelationshipOptions {
	pub max_related: usize,
	pub large_collection_warn: usize,
}

impl Default for RelationshipOptions {
	fn default() -> Self {
		Self {
			max_related: DEFAULT_MAX_RELATED,
			large_collection_warn: DEFAULT_LARGE_COLLECTION_WARN,
		}
	}
}

// ---------------------------------------------------------------------------
// Computation
// ---------------------------------------------------------------------------

/// Compute the full edge set for a catalog/activity snapshot.
///
/// Items whose candidates cannot be computed are counted in
/// `items_failed` and contribute no edges. `edges_written` is left at 0 for
/// the writer to fill in.
pub fn compute_related_edges(
	catalog: &[CatalogItem],
	activity: &[ActivityRecord],
	options: &RelationshipOptions,
) -> (Vec<RelatedItemEdge>, RelationshipRunSummary) {
	let signals = SignalIndex::build(catalog);
	let cooccurrence =
		CoOccurrenceIndex::mine_with_threshold(activity, options.large_collection_warn);
	let aggregator =
		CandidateAggregator::new(&signals, &cooccurrence).with_max_related(options.max_related);

	tracing::debug!(
		items = signals.item_count(),
		authors = signals.author_count(),
		publishers = signals.publisher_count(),
		categories = signals.category_count(),
		co_pairs = cooccurrence.pair_count(),
		"Signal indices built"
	);

	let mut summary = RelationshipRunSummary::default();
	let mut edges = Vec::new();

	for item in catalog {
		match aggregator.edges_for(item) {
			Ok(item_edges) => {
				summary.items_processed += 1;
				edges.extend(item_edges);
			}
			Err(e) => {
				summary.items_failed += 1;
				tracing::warn!(
					item = %item.key(),
					code = e.code(),
					"Skipping item in related-items run: {}",
					e
				);
			}
		}
	}

	(edges, summary)
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Validates and persists the complete edge set in one replace.
pub struct RelationshipWriter {
	sink: Arc<dyn RelationshipSink>,
	max_related: usize,
}

impl RelationshipWriter {
	pub fn new(sink: Arc<dyn RelationshipSink>, max_related: usize) -> Self {
		Self { sink, max_related }
	}

	/// Fail if any source carries more than `max` edges.
	pub fn check_cap(edges: &[RelatedItemEdge], max: usize) -> Result<(), AnalyticsError> {
		let mut per_source: HashMap<ItemKey, usize> = HashMap::new();
		for edge in edges {
			let count = per_source.entry(edge.source_key()).or_insert(0);
			*count += 1;
			if *count > max {
				return Err(AnalyticsError::CapExceeded {
					source_key: edge.source_key().to_string(),
					count: edges
						.iter()
						.filter(|e| e.source_kind == edge.source_kind && e.source_id == edge.source_id)
						.count(),
					max,
				});
			}
		}
		Ok(())
	}

	/// Source key ascending, score descending, related key ascending.
	pub fn order(edges: &mut [RelatedItemEdge]) {
		edges.sort_by(|a, b| {
			a.source_key()
				.cmp(&b.source_key())
				.then_with(|| {
					b.similarity_score
						.partial_cmp(&a.similarity_score)
						.unwrap_or(Ordering::Equal)
				})
				.then_with(|| a.related_key().cmp(&b.related_key()))
		});
	}

	/// Replace the persisted edge set. Nothing is deleted when validation fails.
	pub async fn write(&self, mut edges: Vec<RelatedItemEdge>) -> Result<usize, AnalyticsError> {
		Self::check_cap(&edges, self.max_related)?;
		Self::order(&mut edges);
		let count = edges.len();
		self.sink.replace_all(edges).await?;
		Ok(count)
	}
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

pub struct RelatedItemsJob {
	store: Store,
	options: RelationshipOptions,
}

impl RelatedItemsJob {
	pub fn new(store: Store, options: RelationshipOptions) -> Self {
		Self { store, options }
	}
}

#[async_trait]
impl Job for RelatedItemsJob {
	async fn run(&self) -> Result<JobReport, AnalyticsError> {
		let start = Instant::now();

		let mut catalog = Vec::new();
		for kind in ItemKind::ALL {
			let items = self.store.catalog.list_items(kind).await?;
			tracing::debug!(kind = %kind, items = items.len(), "Catalog listed");
			catalog.extend(items);
		}
		let activity = self.store.activity.list_user_item_pairs().await?;

		tracing::info!(
			items = catalog.len(),
			activity = activity.len(),
			"Computing related items"
		);

		let (edges, mut summary) = compute_related_edges(&catalog, &activity, &self.options);

		let writer =
			RelationshipWriter::new(self.store.relationships.clone(), self.options.max_related);
		summary.edges_written = writer.write(edges).await?;

		tracing::info!(
			items_processed = summary.items_processed,
			items_failed = summary.items_failed,
			edges_written = summary.edges_written,
			elapsed_ms = duration_ms(start.elapsed()),
			"Related items replaced"
		);

		Ok(JobReport::Relationships(summary))
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
