// ---------------------------------------------------------------------------
// Stats Aggregator: per-item usage summaries
// ---------------------------------------------------------------------------
//
// For every catalog item: distinct readers, review count and mean rating,
// total reading time, and highlight count. Rows where all four counts are
// zero are not written. One item's failure is logged and the batch moves on.
// ---------------------------------------------------------------------------

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AnalyticsError;
use crate::scheduler::{Job, duration_ms};
use crate::sources::Store;
use crate::types::{
	ActivityRecord, CatalogItem, ItemKey, ItemKind, ItemStats, JobReport, StatsRunSummary,
};

pub const ITEM_STATS_JOB: &str = "item-stats";

/// Round half away from zero to two decimals.
pub fn round_rating(rating: f64) -> f64 {
	(rating * 100.0).round() / 100.0
}

/// Distinct reader count per item.
pub fn reader_counts(activity: &[ActivityRecord]) -> HashMap<ItemKey, u64> {
	let mut readers: HashMap<ItemKey, HashSet<&str>> = HashMap::new();
	for record in activity {
		readers
			.entry(record.key())
			.or_default()
			.insert(record.user_id.as_str());
	}
	readers
		.into_iter()
		.map(|(key, users)| (key, users.len() as u64))
		.collect()
}

// ---------------------------------------------------------------------------
// StatsAggregator
// ---------------------------------------------------------------------------

pub struct StatsAggregator {
	store: Store,
}

impl StatsAggregator {
	pub fn new(store: Store) -> Self {
		Self { store }
	}

	/// Stats for one item, or `None` when every metric is zero.
	pub async fn compute_for(
		&self,
		item: &CatalogItem,
		total_readers: u64,
		now: DateTime<Utc>,
	) -> Result<Option<ItemStats>, AnalyticsError> {
		let reviews = self.store.reviews.aggregate_for(item.kind, &item.id).await?;
		let reading_seconds = self
			.store
			.sessions
			.total_duration_for(item.kind, &item.id)
			.await?;
		let highlights = self.store.highlights.count_for(item.kind, &item.id).await?;

		if total_readers == 0 && reviews.count == 0 && reading_seconds == 0 && highlights == 0 {
			return Ok(None);
		}

		let average_rating = if reviews.count == 0 {
			None
		} else {
			reviews.average_rating.map(round_rating)
		};

		Ok(Some(ItemStats {
			kind: item.kind,
			item_id: item.id.clone(),
			total_readers,
			average_rating,
			total_reviews: reviews.count,
			total_reading_seconds: reading_seconds,
			total_highlights: highlights,
			updated_at: now,
		}))
	}

	/// Compute and upsert stats for the whole catalog.
	///
	/// Listing the catalog or activity, and the final flush, are fatal.
	/// Everything per item is not.
	pub async fn run_batch(&self) -> Result<StatsRunSummary, AnalyticsError> {
		let now = Utc::now();

		let mut catalog = Vec::new();
		for kind in ItemKind::ALL {
			catalog.extend(self.store.catalog.list_items(kind).await?);
		}
		let activity = self.store.activity.list_user_item_pairs().await?;
		let readers = reader_counts(&activity);

		let mut summary = StatsRunSummary::default();

		for item in &catalog {
			summary.items_processed += 1;
			let total_readers = readers.get(&item.key()).copied().unwrap_or(0);

			let stats = match self.compute_for(item, total_readers, now).await {
				Ok(Some(stats)) => stats,
				Ok(None) => {
					summary.rows_skipped += 1;
					continue;
				}
				Err(e) => {
					summary.items_failed += 1;
					tracing::warn!(item = %item.key(), code = e.code(), "Stats computation failed: {}", e);
					continue;
				}
			};

			match self.store.stats.upsert(stats).await {
				Ok(()) => summary.rows_written += 1,
				Err(e) => {
					summary.items_failed += 1;
					tracing::warn!(item = %item.key(), code = e.code(), "Stats upsert failed: {}", e);
				}
			}
		}

		self.store.stats.flush().await?;
		Ok(summary)
	}
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

pub struct ItemStatsJob {
	aggregator: StatsAggregator,
}

impl ItemStatsJob {
	pub fn new(store: Store) -> Self {
		Self {
			aggregator: StatsAggregator::new(store),
		}
	}
}

#[async_trait]
impl Job for ItemStatsJob {
	async fn run(&self) -> Result<JobReport, AnalyticsError> {
		let start = Instant::now();
		let summary = self.aggregator.run_batch().await?;
		tracing::info!(
			items_processed = summary.items_processed,
			rows_written = summary.rows_written,
			rows_skipped = summary.rows_skipped,
			items_failed = summary.items_failed,
			elapsed_ms = duration_ms(start.elapsed()),
			"Item stats updated"
		);
		Ok(JobReport::Stats(summary))
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
