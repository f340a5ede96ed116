// ---------------------------------------------------------------------------
// File-backed store + Gzip helpers
// ---------------------------------------------------------------------------
//
// Input: `snapshot.json` or `snapshot.json.gz` in the data directory,
//   `{ "version": 1, "catalog": [...], "activity": [...], "reviews": [...],
//      "sessions": [...], "highlights": [...] }`
// Output: gzipped JSON `{ "version": 1, "generatedAt": ..., "entries": [...] }`
//   in `related_items.json.gz` and `item_stats.json.gz`, written to a temp
//   file and renamed into place.
//
// Previously written outputs are loaded on open so stats upserts carry over
// between runs.
// ---------------------------------------------------------------------------

use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::{GzDecoder, GzEncoder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AnalyticsError;
use crate::memory_store::MemoryStore;
use crate::sources::{
	ActivitySource, CatalogSource, HighlightSource, RelationshipSink, ReviewSource,
	SessionSource, StatsSink,
};
use crate::types::{
	ActivityRecord, CatalogItem, HighlightRecord, ItemKind, ItemStats, RelatedItemEdge,
	ReviewAggregate, ReviewRecord, SessionRecord,
};

pub const FORMAT_VERSION: u32 = 1;
pub const SNAPSHOT_FILE: &str = "snapshot.json";
pub const SNAPSHOT_GZ_FILE: &str = "snapshot.json.gz";
pub const RELATED_ITEMS_FILE: &str = "related_items.json.gz";
pub const ITEM_STATS_FILE: &str = "item_stats.json.gz";

// ---------------------------------------------------------------------------
// Gzip helpers
// ---------------------------------------------------------------------------

/// Gzip-compress a byte slice (level 6).
pub fn compress(data: &[u8]) -> Result<Vec<u8>, AnalyticsError> {
	let mut encoder = GzEncoder::new(data, Compression::new(6));
	let mut compressed = Vec::new();
	encoder.read_to_end(&mut compressed)?;
	Ok(compressed)
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>, AnalyticsError> {
	let mut decoder = GzDecoder::new(data);
	let mut decompressed = Vec::new();
	decoder.read_to_end(&mut decompressed)?;
	Ok(decompressed)
}

/// Check for the gzip magic bytes (0x1f, 0x8b).
pub fn is_gzipped(data: &[u8]) -> bool {
	data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

// ---------------------------------------------------------------------------
// File formats
// ---------------------------------------------------------------------------

/// Point-in-time export of the externally owned stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
	pub version: u32,
	#[serde(default)]
	pub catalog: Vec<CatalogItem>,
	#[serde(default)]
	pub activity: Vec<ActivityRecord>,
	#[serde(default)]
	pub reviews: Vec<ReviewRecord>,
	#[serde(default)]
	pub sessions: Vec<SessionRecord>,
	#[serde(default)]
	pub highlights: Vec<HighlightRecord>,
}

#[derive(Serialize, Deserialize)]
struct OutputFile<T> {
	version: u32,
	#[serde(rename = "generatedAt")]
	generated_at: DateTime<Utc>,
	entries: Vec<T>,
}

/// Parse a snapshot from plain or gzipped JSON bytes.
pub fn parse_snapshot(bytes: &[u8]) -> Result<Snapshot, AnalyticsError> {
	let json = if is_gzipped(bytes) {
		decompress(bytes)?
	} else {
		bytes.to_vec()
	};
	let snapshot: Snapshot = serde_json::from_slice(&json)?;
	if snapshot.version != FORMAT_VERSION {
		return Err(AnalyticsError::Corruption(format!(
			"unsupported snapshot version {} (expected {})",
			snapshot.version, FORMAT_VERSION
		)));
	}
	Ok(snapshot)
}

/// Locate and parse the snapshot in `dir`, preferring the gzipped file.
pub fn load_snapshot(dir: &Path) -> Result<Snapshot, AnalyticsError> {
	let path = [SNAPSHOT_GZ_FILE, SNAPSHOT_FILE]
		.iter()
		.map(|name| dir.join(name))
		.find(|path| path.exists())
		.ok_or_else(|| {
			AnalyticsError::Config(format!("no snapshot found in {}", dir.display()))
		})?;
	let bytes = std::fs::read(&path)?;
	let snapshot = parse_snapshot(&bytes)?;
	tracing::info!(
		path = %path.display(),
		catalog = snapshot.catalog.len(),
		activity = snapshot.activity.len(),
		"Snapshot loaded"
	);
	Ok(snapshot)
}

/// Read the entries of a previously written output file.
pub fn read_output<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, AnalyticsError> {
	let bytes = std::fs::read(path)?;
	let json = if is_gzipped(&bytes) {
		decompress(&bytes)?
	} else {
		bytes
	};
	let file: OutputFile<T> = serde_json::from_slice(&json)?;
	if file.version != FORMAT_VERSION {
		return Err(AnalyticsError::Corruption(format!(
			"unsupported output version {} in {}",
			file.version,
			path.display()
		)));
	}
	Ok(file.entries)
}

async fn write_output<T: Serialize>(path: &Path, entries: Vec<T>) -> Result<(), AnalyticsError> {
	let file = OutputFile {
		version: FORMAT_VERSION,
		generated_at: Utc::now(),
		entries,
	};
	let compressed = compress(&serde_json::to_vec(&file)?)?;

	let tmp = path.with_extension("tmp");
	tokio::fs::write(&tmp, &compressed).await?;
	tokio::fs::rename(&tmp, path).await?;
	tracing::debug!(path = %path.display(), bytes = compressed.len(), "Output written");
	Ok(())
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// Snapshot-backed store for local runs; every read is served from memory.
pub struct FileStore {
	dir: PathBuf,
	memory: MemoryStore,
}

impl FileStore {
	pub fn open(dir: impl Into<PathBuf>) -> Result<Self, AnalyticsError> {
		let dir = dir.into();
		let snapshot = load_snapshot(&dir)?;
		let store = Self::from_snapshot(&dir, snapshot);

		let edges_path = dir.join(RELATED_ITEMS_FILE);
		if edges_path.exists() {
			store.memory.set_edges(read_output(&edges_path)?);
		}
		let stats_path = dir.join(ITEM_STATS_FILE);
		if stats_path.exists() {
			store.memory.set_stats(read_output(&stats_path)?);
		}
		Ok(store)
	}

	pub fn from_snapshot(dir: &Path, snapshot: Snapshot) -> Self {
		let memory = MemoryStore::new();
		memory.set_catalog(snapshot.catalog);
		memory.set_activity(snapshot.activity);
		for review in &snapshot.reviews {
			memory.add_review(review);
		}
		for session in &snapshot.sessions {
			memory.add_session(session);
		}
		for highlight in &snapshot.highlights {
			memory.add_highlight(highlight);
		}
		Self {
			dir: dir.to_path_buf(),
			memory,
		}
	}

	pub fn related_items_path(&self) -> PathBuf {
		self.dir.join(RELATED_ITEMS_FILE)
	}

	pub fn item_stats_path(&self) -> PathBuf {
		self.dir.join(ITEM_STATS_FILE)
	}
}

#[async_trait]
impl CatalogSource for FileStore {
	async fn list_items(&self, kind: ItemKind) -> Result<Vec<CatalogItem>, AnalyticsError> {
		self.memory.list_items(kind).await
	}
}

#[async_trait]
impl ActivitySource for FileStore {
	async fn list_user_item_pairs(&self) -> Result<Vec<ActivityRecord>, AnalyticsError> {
		self.memory.list_user_item_pairs().await
	}
}

#[async_trait]
impl ReviewSource for FileStore {
	async fn aggregate_for(
		&self,
		kind: ItemKind,
		id: &str,
	) -> Result<ReviewAggregate, AnalyticsError> {
		self.memory.aggregate_for(kind, id).await
	}
}

#[async_trait]
impl SessionSource for FileStore {
	async fn total_duration_for(&self, kind: ItemKind, id: &str) -> Result<u64, AnalyticsError> {
		self.memory.total_duration_for(kind, id).await
	}
}

#[async_trait]
impl HighlightSource for FileStore {
	async fn count_for(&self, kind: ItemKind, id: &str) -> Result<u64, AnalyticsError> {
		self.memory.count_for(kind, id).await
	}
}

#[async_trait]
impl RelationshipSink for FileStore {
	async fn replace_all(&self, edges: Vec<RelatedItemEdge>) -> Result<(), AnalyticsError> {
		write_output(&self.related_items_path(), edges.clone()).await?;
		self.memory.replace_all(edges).await
	}
}

#[async_trait]
impl StatsSink for FileStore {
	async fn upsert(&self, stats: ItemStats) -> Result<(), AnalyticsError> {
		self.memory.upsert(stats).await
	}

	/// Persist every stats row accumulated so far.
	async fn flush(&self) -> Result<(), AnalyticsError> {
		write_output(&self.item_stats_path(), self.memory.stats()).await?;
		self.memory.flush().await
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
