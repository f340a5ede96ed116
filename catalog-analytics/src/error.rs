use thiserror::Error;

/// Typed error variants for the catalog analytics engine.
#[derive(Debug, Error)]
pub enum AnalyticsError {
	#[error("Source error: {0}")]
	Source(String),

	#[error("Sink error: {0}")]
	Sink(String),

	#[error("Invalid catalog item: {0}")]
	InvalidItem(String),

	#[error("Edge cap exceeded for {source_key}: {count} edges (max {max})")]
	CapExceeded {
		source_key: String,
		count: usize,
		max: usize,
	},

	#[error("Unknown job: {0}")]
	UnknownJob(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Storage corruption: {0}")]
	Corruption(String),

	#[error("Configuration error: {0}")]
	Config(String),
}

impl AnalyticsError {
	/// Return a machine-readable error code string for this error variant.
	pub fn code(&self) -> &str {
		match self {
			Self::Source(_) => "ANALYTICS_SOURCE",
			Self::Sink(_) => "ANALYTICS_SINK",
			Self::InvalidItem(_) => "ANALYTICS_INVALID_ITEM",
			Self::CapExceeded { .. } => "ANALYTICS_CAP_EXCEEDED",
			Self::UnknownJob(_) => "ANALYTICS_UNKNOWN_JOB",
			Self::Io(_) => "ANALYTICS_IO",
			Self::Json(_) => "ANALYTICS_JSON",
			Self::Corruption(_) => "ANALYTICS_CORRUPT",
			Self::Config(_) => "ANALYTICS_CONFIG",
		}
	}
}
