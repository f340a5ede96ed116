// ---------------------------------------------------------------------------
// Configuration: CLI flags with environment fallbacks
// ---------------------------------------------------------------------------

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::candidates::DEFAULT_MAX_RELATED;
use crate::cooccurrence::DEFAULT_LARGE_COLLECTION_WARN;
use crate::error::AnalyticsError;
use crate::relationships::RelationshipOptions;
use crate::scheduler::DEFAULT_WARMUP;

pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_RELATED_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Environments in which scheduling is on unless overridden.
const PRODUCTION_LIKE: [&str; 3] = ["production", "prod", "staging"];

#[derive(Parser, Debug)]
#[command(
	name = "catalog-analytics",
	about = "Related-item mining and per-item usage stats on a schedule"
)]
pub struct CliArgs {
	/// Deployment environment (production, staging, development, ...)
	#[arg(long, default_value = "development", env = "APP_ENV")]
	pub environment: String,

	/// Force scheduling on or off regardless of environment
	#[arg(
		long,
		env = "CATALOG_ANALYTICS_JOBS_ENABLED",
		value_parser = clap::builder::BoolishValueParser::new()
	)]
	pub jobs_enabled: Option<bool>,

	/// Seconds between item-stats runs
	#[arg(long, default_value = "3600", env = "CATALOG_ANALYTICS_STATS_INTERVAL_SECS")]
	pub stats_interval_secs: u64,

	/// Seconds between related-items runs
	#[arg(long, default_value = "604800", env = "CATALOG_ANALYTICS_RELATED_INTERVAL_SECS")]
	pub related_interval_secs: u64,

	/// Delay before the first run of jobs that start immediately
	#[arg(long, default_value = "5", env = "CATALOG_ANALYTICS_WARMUP_SECS")]
	pub warmup_secs: u64,

	/// Maximum related items kept per source item
	#[arg(long, default_value = "20")]
	pub max_related: usize,

	/// Warn when one user's collection exceeds this many items
	#[arg(long, default_value = "1000")]
	pub large_collection_warn: usize,

	/// Directory holding snapshot.json[.gz] and the written results
	#[arg(long, default_value = "./data", env = "CATALOG_ANALYTICS_DATA_DIR")]
	pub data_dir: PathBuf,

	/// Run a single job by name and exit
	#[arg(long)]
	pub once: Option<String>,

	/// Log level (trace, debug, info, warn, error)
	#[arg(long, default_value = "info", env = "CATALOG_ANALYTICS_LOG_LEVEL")]
	pub log_level: String,
}

/// Settings that drive job registration and the relationship pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsConfig {
	pub environment: String,
	/// Explicit override; `None` defers to the environment.
	pub jobs_enabled: Option<bool>,
	pub stats_interval: Duration,
	pub related_interval: Duration,
	pub warmup: Duration,
	pub max_related: usize,
	pub large_collection_warn: usize,
}

impl Default for AnalyticsConfig {
	fn default() -> Self {
		Self {
			environment: "development".to_string(),
			jobs_enabled: None,
			stats_interval: DEFAULT_STATS_INTERVAL,
			related_interval: DEFAULT_RELATED_INTERVAL,
			warmup: DEFAULT_WARMUP,
			max_related: DEFAULT_MAX_RELATED,
			large_collection_warn: DEFAULT_LARGE_COLLECTION_WARN,
		}
	}
}

impl AnalyticsConfig {
	pub fn production() -> Self {
		Self {
			environment: "production".to_string(),
			..Self::default()
		}
	}

	pub fn is_production_like(&self) -> bool {
		let env = self.environment.trim().to_lowercase();
		PRODUCTION_LIKE.contains(&env.as_str())
	}

	/// Whether `initialize_jobs` should schedule anything.
	pub fn jobs_enabled(&self) -> bool {
		self.jobs_enabled.unwrap_or_else(|| self.is_production_like())
	}

	pub fn relationship_options(&self) -> RelationshipOptions {
		RelationshipOptions {
			max_related: self.max_related,
			large_collection_warn: self.large_collection_warn,
		}
	}

	pub fn validate(&self) -> Result<(), AnalyticsError> {
		if self.stats_interval.is_zero() {
			return Err(AnalyticsError::Config("stats interval must be non-zero".into()));
		}
		if self.related_interval.is_zero() {
			return Err(AnalyticsError::Config(
				"related-items interval must be non-zero".into(),
			));
		}
		if self.max_related == 0 {
			return Err(AnalyticsError::Config("max_related must be at least 1".into()));
		}
		Ok(())
	}
}

impl From<&CliArgs> for AnalyticsConfig {
	fn from(args: &CliArgs) -> Self {
		Self {
			environment: args.environment.clone(),
			jobs_enabled: args.jobs_enabled,
			stats_interval: Duration::from_secs(args.stats_interval_secs),
			related_interval: Duration::from_secs(args.related_interval_secs),
			warmup: Duration::from_secs(args.warmup_secs),
			max_related: args.max_related,
			large_collection_warn: args.large_collection_warn,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_is_development_and_disabled() {
		let config = AnalyticsConfig::default();
		assert_eq!(config.environment, "development");
		assert!(!config.jobs_enabled());
		assert_eq!(config.stats_interval, Duration::from_secs(3600));
		assert_eq!(config.related_interval, Duration::from_secs(604_800));
		assert_eq!(config.warmup, Duration::from_secs(5));
		assert!(config.validate().is_ok());
	}

	#[test]
	fn production_like_environments_enable_jobs() {
		for env in ["production", "prod", "staging", " Production "] {
			let config = AnalyticsConfig {
				environment: env.to_string(),
				..Default::default()
			};
			assert!(config.jobs_enabled(), "{env} should enable jobs");
		}
		let test = AnalyticsConfig {
			environment: "test".to_string(),
			..Default::default()
		};
		assert!(!test.jobs_enabled());
	}

	#[test]
	fn explicit_override_wins() {
		let forced_on = AnalyticsConfig {
			jobs_enabled: Some(true),
			..Default::default()
		};
		assert!(forced_on.jobs_enabled());

		let forced_off = AnalyticsConfig {
			jobs_enabled: Some(false),
			..AnalyticsConfig::production()
		};
		assert!(!forced_off.jobs_enabled());
	}

	#[test]
	fn validate_rejects_zero_values() {
		let zero_interval = AnalyticsConfig {
			stats_interval: Duration::ZERO,
			..Default::default()
		};
		assert_eq!(zero_interval.validate().unwrap_err().code(), "ANALYTICS_CONFIG");

		let zero_k = AnalyticsConfig {
			max_related: 0,
			..Default::default()
		};
		assert!(zero_k.validate().is_err());
	}

	#[test]
	fn cli_args_convert() {
		let args = CliArgs::parse_from([
			"catalog-analytics",
			"--environment",
			"staging",
			"--jobs-enabled",
			"false",
			"--stats-interval-secs",
			"60",
			"--max-related",
			"5",
			"--once",
			"item-stats",
		]);
		assert_eq!(args.once.as_deref(), Some("item-stats"));

		let config = AnalyticsConfig::from(&args);
		assert_eq!(config.environment, "staging");
		assert_eq!(config.jobs_enabled, Some(false));
		assert!(!config.jobs_enabled());
		assert_eq!(config.stats_interval, Duration::from_secs(60));
		assert_eq!(config.relationship_options().max_related, 5);
	}
}
