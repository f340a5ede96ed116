// ---------------------------------------------------------------------------
// Job wiring: the analytics jobs and their one-time registration
// ---------------------------------------------------------------------------
//
// `initialize_jobs` runs at most once per registry. Scheduling is off outside
// production unless the config overrides it.
// ---------------------------------------------------------------------------

use std::sync::Arc;

use crate::config::AnalyticsConfig;
use crate::relationships::{RELATED_ITEMS_JOB, RelatedItemsJob};
use crate::scheduler::{JobDescriptor, JobRegistry};
use crate::sources::Store;
use crate::stats::{ITEM_STATS_JOB, ItemStatsJob};

/// The recurring analytics jobs, hourly stats and weekly relationships.
pub fn job_descriptors(store: &Store, config: &AnalyticsConfig) -> Vec<JobDescriptor> {
	vec![
		JobDescriptor {
			name: ITEM_STATS_JOB.to_string(),
			interval: config.stats_interval,
			run_immediately: true,
			handler: Arc::new(ItemStatsJob::new(store.clone())),
		},
		JobDescriptor {
			name: RELATED_ITEMS_JOB.to_string(),
			interval: config.related_interval,
			run_immediately: true,
			handler: Arc::new(RelatedItemsJob::new(
				store.clone(),
				config.relationship_options(),
			)),
		},
	]
}

/// Make every job triggerable by name without starting any timer.
pub fn register_jobs(registry: &JobRegistry, store: &Store, config: &AnalyticsConfig) {
	for descriptor in job_descriptors(store, config) {
		registry.register(&descriptor.name, descriptor.handler);
	}
}

/// Schedule all analytics jobs on `registry`.
///
/// Returns `true` only on the call that actually scheduled. Later calls,
/// disabled environments and invalid configs return `false`.
pub fn initialize_jobs(registry: &JobRegistry, store: &Store, config: &AnalyticsConfig) -> bool {
	if !registry.mark_initialized() {
		tracing::debug!("Jobs already initialized");
		return false;
	}

	if !config.jobs_enabled() {
		tracing::info!(
			environment = %config.environment,
			"Scheduled jobs disabled for this environment"
		);
		return false;
	}

	if let Err(e) = config.validate() {
		tracing::error!(code = e.code(), "Refusing to schedule jobs: {}", e);
		return false;
	}

	let mut scheduled = 0usize;
	for descriptor in job_descriptors(store, config) {
		let name = descriptor.name.clone();
		match registry.schedule_job(descriptor) {
			Ok(()) => scheduled += 1,
			Err(e) => tracing::error!(job = %name, code = e.code(), "Failed to schedule job: {}", e),
		}
	}

	tracing::info!(
		jobs = scheduled,
		environment = %config.environment,
		"Analytics jobs initialized"
	);
	scheduled > 0
}
