// ---------------------------------------------------------------------------
// Job Scheduler: named recurring jobs with an overlap guard
// ---------------------------------------------------------------------------
//
// Each named job is Idle or Running. An invocation while Running is skipped
// (logged, never queued). Every execution runs in its own task so that an
// error or a panic in the job body is contained at this boundary and the
// job returns to Idle.
//
// The registry is an explicit value owned by the host; there is no global
// state. Timers hold only a weak reference, so dropping the last registry
// handle also ends its timers.
// ---------------------------------------------------------------------------

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::error::AnalyticsError;
use crate::types::JobReport;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Delay before the first run of a `run_immediately` job.
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(5);

const IDLE_POLL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Job seam
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Job: Send + Sync {
	async fn run(&self) -> Result<JobReport, AnalyticsError>;
}

/// Adapter turning an async closure into a [`Job`].
pub struct FnJob<F>(F);

pub fn job_fn<F, Fut>(f: F) -> FnJob<F>
where
	F: Fn() -> Fut + Send + Sync,
	Fut: Future<Output = Result<JobReport, AnalyticsError>> + Send + 'static,
{
	FnJob(f)
}

#[async_trait]
impl<F, Fut> Job for FnJob<F>
where
	F: Fn() -> Fut + Send + Sync,
	Fut: Future<Output = Result<JobReport, AnalyticsError>> + Send + 'static,
{
	async fn run(&self) -> Result<JobReport, AnalyticsError> {
		(self.0)().await
	}
}

/// Uniform description of a recurring job.
#[derive(Clone)]
pub struct JobDescriptor {
	pub name: String,
	pub interval: Duration,
	pub run_immediately: bool,
	pub handler: Arc<dyn Job>,
}

// ---------------------------------------------------------------------------
// Outcomes & status
// ---------------------------------------------------------------------------

/// Result of one `run_job` call as seen by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
	Completed(JobReport),
	Failed(String),
	Panicked(String),
	/// Another execution of the same job was in flight.
	Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LastOutcome {
	Succeeded,
	Failed { message: String },
	Panicked { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
	pub running: bool,
	#[serde(rename = "lastRun")]
	pub last_run: Option<DateTime<Utc>>,
	#[serde(rename = "lastDurationMs")]
	pub last_duration_ms: Option<u64>,
	#[serde(rename = "lastOutcome")]
	pub last_outcome: Option<LastOutcome>,
}

// ---------------------------------------------------------------------------
// Registry internals
// ---------------------------------------------------------------------------

#[derive(Default)]
struct JobEntry {
	handler: Option<Arc<dyn Job>>,
	running: bool,
	last_run: Option<DateTime<Utc>>,
	last_duration_ms: Option<u64>,
	last_outcome: Option<LastOutcome>,
}

#[derive(Default)]
struct RegistryState {
	jobs: HashMap<String, JobEntry>,
	timers: HashMap<String, JoinHandle<()>>,
}

struct RegistryInner {
	state: Mutex<RegistryState>,
	warmup: Duration,
	initialized: AtomicBool,
}

impl RegistryInner {
	fn lock(&self) -> MutexGuard<'_, RegistryState> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}
}

/// Returns the job to Idle when the execution task ends, including by panic.
struct RunningGuard {
	inner: Arc<RegistryInner>,
	name: String,
}

impl Drop for RunningGuard {
	fn drop(&mut self) {
		if let Some(entry) = self.inner.lock().jobs.get_mut(&self.name) {
			entry.running = false;
		}
	}
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub fn duration_ms(duration: Duration) -> u64 {
	u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(err: JoinError) -> String {
	if err.is_cancelled() {
		return "task cancelled".to_string();
	}
	let payload = err.into_panic();
	if let Some(s) = payload.downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"unknown panic payload".to_string()
	}
}

// ---------------------------------------------------------------------------
// JobRegistry
// ---------------------------------------------------------------------------

/// Owns job state and timers. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct JobRegistry {
	inner: Arc<RegistryInner>,
}

impl Default for JobRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl JobRegistry {
	pub fn new() -> Self {
		Self::with_warmup(DEFAULT_WARMUP)
	}

	pub fn with_warmup(warmup: Duration) -> Self {
		Self {
			inner: Arc::new(RegistryInner {
				state: Mutex::new(RegistryState::default()),
				warmup,
				initialized: AtomicBool::new(false),
			}),
		}
	}

	/// Returns `true` the first time only.
	pub(crate) fn mark_initialized(&self) -> bool {
		!self.inner.initialized.swap(true, Ordering::SeqCst)
	}

	// -- Execution --------------------------------------------------------

	/// Run `job` under `name` unless that name is already running.
	///
	/// Never returns an error: failures and panics are logged and reported
	/// through [`RunOutcome`].
	pub async fn run_job(&self, name: &str, job: Arc<dyn Job>) -> RunOutcome {
		{
			let mut state = self.inner.lock();
			let entry = state.jobs.entry(name.to_string()).or_default();
			if entry.running {
				tracing::warn!(job = %name, "Job already running, skipping invocation");
				return RunOutcome::Skipped;
			}
			entry.running = true;
			entry.last_run = Some(Utc::now());
		}

		let guard = RunningGuard {
			inner: self.inner.clone(),
			name: name.to_string(),
		};
		let run_id = Uuid::new_v4();
		let start = Instant::now();
		tracing::info!(job = %name, run_id = %run_id, "Job started");

		let task = tokio::spawn(async move {
			let _guard = guard;
			job.run().await
		});
		let joined = task.await;
		let elapsed_ms = duration_ms(start.elapsed());

		let (outcome, last) = match joined {
			Ok(Ok(report)) => {
				tracing::info!(job = %name, run_id = %run_id, elapsed_ms, "Job completed");
				(RunOutcome::Completed(report), LastOutcome::Succeeded)
			}
			Ok(Err(e)) => {
				tracing::error!(
					job = %name,
					run_id = %run_id,
					elapsed_ms,
					code = e.code(),
					"Job failed: {}",
					e
				);
				let message = e.to_string();
				(
					RunOutcome::Failed(message.clone()),
					LastOutcome::Failed { message },
				)
			}
			Err(join_err) => {
				let message = panic_message(join_err);
				tracing::error!(job = %name, run_id = %run_id, elapsed_ms, "Job panicked: {}", message);
				(
					RunOutcome::Panicked(message.clone()),
					LastOutcome::Panicked { message },
				)
			}
		};

		if let Some(entry) = self.inner.lock().jobs.get_mut(name) {
			entry.last_duration_ms = Some(elapsed_ms);
			entry.last_outcome = Some(last);
		}

		outcome
	}

	// -- Registration & timers ---------------------------------------------

	/// Make `name` known to `trigger_job` without scheduling it.
	pub fn register(&self, name: &str, handler: Arc<dyn Job>) {
		self.inner
			.lock()
			.jobs
			.entry(name.to_string())
			.or_default()
			.handler = Some(handler);
	}

	/// Register `descriptor` and start its timer. Re-scheduling a name
	/// replaces the earlier handler and timer.
	pub fn schedule_job(&self, descriptor: JobDescriptor) -> Result<(), AnalyticsError> {
		let JobDescriptor {
			name,
			interval,
			run_immediately,
			handler,
		} = descriptor;

		if interval.is_zero() {
			return Err(AnalyticsError::Config(format!(
				"job '{name}' has a zero interval"
			)));
		}

		self.register(&name, handler.clone());

		let first = if run_immediately { self.inner.warmup } else { interval };
		let weak: Weak<RegistryInner> = Arc::downgrade(&self.inner);
		let timer_name = name.clone();

		let timer = tokio::spawn(async move {
			let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + first, interval);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
			loop {
				ticker.tick().await;
				let Some(inner) = weak.upgrade() else {
					break;
				};
				let registry = JobRegistry { inner };
				let name = timer_name.clone();
				let handler = handler.clone();
				tokio::spawn(async move {
					registry.run_job(&name, handler).await;
				});
			}
		});

		tracing::info!(
			job = %name,
			interval_secs = interval.as_secs(),
			run_immediately,
			"Job scheduled"
		);

		if let Some(previous) = self.inner.lock().timers.insert(name, timer) {
			previous.abort();
		}
		Ok(())
	}

	/// Manually start a registered job. Returns whether the name is known;
	/// the run itself happens in the background under the overlap guard.
	pub fn trigger_job(&self, name: &str) -> bool {
		let handler = self
			.inner
			.lock()
			.jobs
			.get(name)
			.and_then(|entry| entry.handler.clone());

		match handler {
			Some(handler) => {
				tracing::info!(job = %name, "Job triggered manually");
				let registry = self.clone();
				let name = name.to_string();
				tokio::spawn(async move {
					registry.run_job(&name, handler).await;
				});
				true
			}
			None => {
				tracing::warn!(job = %name, "Trigger for unknown job");
				false
			}
		}
	}

	/// Cancel every timer. In-flight runs are left to finish.
	pub fn stop_jobs(&self) {
		let timers: Vec<(String, JoinHandle<()>)> = self.inner.lock().timers.drain().collect();
		for (name, timer) in &timers {
			timer.abort();
			tracing::debug!(job = %name, "Timer cancelled");
		}
		tracing::info!(timers = timers.len(), "Scheduled jobs stopped");
	}

	// -- Inspection -------------------------------------------------------

	pub fn job_status(&self) -> BTreeMap<String, JobStatus> {
		self.inner
			.lock()
			.jobs
			.iter()
			.map(|(name, entry)| {
				(
					name.clone(),
					JobStatus {
						running: entry.running,
						last_run: entry.last_run,
						last_duration_ms: entry.last_duration_ms,
						last_outcome: entry.last_outcome.clone(),
					},
				)
			})
			.collect()
	}

	pub fn is_running(&self, name: &str) -> bool {
		self.inner
			.lock()
			.jobs
			.get(name)
			.is_some_and(|entry| entry.running)
	}

	pub fn is_registered(&self, name: &str) -> bool {
		self.inner
			.lock()
			.jobs
			.get(name)
			.is_some_and(|entry| entry.handler.is_some())
	}

	pub fn scheduled_count(&self) -> usize {
		self.inner.lock().timers.len()
	}

	/// Resolve once no job is running.
	pub async fn wait_idle(&self) {
		loop {
			let busy = self.inner.lock().jobs.values().any(|entry| entry.running);
			if !busy {
				return;
			}
			tokio::time::sleep(IDLE_POLL).await;
		}
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use tokio::sync::Notify;

	use super::*;

	async fn settle() {
		for _ in 0..32 {
			tokio::task::yield_now().await;
		}
	}

	fn counting_job(counter: Arc<AtomicUsize>) -> Arc<dyn Job> {
		Arc::new(job_fn(move || {
			let counter = counter.clone();
			async move {
				counter.fetch_add(1, Ordering::SeqCst);
				Ok::<_, AnalyticsError>(JobReport::Empty)
			}
		}))
	}

	fn gated_job(counter: Arc<AtomicUsize>, gate: Arc<Notify>) -> Arc<dyn Job> {
		Arc::new(job_fn(move || {
			let counter = counter.clone();
			let gate = gate.clone();
			async move {
				counter.fetch_add(1, Ordering::SeqCst);
				gate.notified().await;
				Ok::<_, AnalyticsError>(JobReport::Empty)
			}
		}))
	}

	fn descriptor(name: &str, interval_secs: u64, run_immediately: bool, handler: Arc<dyn Job>) -> JobDescriptor {
		JobDescriptor {
			name: name.to_string(),
			interval: Duration::from_secs(interval_secs),
			run_immediately,
			handler,
		}
	}

	#[test]
	fn duration_ms_saturates() {
		assert_eq!(duration_ms(Duration::from_millis(1500)), 1500);
		assert_eq!(duration_ms(Duration::from_micros(999)), 0);
		assert_eq!(duration_ms(Duration::MAX), u64::MAX);
	}

	#[tokio::test]
	async fn run_job_records_success() {
		let registry = JobRegistry::new();
		let counter = Arc::new(AtomicUsize::new(0));
		let outcome = registry.run_job("x", counting_job(counter.clone())).await;

		assert_eq!(outcome, RunOutcome::Completed(JobReport::Empty));
		assert_eq!(counter.load(Ordering::SeqCst), 1);

		let status = registry.job_status();
		let x = &status["x"];
		assert!(!x.running);
		assert!(x.last_run.is_some());
		assert!(x.last_duration_ms.is_some());
		assert_eq!(x.last_outcome, Some(LastOutcome::Succeeded));
	}

	#[tokio::test]
	async fn trigger_while_running_does_not_start_second_execution() {
		let registry = JobRegistry::new();
		let counter = Arc::new(AtomicUsize::new(0));
		let gate = Arc::new(Notify::new());
		registry.register("x", gated_job(counter.clone(), gate.clone()));

		assert!(registry.trigger_job("x"));
		settle().await;
		assert!(registry.is_running("x"));

		assert!(registry.trigger_job("x"));
		settle().await;
		assert_eq!(counter.load(Ordering::SeqCst), 1);
		assert!(registry.job_status()["x"].running);

		gate.notify_one();
		registry.wait_idle().await;
		assert!(!registry.job_status()["x"].running);
		assert_eq!(counter.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn direct_run_while_running_is_skipped() {
		let registry = JobRegistry::new();
		let counter = Arc::new(AtomicUsize::new(0));
		let gate = Arc::new(Notify::new());
		let job = gated_job(counter.clone(), gate.clone());

		let first = tokio::spawn({
			let registry = registry.clone();
			let job = job.clone();
			async move { registry.run_job("x", job).await }
		});
		settle().await;

		let second = registry.run_job("x", job).await;
		assert_eq!(second, RunOutcome::Skipped);

		gate.notify_one();
		let first = first.await.unwrap();
		assert_eq!(first, RunOutcome::Completed(JobReport::Empty));
		assert_eq!(counter.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn failing_job_returns_to_idle_and_runs_again() {
		let registry = JobRegistry::new();
		let calls = Arc::new(AtomicUsize::new(0));
		let job: Arc<dyn Job> = Arc::new(job_fn({
			let calls = calls.clone();
			move || {
				let calls = calls.clone();
				async move {
					calls.fetch_add(1, Ordering::SeqCst);
					Err::<JobReport, _>(AnalyticsError::Source("store outage".into()))
				}
			}
		}));

		let outcome = registry.run_job("flaky", job.clone()).await;
		assert!(matches!(outcome, RunOutcome::Failed(ref m) if m.contains("store outage")));
		assert!(!registry.is_running("flaky"));

		let again = registry.run_job("flaky", job).await;
		assert!(matches!(again, RunOutcome::Failed(_)));
		assert_eq!(calls.load(Ordering::SeqCst), 2);
		assert!(matches!(
			registry.job_status()["flaky"].last_outcome,
			Some(LastOutcome::Failed { .. })
		));
	}

	#[tokio::test]
	async fn panicking_job_is_contained() {
		let registry = JobRegistry::new();
		let job: Arc<dyn Job> = Arc::new(job_fn(|| async {
			if true {
				panic!("index blew up");
			}
			Ok::<_, AnalyticsError>(JobReport::Empty)
		}));

		let outcome = registry.run_job("boom", job).await;
		assert_eq!(outcome, RunOutcome::Panicked("index blew up".into()));
		assert!(!registry.is_running("boom"));

		let counter = Arc::new(AtomicUsize::new(0));
		let next = registry.run_job("boom", counting_job(counter.clone())).await;
		assert_eq!(next, RunOutcome::Completed(JobReport::Empty));
	}

	#[tokio::test]
	async fn trigger_unknown_job_returns_false() {
		let registry = JobRegistry::new();
		assert!(!registry.trigger_job("nope"));
		assert!(registry.job_status().is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn run_immediately_waits_for_warmup_then_repeats() {
		let registry = JobRegistry::with_warmup(Duration::from_secs(5));
		let counter = Arc::new(AtomicUsize::new(0));
		registry
			.schedule_job(descriptor("tick", 60, true, counting_job(counter.clone())))
			.unwrap();

		tokio::time::sleep(Duration::from_secs(4)).await;
		settle().await;
		assert_eq!(counter.load(Ordering::SeqCst), 0);

		tokio::time::sleep(Duration::from_secs(2)).await;
		settle().await;
		assert_eq!(counter.load(Ordering::SeqCst), 1);

		tokio::time::sleep(Duration::from_secs(60)).await;
		settle().await;
		assert_eq!(counter.load(Ordering::SeqCst), 2);

		registry.stop_jobs();
	}

	#[tokio::test(start_paused = true)]
	async fn without_run_immediately_first_run_waits_one_interval() {
		let registry = JobRegistry::with_warmup(Duration::from_secs(1));
		let counter = Arc::new(AtomicUsize::new(0));
		registry
			.schedule_job(descriptor("slow", 30, false, counting_job(counter.clone())))
			.unwrap();

		tokio::time::sleep(Duration::from_secs(29)).await;
		settle().await;
		assert_eq!(counter.load(Ordering::SeqCst), 0);

		tokio::time::sleep(Duration::from_secs(2)).await;
		settle().await;
		assert_eq!(counter.load(Ordering::SeqCst), 1);
		registry.stop_jobs();
	}

	#[tokio::test(start_paused = true)]
	async fn stuck_job_is_skipped_on_later_ticks() {
		let registry = JobRegistry::new();
		let counter = Arc::new(AtomicUsize::new(0));
		let gate = Arc::new(Notify::new());
		registry
			.schedule_job(descriptor("stuck", 10, false, gated_job(counter.clone(), gate.clone())))
			.unwrap();

		tokio::time::sleep(Duration::from_secs(45)).await;
		settle().await;
		assert_eq!(counter.load(Ordering::SeqCst), 1);
		assert!(registry.is_running("stuck"));

		gate.notify_one();
		settle().await;
		assert!(!registry.is_running("stuck"));
		registry.stop_jobs();
	}

	#[tokio::test(start_paused = true)]
	async fn stop_jobs_lets_in_flight_run_finish() {
		let registry = JobRegistry::new();
		let counter = Arc::new(AtomicUsize::new(0));
		let gate = Arc::new(Notify::new());
		registry
			.schedule_job(descriptor("long", 10, false, gated_job(counter.clone(), gate.clone())))
			.unwrap();

		tokio::time::sleep(Duration::from_secs(11)).await;
		settle().await;
		assert!(registry.is_running("long"));

		registry.stop_jobs();
		assert_eq!(registry.scheduled_count(), 0);
		assert!(registry.is_running("long"));

		gate.notify_one();
		registry.wait_idle().await;
		assert_eq!(
			registry.job_status()["long"].last_outcome,
			Some(LastOutcome::Succeeded)
		);

		tokio::time::sleep(Duration::from_secs(60)).await;
		settle().await;
		assert_eq!(counter.load(Ordering::SeqCst), 1);
		// Still triggerable by hand after the timers are gone.
		assert!(registry.trigger_job("long"));
	}

	#[tokio::test]
	async fn zero_interval_is_rejected() {
		let registry = JobRegistry::new();
		let counter = Arc::new(AtomicUsize::new(0));
		let err = registry
			.schedule_job(descriptor("zero", 0, true, counting_job(counter)))
			.unwrap_err();
		assert_eq!(err.code(), "ANALYTICS_CONFIG");
		assert!(!registry.is_registered("zero"));
	}

	#[tokio::test]
	async fn registries_are_isolated() {
		let a = JobRegistry::new();
		let b = JobRegistry::new();
		a.register("x", counting_job(Arc::new(AtomicUsize::new(0))));
		assert!(a.is_registered("x"));
		assert!(!b.is_registered("x"));
		assert!(!b.trigger_job("x"));
	}
}
