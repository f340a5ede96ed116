use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use catalog_analytics::config::{AnalyticsConfig, CliArgs};
use catalog_analytics::error::AnalyticsError;
use catalog_analytics::jobs::{initialize_jobs, job_descriptors};
use catalog_analytics::persistence::FileStore;
use catalog_analytics::scheduler::{JobRegistry, RunOutcome};
use catalog_analytics::sources::Store;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<ExitCode> {
	let args = CliArgs::parse();

	// Logs go to stderr; RUST_LOG wins over --log-level
	tracing_subscriber::fmt()
		.with_writer(std::io::stderr)
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
		)
		.init();

	let config = AnalyticsConfig::from(&args);
	config.validate()?;

	let file_store = FileStore::open(&args.data_dir)
		.with_context(|| format!("opening data dir {}", args.data_dir.display()))?;
	let store = Store::from_backend(Arc::new(file_store));
	let registry = JobRegistry::with_warmup(config.warmup);

	if let Some(name) = args.once.as_deref() {
		return run_once(&registry, &store, &config, name).await;
	}

	if !initialize_jobs(&registry, &store, &config) {
		tracing::info!("Nothing scheduled; use --once <job> or --jobs-enabled true");
		return Ok(ExitCode::SUCCESS);
	}

	tracing::info!(data_dir = %args.data_dir.display(), "catalog-analytics running");
	tokio::signal::ctrl_c()
		.await
		.context("waiting for shutdown signal")?;

	tracing::info!("Shutdown requested");
	registry.stop_jobs();
	registry.wait_idle().await;
	tracing::info!("All jobs idle, exiting");
	Ok(ExitCode::SUCCESS)
}

async fn run_once(
	registry: &JobRegistry,
	store: &Store,
	config: &AnalyticsConfig,
	name: &str,
) -> Result<ExitCode> {
	let Some(descriptor) = job_descriptors(store, config)
		.into_iter()
		.find(|d| d.name == name)
	else {
		return Err(AnalyticsError::UnknownJob(name.to_string()))
			.context("expected item-stats or related-items");
	};

	match registry.run_job(&descriptor.name, descriptor.handler).await {
		RunOutcome::Completed(report) => {
			println!("{}", serde_json::to_string(&report)?);
			Ok(ExitCode::SUCCESS)
		}
		outcome => {
			tracing::error!(job = %name, outcome = ?outcome, "Job did not complete");
			Ok(ExitCode::FAILURE)
		}
	}
}
