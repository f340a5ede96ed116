pub mod candidates;
pub mod config;
pub mod cooccurrence;
pub mod error;
pub mod jobs;
pub mod memory_store;
pub mod persistence;
pub mod relationships;
pub mod scheduler;
pub mod signal_index;
pub mod sources;
pub mod stats;
pub mod types;
