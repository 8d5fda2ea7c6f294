//! # devpulse-core
//!
//! Core library for devpulse, a personal developer activity tracker.
//!
//! This library provides:
//! - Domain types for commits, merged requests and deployments
//! - An append-only SQLite event store
//! - An ingestion pipeline with per-type deduplication
//! - A polling scheduler for GitHub and GitLab
//! - Weekly metrics and activity breakdowns
//! - Configuration and logging infrastructure
//!
//! ## Architecture
//!
//! Events arrive on two channels and leave as aggregates:
//! - **Webhooks:** platform deliveries are normalized and handed to the [`Ingestor`]
//! - **Polling:** the [`PollScheduler`] fetches recent activity and hands it to the same [`Ingestor`]
//! - **Metrics:** read-only windows over the store, computed on demand
//!
//! ## Example
//!
//! ```rust,no_run
//! use devpulse_core::{compute_weekly_metrics, Config, Database};
//!
//! // Load configuration
//! let config = Config::load().expect("failed to load config");
//!
//! // Open database
//! let db = Database::open(&config.resolved_database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let metrics = compute_weekly_metrics(&db, chrono::Utc::now()).expect("metrics");
//! println!("{} commits this week", metrics.total_commits);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use ingest::{BatchResult, IngestOutcome, Ingestor};
pub use metrics::{compute_weekly_metrics, WeeklyMetrics};
pub use poll::{CycleOutcome, CycleReport, PollScheduler};
pub use types::*;

// Public modules
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod poll;
pub mod types;
