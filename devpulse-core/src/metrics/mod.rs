//! Metrics over the event log
//!
//! Everything here is a read-only aggregation over half-open windows
//! `[start, end)` of the store. Bucketing by hour, day and week uses UTC.
//!
//! - [`weekly`]: the trailing-week summary consumed by reports
//! - [`activity`]: per-day, per-project, per-week and per-hour breakdowns
//! - [`report`]: markdown rendering of the weekly summary

pub mod activity;
mod report;
pub mod weekly;

pub use activity::{
    commit_frequency, hourly_pattern, project_activity, weekly_productivity, DailyCommits,
    HourlyShare, ProjectActivity, WeeklyProductivity,
};
pub use weekly::{
    compute_weekly_metrics, DeploymentStats, HourlyCommits, ProjectCommits, WeeklyMetrics,
};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::{EventKind, StoredEvent};
use chrono::{DateTime, Utc};

/// Events of `kind` in `[start, end)`, with failures reported as aggregation errors.
fn window(
    db: &Database,
    kind: EventKind,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<StoredEvent>> {
    db.query_window(kind, start, end).map_err(|e| {
        tracing::error!(kind = kind.as_str(), error = %e, "Metrics query failed");
        Error::aggregation(e)
    })
}

/// Every event of `kind`, with failures reported as aggregation errors.
fn all_of(db: &Database, kind: EventKind) -> Result<Vec<StoredEvent>> {
    db.query_kind(kind).map_err(|e| {
        tracing::error!(kind = kind.as_str(), error = %e, "Metrics query failed");
        Error::aggregation(e)
    })
}
