//! Trailing-week summary
//!
//! The summary covers `[now − 7d, now)` and compares it with the week
//! before, `[now − 14d, now − 7d)`.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;

use super::window;
use crate::db::Database;
use crate::error::Result;
use crate::types::{DeploymentStatus, EventDetails, EventKind, StoredEvent};

/// Number of services listed in [`WeeklyMetrics::top_projects`].
pub const TOP_PROJECTS: usize = 5;

/// Weekly activity summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyMetrics {
    pub total_commits: u64,
    /// Distinct services with at least one commit
    pub active_projects: u64,
    /// Distinct UTC dates with at least one commit
    pub active_days: u64,
    /// Distinct non-empty commit authors
    pub active_authors: u64,
    pub prs_merged: u64,
    /// Busiest services by commit count, ties in first-seen order
    pub top_projects: Vec<ProjectCommits>,
    /// Commits per UTC hour, non-zero hours only, ascending
    pub commit_patterns: Vec<HourlyCommits>,
    /// This week's commits minus last week's
    pub week_over_week_change: i64,
    /// Change as a rounded percentage of last week; 0 when last week had none
    pub week_over_week_percent: i64,
    /// Present only when the week had deployments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_stats: Option<DeploymentStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectCommits {
    pub service: String,
    pub commits: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HourlyCommits {
    pub hour: u32,
    pub commits: u64,
}

/// Deployment outcomes. Rollbacks count toward the total only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStats {
    pub deployments: u64,
    pub successful_deployments: u64,
    pub failed_deployments: u64,
}

/// Compute the weekly summary as of `now`.
///
/// Any failing query fails the whole computation.
pub fn compute_weekly_metrics(db: &Database, now: DateTime<Utc>) -> Result<WeeklyMetrics> {
    let week_start = now - Duration::days(7);
    let previous_start = now - Duration::days(14);

    let commits = window(db, EventKind::Commit, week_start, now)?;
    let previous = window(db, EventKind::Commit, previous_start, week_start)?;
    let merged = window(db, EventKind::PrMerged, week_start, now)?;
    let deployments = window(db, EventKind::Deployment, week_start, now)?;

    let total_commits = commits.len() as u64;
    let previous_commits = previous.len() as i64;
    let change = total_commits as i64 - previous_commits;

    let metrics = WeeklyMetrics {
        total_commits,
        active_projects: distinct(&commits, |e| Some(e.event.service.as_str())),
        active_days: commits
            .iter()
            .map(|e| e.event.timestamp.date_naive())
            .collect::<HashSet<_>>()
            .len() as u64,
        active_authors: distinct(&commits, |e| {
            e.event.author.as_deref().filter(|a| !a.is_empty())
        }),
        prs_merged: merged.len() as u64,
        top_projects: top_projects(&commits, TOP_PROJECTS),
        commit_patterns: commit_patterns(&commits),
        week_over_week_change: change,
        week_over_week_percent: percent_change(change, previous_commits),
        deployment_stats: deployment_stats(&deployments),
    };

    tracing::debug!(
        commits = metrics.total_commits,
        previous = previous_commits,
        prs_merged = metrics.prs_merged,
        "Computed weekly metrics"
    );

    Ok(metrics)
}

fn distinct<'a>(events: &'a [StoredEvent], key: impl Fn(&'a StoredEvent) -> Option<&'a str>) -> u64 {
    events.iter().filter_map(key).collect::<HashSet<_>>().len() as u64
}

/// Commit counts per service, highest first. The sort is stable, so equal
/// counts keep the order in which services first appear in `commits`.
fn top_projects(commits: &[StoredEvent], limit: usize) -> Vec<ProjectCommits> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<ProjectCommits> = Vec::new();

    for commit in commits {
        let service = commit.event.service.as_str();
        match positions.get(service) {
            Some(&i) => counts[i].commits += 1,
            None => {
                positions.insert(service, counts.len());
                counts.push(ProjectCommits {
                    service: service.to_string(),
                    commits: 1,
                });
            }
        }
    }

    counts.sort_by(|a, b| b.commits.cmp(&a.commits));
    counts.truncate(limit);
    counts
}

fn commit_patterns(commits: &[StoredEvent]) -> Vec<HourlyCommits> {
    let mut by_hour: BTreeMap<u32, u64> = BTreeMap::new();
    for commit in commits {
        *by_hour.entry(commit.event.timestamp.hour()).or_default() += 1;
    }

    by_hour
        .into_iter()
        .map(|(hour, commits)| HourlyCommits { hour, commits })
        .collect()
}

/// `round(change / previous × 100)` with halves rounded toward +∞.
fn percent_change(change: i64, previous: i64) -> i64 {
    if previous <= 0 {
        return 0;
    }
    // floor(x + 1/2) with x = 100·change/previous, in integers
    (2 * change * 100 + previous).div_euclid(2 * previous)
}

fn deployment_stats(deployments: &[StoredEvent]) -> Option<DeploymentStats> {
    if deployments.is_empty() {
        return None;
    }

    let status_count = |wanted: DeploymentStatus| {
        deployments
            .iter()
            .filter(|e| {
                matches!(
                    e.event.details,
                    EventDetails::Deployment { status, .. } if status == wanted
                )
            })
            .count() as u64
    };

    Some(DeploymentStats {
        deployments: deployments.len() as u64,
        successful_deployments: status_count(DeploymentStatus::Success),
        failed_deployments: status_count(DeploymentStatus::Failure),
    })
}
