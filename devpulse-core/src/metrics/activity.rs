//! Activity breakdowns: per day, per project, per ISO week and per hour

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::Serialize;

use super::{all_of, window};
use crate::db::Database;
use crate::error::Result;
use crate::types::EventKind;

/// Window used by [`project_activity`].
pub const PROJECT_ACTIVITY_DAYS: i64 = 30;

/// Commit activity on one UTC date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCommits {
    pub date: NaiveDate,
    pub commit_count: u64,
    pub projects_touched: u64,
    pub authors: u64,
}

/// Recent commit activity for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectActivity {
    pub service: String,
    pub commits_last_week: u64,
    pub commits_last_month: u64,
    pub days_active: u64,
    pub last_commit: DateTime<Utc>,
}

/// Commit activity in one ISO week.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyProductivity {
    /// ISO week label, e.g. `2026-W42`
    pub week: String,
    pub commit_count: u64,
    pub days_active: u64,
    pub projects_touched: u64,
    /// Commits per active day, one decimal
    pub avg_commits_per_day: f64,
}

/// Share of all recorded commits made in one UTC hour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyShare {
    pub hour: u32,
    pub commit_count: u64,
    /// Percent of all commits, one decimal
    pub percentage: f64,
}

#[derive(Default)]
struct Bucket<'a> {
    commits: u64,
    days: HashSet<NaiveDate>,
    services: HashSet<&'a str>,
    authors: HashSet<&'a str>,
}

/// Commits per UTC date over `[now − days, now)`, oldest date first.
///
/// Dates without commits are omitted.
pub fn commit_frequency(db: &Database, now: DateTime<Utc>, days: u32) -> Result<Vec<DailyCommits>> {
    let commits = window(db, EventKind::Commit, now - Duration::days(days.into()), now)?;

    let mut by_date: BTreeMap<NaiveDate, Bucket> = BTreeMap::new();
    for stored in &commits {
        let event = &stored.event;
        let bucket = by_date.entry(event.timestamp.date_naive()).or_default();
        bucket.commits += 1;
        bucket.services.insert(event.service.as_str());
        if let Some(author) = event.author.as_deref().filter(|a| !a.is_empty()) {
            bucket.authors.insert(author);
        }
    }

    Ok(by_date
        .into_iter()
        .map(|(date, bucket)| DailyCommits {
            date,
            commit_count: bucket.commits,
            projects_touched: bucket.services.len() as u64,
            authors: bucket.authors.len() as u64,
        })
        .collect())
}

/// Per-service commit activity over the last 30 days.
///
/// Busiest services first (by 30-day commits, then name), at most `limit`.
pub fn project_activity(
    db: &Database,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<ProjectActivity>> {
    let week_start = now - Duration::days(7);
    let commits = window(
        db,
        EventKind::Commit,
        now - Duration::days(PROJECT_ACTIVITY_DAYS),
        now,
    )?;

    let mut by_service: HashMap<&str, (ProjectActivity, HashSet<NaiveDate>)> = HashMap::new();
    for stored in &commits {
        let event = &stored.event;
        let (activity, days) = by_service
            .entry(event.service.as_str())
            .or_insert_with(|| {
                (
                    ProjectActivity {
                        service: event.service.clone(),
                        commits_last_week: 0,
                        commits_last_month: 0,
                        days_active: 0,
                        last_commit: event.timestamp,
                    },
                    HashSet::new(),
                )
            });

        activity.commits_last_month += 1;
        if event.timestamp >= week_start {
            activity.commits_last_week += 1;
        }
        activity.last_commit = activity.last_commit.max(event.timestamp);
        days.insert(event.timestamp.date_naive());
    }

    let mut projects: Vec<ProjectActivity> = by_service
        .into_values()
        .map(|(mut activity, days)| {
            activity.days_active = days.len() as u64;
            activity
        })
        .collect();

    projects.sort_by(|a, b| {
        b.commits_last_month
            .cmp(&a.commits_last_month)
            .then_with(|| a.service.cmp(&b.service))
    });
    projects.truncate(limit);
    Ok(projects)
}

/// Per-ISO-week commit activity over the last `weeks × 7` days, newest week first.
pub fn weekly_productivity(
    db: &Database,
    now: DateTime<Utc>,
    weeks: u32,
) -> Result<Vec<WeeklyProductivity>> {
    let start = now - Duration::days(i64::from(weeks) * 7);
    let commits = window(db, EventKind::Commit, start, now)?;

    let mut by_week: BTreeMap<(i32, u32), Bucket> = BTreeMap::new();
    for stored in &commits {
        let event = &stored.event;
        let iso = event.timestamp.iso_week();
        let bucket = by_week.entry((iso.year(), iso.week())).or_default();
        bucket.commits += 1;
        bucket.days.insert(event.timestamp.date_naive());
        bucket.services.insert(event.service.as_str());
    }

    Ok(by_week
        .into_iter()
        .rev()
        .map(|((year, week), bucket)| {
            let days_active = bucket.days.len() as u64;
            WeeklyProductivity {
                week: format!("{}-W{:02}", year, week),
                commit_count: bucket.commits,
                days_active,
                projects_touched: bucket.services.len() as u64,
                avg_commits_per_day: one_decimal(bucket.commits as f64 / days_active.max(1) as f64),
            }
        })
        .collect())
}

/// Commits per UTC hour across the whole log, ascending by hour.
///
/// Hours without commits are omitted.
pub fn hourly_pattern(db: &Database) -> Result<Vec<HourlyShare>> {
    let commits = all_of(db, EventKind::Commit)?;

    let mut by_hour: BTreeMap<u32, u64> = BTreeMap::new();
    for stored in &commits {
        *by_hour.entry(stored.event.timestamp.hour()).or_default() += 1;
    }

    let total = commits.len() as f64;
    Ok(by_hour
        .into_iter()
        .map(|(hour, commit_count)| HourlyShare {
            hour,
            commit_count,
            percentage: one_decimal(commit_count as f64 * 100.0 / total),
        })
        .collect())
}

fn one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
