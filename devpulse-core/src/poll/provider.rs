//! Remote source provider abstraction
//!
//! A provider knows how to talk to one platform's REST API. The scan
//! procedure in [`scan_provider`] is shared: resolve the identity, list
//! projects, fetch that identity's recent activity per project and hand
//! every item to the ingestion pipeline.

use crate::error::{Error, Result};
use crate::ingest::Ingestor;
use crate::types::{Event, Source};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

/// The authenticated account a token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Login (GitHub) or username (GitLab)
    pub username: String,
    /// Public email, when the platform exposes one
    pub email: Option<String>,
}

impl Identity {
    /// Author value recorded when an item carries none of its own.
    pub fn author(&self) -> String {
        self.email.clone().unwrap_or_else(|| self.username.clone())
    }
}

/// A repository or project visible to the identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteProject {
    /// Platform id used in API paths (`org/repo` or numeric id)
    pub id: String,
    /// Human-readable path, stored as the event's service
    pub full_name: String,
}

/// One platform the scheduler can poll.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Which source this provider polls
    fn source(&self) -> Source;

    /// Whether a credential is available. Unconfigured providers are skipped.
    fn is_configured(&self) -> bool;

    /// Resolve the identity the credential belongs to.
    async fn current_user(&self) -> Result<Identity>;

    /// Enumerate projects accessible to the identity.
    async fn list_projects(&self) -> Result<Vec<RemoteProject>>;

    /// Commits in `project` authored by `author` since `since`.
    async fn fetch_commits(
        &self,
        project: &RemoteProject,
        author: &Identity,
        since: DateTime<Utc>,
    ) -> Result<Vec<Event>>;

    /// Requests in `project` authored by `author` and merged since `since`.
    async fn fetch_merged(
        &self,
        project: &RemoteProject,
        author: &Identity,
        since: DateTime<Utc>,
    ) -> Result<Vec<Event>>;
}

/// A project whose fetch failed during a scan.
#[derive(Debug, Clone)]
pub struct ProjectFailure {
    pub project: String,
    pub message: String,
}

/// What one provider scan did.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub source: Source,
    pub identity: String,
    pub projects_scanned: usize,
    pub inserted: usize,
    pub skipped: usize,
    /// Events the pipeline failed to store
    pub ingest_failures: usize,
    pub project_failures: Vec<ProjectFailure>,
}

impl ScanReport {
    fn new(source: Source, identity: &Identity) -> Self {
        Self {
            source,
            identity: identity.username.clone(),
            projects_scanned: 0,
            inserted: 0,
            skipped: 0,
            ingest_failures: 0,
            project_failures: Vec::new(),
        }
    }

    /// Ingest one project's events on the blocking pool; SQLite writes
    /// wait on the connection lock and the busy timeout.
    async fn record(&mut self, events: Vec<Event>, ingestor: &Arc<Ingestor>) {
        if events.is_empty() {
            return;
        }

        let count = events.len();
        let ingestor = Arc::clone(ingestor);
        match tokio::task::spawn_blocking(move || ingestor.ingest_batch(&events)).await {
            Ok(batch) => {
                self.inserted += batch.inserted;
                self.skipped += batch.skipped;
                self.ingest_failures += batch.errors.len();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to store polled events");
                self.ingest_failures += count;
            }
        }
    }
}

/// Decode every listed item, logging and dropping the ones that fail so the
/// rest of the project is still ingested. `decode` returns `None` for items
/// that decode but do not qualify.
pub(crate) fn decode_items(
    project: &RemoteProject,
    items: Vec<Value>,
    mut decode: impl FnMut(Value) -> Result<Option<Event>>,
) -> Vec<Event> {
    let mut events = Vec::with_capacity(items.len());
    for item in items {
        match decode(item) {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(project = %project.full_name, error = %e, "Skipping undecodable item");
            }
        }
    }
    events
}

/// Build the provider-level failure for `source`.
pub(crate) fn scan_error(source: Source, err: impl std::fmt::Display) -> Error {
    Error::ProviderScan {
        provider: source,
        message: err.to_string(),
    }
}

/// Scan one provider and ingest everything it returns.
///
/// Identity and enumeration failures abort the scan. A single project's
/// fetch failure is logged, recorded and the scan moves on.
pub async fn scan_provider(
    provider: &dyn SourceProvider,
    ingestor: &Arc<Ingestor>,
    since: DateTime<Utc>,
) -> Result<ScanReport> {
    let source = provider.source();

    let identity = provider
        .current_user()
        .await
        .map_err(|e| scan_error(source, format!("identity lookup failed: {}", e)))?;
    tracing::info!(
        source = source.as_str(),
        user = %identity.username,
        "Tracking contributions"
    );

    let projects = provider
        .list_projects()
        .await
        .map_err(|e| scan_error(source, format!("project listing failed: {}", e)))?;
    tracing::info!(
        source = source.as_str(),
        projects = projects.len(),
        "Found accessible projects"
    );

    let mut report = ScanReport::new(source, &identity);

    for project in &projects {
        report.projects_scanned += 1;

        match provider.fetch_commits(project, &identity, since).await {
            Ok(commits) => {
                if !commits.is_empty() {
                    tracing::debug!(
                        project = %project.full_name,
                        count = commits.len(),
                        "Fetched commits"
                    );
                }
                report.record(commits, ingestor).await;
            }
            Err(e) => {
                tracing::warn!(project = %project.full_name, error = %e, "Commit fetch failed");
                report.project_failures.push(ProjectFailure {
                    project: project.full_name.clone(),
                    message: e.to_string(),
                });
                continue;
            }
        }

        match provider.fetch_merged(project, &identity, since).await {
            Ok(merged) => report.record(merged, ingestor).await,
            Err(e) => {
                tracing::warn!(project = %project.full_name, error = %e, "Merged request fetch failed");
                report.project_failures.push(ProjectFailure {
                    project: project.full_name.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        source = source.as_str(),
        inserted = report.inserted,
        skipped = report.skipped,
        failed_projects = report.project_failures.len(),
        "Provider scan finished"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn project() -> RemoteProject {
        RemoteProject {
            id: "acme/api".to_string(),
            full_name: "acme/api".to_string(),
        }
    }

    #[test]
    fn test_decode_items_skips_bad_items() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap();
        let items = vec![
            json!({"sha": "a"}),
            json!({"nope": 1}),
            json!({"sha": "skip"}),
            json!({"sha": "b"}),
        ];

        let events = decode_items(&project(), items, |item| {
            let sha = item
                .get("sha")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::Payload("missing sha".to_string()))?;
            if sha == "skip" {
                return Ok(None);
            }
            Ok(Some(Event::commit(Source::Github, "acme/api", sha, ts)))
        });

        let shas: Vec<_> = events
            .iter()
            .filter_map(|e| e.details.commit_sha())
            .collect();
        assert_eq!(shas, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_record_counts_batch_outcomes() {
        let db = crate::db::Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let ingestor = Arc::new(Ingestor::new(Arc::new(db)));
        let ts = Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap();
        let identity = Identity {
            username: "dev".to_string(),
            email: None,
        };

        let mut report = ScanReport::new(Source::Github, &identity);
        let events = vec![
            Event::commit(Source::Github, "acme/api", "a", ts),
            Event::commit(Source::Github, "acme/api", "a", ts),
            Event::pr_merged(Source::Github, "acme/api", u64::MAX, None, ts),
        ];
        report.record(events, &ingestor).await;

        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.ingest_failures, 1);
    }
}
