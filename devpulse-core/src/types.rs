//! Core domain types for devpulse
//!
//! These types represent the canonical activity log that normalizes
//! commits, merged requests and deployments from every source.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Source** | Where an event came from (GitHub, GitLab, or recorded manually) |
//! | **Service** | Opaque project identifier (`org/repo`, GitLab namespace path) used for grouping |
//! | **Event** | One immutable fact about developer activity |
//! | **Dedup key** | The field tuple that makes an event subtype at-most-once in the store |
//!
//! Events are append-only. A correction is a new event, never an update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================
// Source
// ============================================

/// Platform an event was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// github.com (or GitHub Enterprise)
    Github,
    /// gitlab.com (or self-managed GitLab)
    Gitlab,
    /// Recorded by hand or by a script
    Manual,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Github => "github",
            Source::Gitlab => "gitlab",
            Source::Manual => "manual",
        }
    }

    /// Human-friendly name for logs and CLI output.
    pub fn display_name(&self) -> &'static str {
        match self {
            Source::Github => "GitHub",
            Source::Gitlab => "GitLab",
            Source::Manual => "Manual",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Source::Github),
            "gitlab" => Ok(Source::Gitlab),
            "manual" => Ok(Source::Manual),
            _ => Err(format!("unknown source: {}", s)),
        }
    }
}

// ============================================
// Event kinds
// ============================================

/// Type of activity an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Commit,
    PrOpened,
    PrMerged,
    Deployment,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Commit => "commit",
            EventKind::PrOpened => "pr_opened",
            EventKind::PrMerged => "pr_merged",
            EventKind::Deployment => "deployment",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commit" => Ok(EventKind::Commit),
            "pr_opened" => Ok(EventKind::PrOpened),
            "pr_merged" => Ok(EventKind::PrMerged),
            "deployment" => Ok(EventKind::Deployment),
            _ => Err(format!("unknown event type: {}", s)),
        }
    }
}

/// Outcome of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Success,
    Failure,
    Rollback,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failure => "failure",
            DeploymentStatus::Rollback => "rollback",
        }
    }
}

impl std::str::FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(DeploymentStatus::Success),
            "failure" => Ok(DeploymentStatus::Failure),
            "rollback" => Ok(DeploymentStatus::Rollback),
            _ => Err(format!("unknown deployment status: {}", s)),
        }
    }
}

// ============================================
// Event
// ============================================

/// Type-specific payload of an [`Event`].
///
/// Each variant carries only the fields that exist for that kind of
/// activity, so a commit can never carry a deployment environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventDetails {
    /// A commit authored on some branch
    Commit { sha: String },
    /// A pull/merge request was opened (stored, not aggregated)
    PrOpened {
        number: u64,
        head_sha: Option<String>,
    },
    /// A pull/merge request was merged
    PrMerged {
        number: u64,
        merge_commit_sha: Option<String>,
    },
    /// A deployment finished in some environment
    Deployment {
        environment: String,
        status: DeploymentStatus,
        sha: Option<String>,
    },
}

impl EventDetails {
    pub fn kind(&self) -> EventKind {
        match self {
            EventDetails::Commit { .. } => EventKind::Commit,
            EventDetails::PrOpened { .. } => EventKind::PrOpened,
            EventDetails::PrMerged { .. } => EventKind::PrMerged,
            EventDetails::Deployment { .. } => EventKind::Deployment,
        }
    }

    /// Commit SHA associated with this event, if any.
    pub fn commit_sha(&self) -> Option<&str> {
        match self {
            EventDetails::Commit { sha } => Some(sha),
            EventDetails::PrOpened { head_sha, .. } => head_sha.as_deref(),
            EventDetails::PrMerged {
                merge_commit_sha, ..
            } => merge_commit_sha.as_deref(),
            EventDetails::Deployment { sha, .. } => sha.as_deref(),
        }
    }

    /// Pull/merge request number, for request events.
    pub fn pr_number(&self) -> Option<u64> {
        match self {
            EventDetails::PrOpened { number, .. } | EventDetails::PrMerged { number, .. } => {
                Some(*number)
            }
            _ => None,
        }
    }
}

/// One immutable fact about developer activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Where the event was observed
    pub source: Source,
    /// Project identifier used for grouping
    pub service: String,
    /// When the activity actually happened (author/merge/deploy time)
    pub timestamp: DateTime<Utc>,
    /// Email or username, as reported by the source
    pub author: Option<String>,
    /// Type-specific fields
    #[serde(flatten)]
    pub details: EventDetails,
    /// Original payload, kept for audit/debugging only
    #[serde(default)]
    pub raw_data: serde_json::Value,
}

impl Event {
    pub fn new(
        source: Source,
        service: impl Into<String>,
        timestamp: DateTime<Utc>,
        details: EventDetails,
    ) -> Self {
        Self {
            source,
            service: service.into(),
            timestamp,
            author: None,
            details,
            raw_data: serde_json::Value::Null,
        }
    }

    /// A commit event.
    pub fn commit(
        source: Source,
        service: impl Into<String>,
        sha: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            source,
            service,
            timestamp,
            EventDetails::Commit { sha: sha.into() },
        )
    }

    /// A merged pull/merge request event.
    pub fn pr_merged(
        source: Source,
        service: impl Into<String>,
        number: u64,
        merge_commit_sha: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            source,
            service,
            timestamp,
            EventDetails::PrMerged {
                number,
                merge_commit_sha,
            },
        )
    }

    /// A finished deployment event.
    pub fn deployment(
        source: Source,
        service: impl Into<String>,
        environment: impl Into<String>,
        status: DeploymentStatus,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            source,
            service,
            timestamp,
            EventDetails::Deployment {
                environment: environment.into(),
                status,
                sha: None,
            },
        )
    }

    /// Set the author. Empty strings are treated as unknown.
    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author.filter(|a| !a.trim().is_empty());
        self
    }

    pub fn with_raw_data(mut self, raw_data: serde_json::Value) -> Self {
        self.raw_data = raw_data;
        self
    }

    pub fn kind(&self) -> EventKind {
        self.details.kind()
    }

    /// Short description for logs and error messages.
    pub fn describe(&self) -> String {
        match &self.details {
            EventDetails::Commit { sha } => {
                let short: String = sha.chars().take(8).collect();
                format!("commit {} in {} ({})", short, self.service, self.source.as_str())
            }
            EventDetails::PrOpened { number, .. } => {
                format!("opened #{} in {} ({})", number, self.service, self.source.as_str())
            }
            EventDetails::PrMerged { number, .. } => {
                format!("merged #{} in {} ({})", number, self.service, self.source.as_str())
            }
            EventDetails::Deployment { environment, .. } => format!(
                "deployment to {} in {} ({})",
                environment,
                self.service,
                self.source.as_str()
            ),
        }
    }
}

/// An event as persisted, with its storage metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredEvent {
    /// Row id, monotonic per insert
    pub id: i64,
    /// When the store recorded the event
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

// ============================================
// Dedup keys
// ============================================

/// Identity of an event for at-most-once storage.
///
/// The store answers existence queries for these keys; which key (if any)
/// applies to which event kind is decided by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    /// `(commit_sha, source)` among commit events
    Commit { sha: String, source: Source },
    /// `(pr_number, service, source)` among merged-request events
    Merge {
        number: u64,
        service: String,
        source: Source,
    },
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupKey::Commit { sha, source } => write!(f, "commit:{}:{}", source.as_str(), sha),
            DedupKey::Merge {
                number,
                service,
                source,
            } => write!(f, "merge:{}:{}#{}", source.as_str(), service, number),
        }
    }
}
