//! GitHub webhook normalizer
//!
//! Handles `push`, `pull_request` (merged only) and `deployment_status`
//! deliveries. Everything else, including `ping`, yields no events.

use crate::error::Result;
use crate::ingest::normalizer::{
    deployment_status, push_commits, required_str, required_timestamp, required_u64, str_at,
    WebhookNormalizer,
};
use crate::types::{Event, EventDetails, Source};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Normalizer for GitHub webhook deliveries.
#[derive(Debug, Default)]
pub struct GitHubNormalizer;

impl GitHubNormalizer {
    pub fn new() -> Self {
        Self
    }

    fn merged_pull_request(&self, payload: &Value) -> Result<Vec<Event>> {
        let action = str_at(payload, "/action");
        let merged = payload
            .pointer("/pull_request/merged")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if action != Some("closed") || !merged {
            return Ok(Vec::new());
        }

        let service = required_str(payload, "/repository/full_name")?;
        let number = required_u64(payload, "/pull_request/number")?;
        let author = str_at(payload, "/pull_request/user/email")
            .or_else(|| str_at(payload, "/pull_request/user/login"))
            .map(str::to_string);

        let event = Event::new(
            Source::Github,
            service,
            required_timestamp(payload, "/pull_request/merged_at")?,
            EventDetails::PrMerged {
                number,
                merge_commit_sha: str_at(payload, "/pull_request/merge_commit_sha")
                    .map(str::to_string),
            },
        )
        .with_author(author)
        .with_raw_data(payload.clone());

        Ok(vec![event])
    }

    fn deployment(&self, payload: &Value) -> Result<Vec<Event>> {
        let service = required_str(payload, "/repository/full_name")?;
        let environment = required_str(payload, "/deployment/environment")?;

        let event = Event::new(
            Source::Github,
            service,
            required_timestamp(payload, "/deployment_status/created_at")?,
            EventDetails::Deployment {
                environment: environment.to_string(),
                status: deployment_status(str_at(payload, "/deployment_status/state"), "failure"),
                sha: str_at(payload, "/deployment/sha").map(str::to_string),
            },
        )
        .with_raw_data(payload.clone());

        Ok(vec![event])
    }
}

impl WebhookNormalizer for GitHubNormalizer {
    fn source(&self) -> Source {
        Source::Github
    }

    fn normalize(
        &self,
        event_type: &str,
        payload: &Value,
        _received_at: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        match event_type {
            "push" => {
                let service = required_str(payload, "/repository/full_name")?;
                push_commits(Source::Github, service, payload)
            }
            "pull_request" => self.merged_pull_request(payload),
            "deployment_status" => self.deployment(payload),
            other => {
                tracing::debug!(event_type = other, "Ignored GitHub webhook event");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeploymentStatus, EventKind};
    use chrono::TimeZone;
    use serde_json::json;

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 15, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_push_yields_one_commit_per_entry() {
        let payload = json!({
            "repository": {"full_name": "acme/api"},
            "commits": [
                {"id": "aaa111", "timestamp": "2026-10-14T10:00:00+02:00",
                 "author": {"email": "dev@acme.io"}},
                {"id": "bbb222", "timestamp": "2026-10-14T11:00:00Z",
                 "author": {"name": "no email"}}
            ]
        });

        let events = GitHubNormalizer::new()
            .normalize("push", &payload, received())
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].service, "acme/api");
        assert_eq!(events[0].details.commit_sha(), Some("aaa111"));
        assert_eq!(
            events[0].timestamp,
            Utc.with_ymd_and_hms(2026, 10, 14, 8, 0, 0).unwrap()
        );
        assert_eq!(events[0].author.as_deref(), Some("dev@acme.io"));
        assert!(events[1].author.is_none());
        assert_eq!(events[0].raw_data["id"], "aaa111");
    }

    #[test]
    fn test_merged_pull_request() {
        let payload = json!({
            "action": "closed",
            "repository": {"full_name": "acme/api"},
            "pull_request": {
                "number": 42,
                "merged": true,
                "merged_at": "2026-10-14T12:00:00Z",
                "merge_commit_sha": "ccc333",
                "user": {"login": "octocat"}
            }
        });

        let events = GitHubNormalizer::new()
            .normalize("pull_request", &payload, received())
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::PrMerged);
        assert_eq!(events[0].details.pr_number(), Some(42));
        assert_eq!(events[0].details.commit_sha(), Some("ccc333"));
        assert_eq!(events[0].author.as_deref(), Some("octocat"));
    }

    #[test]
    fn test_closed_unmerged_pull_request_is_ignored() {
        let payload = json!({
            "action": "closed",
            "repository": {"full_name": "acme/api"},
            "pull_request": {"number": 7, "merged": false}
        });

        let events = GitHubNormalizer::new()
            .normalize("pull_request", &payload, received())
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_deployment_status() {
        let payload = json!({
            "repository": {"full_name": "acme/api"},
            "deployment": {"environment": "production", "sha": "ddd444"},
            "deployment_status": {"state": "failure", "created_at": "2026-10-14T13:00:00Z"}
        });

        let events = GitHubNormalizer::new()
            .normalize("deployment_status", &payload, received())
            .unwrap();

        assert_eq!(events.len(), 1);
        match &events[0].details {
            EventDetails::Deployment {
                environment,
                status,
                sha,
            } => {
                assert_eq!(environment, "production");
                assert_eq!(*status, DeploymentStatus::Failure);
                assert_eq!(sha.as_deref(), Some("ddd444"));
            }
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[test]
    fn test_ping_and_unknown_events_yield_nothing() {
        let normalizer = GitHubNormalizer::new();
        assert!(normalizer
            .normalize("ping", &json!({"zen": "hi"}), received())
            .unwrap()
            .is_empty());
        assert!(normalizer
            .normalize("issues", &json!({}), received())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_push_without_repository_is_payload_error() {
        let payload = json!({"commits": []});
        assert!(GitHubNormalizer::new()
            .normalize("push", &payload, received())
            .is_err());
    }
}
