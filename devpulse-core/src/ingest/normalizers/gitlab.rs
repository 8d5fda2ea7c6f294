//! GitLab webhook normalizer
//!
//! Handles push, merge request (merged only) and deployment hooks.

use crate::error::Result;
use crate::ingest::normalizer::{
    deployment_status, first_timestamp, push_commits, required_u64, str_at, WebhookNormalizer,
};
use crate::types::{Event, EventDetails, Source};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Normalizer for GitLab webhook deliveries.
#[derive(Debug, Default)]
pub struct GitLabNormalizer;

impl GitLabNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Project identifier: namespace path, then bare name, then `unknown`.
    fn service(payload: &Value) -> &str {
        str_at(payload, "/project/path_with_namespace")
            .or_else(|| str_at(payload, "/project/name"))
            .unwrap_or("unknown")
    }

    fn merge_request(&self, payload: &Value, received_at: DateTime<Utc>) -> Result<Vec<Event>> {
        if str_at(payload, "/object_attributes/state") != Some("merged") {
            return Ok(Vec::new());
        }

        let timestamp = first_timestamp(
            payload,
            &["/object_attributes/merged_at", "/object_attributes/updated_at"],
        )?
        .unwrap_or(received_at);
        let author = str_at(payload, "/user/email")
            .or_else(|| str_at(payload, "/user/username"))
            .map(str::to_string);

        let event = Event::new(
            Source::Gitlab,
            Self::service(payload),
            timestamp,
            EventDetails::PrMerged {
                number: required_u64(payload, "/object_attributes/iid")?,
                merge_commit_sha: str_at(payload, "/object_attributes/merge_commit_sha")
                    .map(str::to_string),
            },
        )
        .with_author(author)
        .with_raw_data(payload.clone());

        Ok(vec![event])
    }

    fn deployment(&self, payload: &Value, received_at: DateTime<Utc>) -> Result<Event> {
        let sha = str_at(payload, "/sha")
            .or_else(|| str_at(payload, "/commit/id"))
            .map(str::to_string);
        let author = str_at(payload, "/user/email")
            .or_else(|| str_at(payload, "/user/username"))
            .map(str::to_string);

        let timestamp = first_timestamp(payload, &["/status_changed_at", "/created_at"])?
            .unwrap_or(received_at);

        Ok(Event::new(
            Source::Gitlab,
            Self::service(payload),
            timestamp,
            EventDetails::Deployment {
                environment: str_at(payload, "/environment")
                    .unwrap_or("production")
                    .to_string(),
                status: deployment_status(str_at(payload, "/status"), "failed"),
                sha,
            },
        )
        .with_author(author)
        .with_raw_data(payload.clone()))
    }
}

impl WebhookNormalizer for GitLabNormalizer {
    fn source(&self) -> Source {
        Source::Gitlab
    }

    fn normalize(
        &self,
        event_type: &str,
        payload: &Value,
        received_at: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let object_kind = str_at(payload, "/object_kind");

        match event_type {
            "Push Hook" | "push" => push_commits(Source::Gitlab, Self::service(payload), payload),
            "Merge Request Hook" => self.merge_request(payload, received_at),
            "Deployment Hook" => Ok(vec![self.deployment(payload, received_at)?]),
            _ if object_kind == Some("deployment") => {
                Ok(vec![self.deployment(payload, received_at)?])
            }
            other => {
                tracing::debug!(event_type = other, "Ignored GitLab webhook event");
                Ok(Vec::new())
            }
        }
    }
}
