//! Manual event normalizer
//!
//! Accepts hand-recorded events (a JSON object or an array of them), for
//! deployments reported by scripts or activity on unsupported platforms:
//!
//! ```json
//! {"type": "deployment", "service": "acme/api", "environment": "production",
//!  "status": "success", "timestamp": "2026-10-14T12:00:00Z"}
//! ```
//!
//! `type` may be omitted when the delivery's event type names it.

use crate::error::{Error, Result};
use crate::ingest::normalizer::{
    required_str, required_u64, str_at, timestamp_at, WebhookNormalizer,
};
use crate::types::{DeploymentStatus, Event, EventDetails, EventKind, Source};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Normalizer for manually reported events.
#[derive(Debug, Default)]
pub struct ManualNormalizer;

impl ManualNormalizer {
    pub fn new() -> Self {
        Self
    }

    fn event(&self, default_type: &str, item: &Value, received_at: DateTime<Utc>) -> Result<Event> {
        let kind_str = str_at(item, "/type").unwrap_or(default_type);
        let kind = kind_str.parse::<EventKind>().map_err(Error::Payload)?;
        let commit_sha = str_at(item, "/commit_sha").map(str::to_string);

        let details = match kind {
            EventKind::Commit => EventDetails::Commit {
                sha: required_str(item, "/commit_sha")?.to_string(),
            },
            EventKind::PrOpened => EventDetails::PrOpened {
                number: required_u64(item, "/pr_number")?,
                head_sha: commit_sha,
            },
            EventKind::PrMerged => EventDetails::PrMerged {
                number: required_u64(item, "/pr_number")?,
                merge_commit_sha: commit_sha,
            },
            EventKind::Deployment => EventDetails::Deployment {
                environment: str_at(item, "/environment")
                    .unwrap_or("production")
                    .to_string(),
                status: str_at(item, "/status")
                    .unwrap_or("success")
                    .parse::<DeploymentStatus>()
                    .map_err(Error::Payload)?,
                sha: commit_sha,
            },
        };

        Ok(Event::new(
            Source::Manual,
            required_str(item, "/service")?,
            timestamp_at(item, "/timestamp")?.unwrap_or(received_at),
            details,
        )
        .with_author(str_at(item, "/author").map(str::to_string))
        .with_raw_data(item.clone()))
    }
}

impl WebhookNormalizer for ManualNormalizer {
    fn source(&self) -> Source {
        Source::Manual
    }

    fn normalize(
        &self,
        event_type: &str,
        payload: &Value,
        received_at: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        match payload {
            Value::Array(items) => items
                .iter()
                .map(|item| self.event(event_type, item, received_at))
                .collect(),
            Value::Object(_) => Ok(vec![self.event(event_type, payload, received_at)?]),
            _ => Err(Error::Payload(
                "manual events must be a JSON object or array".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 15, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_deployment_with_defaults() {
        let events = ManualNormalizer::new()
            .normalize("deployment", &json!({"service": "acme/api"}), received())
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, Source::Manual);
        assert_eq!(events[0].timestamp, received());
        assert_eq!(
            events[0].details,
            EventDetails::Deployment {
                environment: "production".to_string(),
                status: DeploymentStatus::Success,
                sha: None,
            }
        );
    }

    #[test]
    fn test_array_of_mixed_events() {
        let payload = json!([
            {"type": "commit", "service": "acme/api", "commit_sha": "abc",
             "timestamp": "2026-10-14T08:00:00Z", "author": "dev"},
            {"type": "pr_merged", "service": "acme/api", "pr_number": "9"}
        ]);

        let events = ManualNormalizer::new()
            .normalize("", &payload, received())
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), EventKind::Commit);
        assert_eq!(events[0].author.as_deref(), Some("dev"));
        assert_eq!(events[1].details.pr_number(), Some(9));
    }

    #[test]
    fn test_invalid_manual_payloads() {
        let normalizer = ManualNormalizer::new();
        assert!(normalizer
            .normalize("commit", &json!({"service": "x"}), received())
            .is_err());
        assert!(normalizer
            .normalize("release", &json!({"service": "x"}), received())
            .is_err());
        assert!(normalizer
            .normalize("deployment", &json!("nope"), received())
            .is_err());
        assert!(normalizer
            .normalize(
                "deployment",
                &json!({"service": "x", "status": "exploded"}),
                received()
            )
            .is_err());
    }

    #[test]
    fn test_unparseable_timestamp_is_rejected() {
        let result = ManualNormalizer::new().normalize(
            "deployment",
            &json!({"service": "acme/api", "timestamp": "2020-13-45 garbage"}),
            received(),
        );
        assert!(matches!(result, Err(Error::Payload(_))));
    }

    #[test]
    fn test_request_number_beyond_signed_range_is_rejected() {
        let result = ManualNormalizer::new().normalize(
            "pr_merged",
            &json!({"service": "acme/api", "pr_number": "18446744073709551615"}),
            received(),
        );
        assert!(matches!(result, Err(Error::Payload(_))));
    }
}
