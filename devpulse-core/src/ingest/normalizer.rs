//! Webhook normalizer trait abstraction
//!
//! Every source platform implements [`WebhookNormalizer`] to turn one
//! inbound delivery into zero or more canonical [`Event`]s.
//!
//! ## Design Principles
//!
//! 1. **Lossless capture**: every event keeps the payload fragment it came from in `raw_data`
//! 2. **Pure**: normalizers never touch the store; the pipeline owns dedup and writes
//! 3. **Quiet on unknown types**: unsupported event types yield no events, not errors

use crate::error::{Error, Result};
use crate::format::parse_timestamp;
use crate::types::{DeploymentStatus, Event, Source};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Trait implemented by all webhook normalizers.
///
/// ## Example
///
/// ```rust,ignore
/// use devpulse_core::ingest::WebhookNormalizer;
///
/// struct BitbucketNormalizer;
///
/// impl WebhookNormalizer for BitbucketNormalizer {
///     fn source(&self) -> Source { Source::Manual }
///     fn normalize(&self, event_type: &str, payload: &Value, received_at: DateTime<Utc>)
///         -> Result<Vec<Event>> { Ok(vec![]) }
/// }
/// ```
pub trait WebhookNormalizer: Send + Sync {
    /// Which source this normalizer handles
    fn source(&self) -> Source;

    /// Convert one delivery into events.
    ///
    /// `event_type` is the platform's event header (`X-GitHub-Event`,
    /// `X-Gitlab-Event`). `received_at` is used where the payload carries
    /// no occurrence time.
    fn normalize(
        &self,
        event_type: &str,
        payload: &Value,
        received_at: DateTime<Utc>,
    ) -> Result<Vec<Event>>;
}

/// Non-empty string at a JSON pointer.
pub(crate) fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Non-empty string at a JSON pointer, or a payload error naming the field.
pub(crate) fn required_str<'a>(value: &'a Value, pointer: &str) -> Result<&'a str> {
    str_at(value, pointer).ok_or_else(|| Error::Payload(format!("missing field {}", pointer)))
}

/// Request number at a JSON pointer; numeric strings are accepted.
///
/// Numbers that do not fit the store's signed 64-bit column are rejected.
pub(crate) fn u64_at(value: &Value, pointer: &str) -> Option<u64> {
    let number = match value.pointer(pointer)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    number.filter(|n| i64::try_from(*n).is_ok())
}

pub(crate) fn required_u64(value: &Value, pointer: &str) -> Result<u64> {
    u64_at(value, pointer)
        .ok_or_else(|| Error::Payload(format!("missing or invalid number {}", pointer)))
}

/// Timestamp at a JSON pointer.
///
/// An absent, null or empty field is `Ok(None)`; a present field that does
/// not parse is a payload error.
pub(crate) fn timestamp_at(value: &Value, pointer: &str) -> Result<Option<DateTime<Utc>>> {
    let invalid = || Error::Payload(format!("invalid timestamp {}", pointer));
    match value.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => parse_timestamp(s).map(Some).ok_or_else(invalid),
        Some(_) => Err(invalid()),
    }
}

/// First present timestamp among `pointers`, checked in order.
pub(crate) fn first_timestamp(
    value: &Value,
    pointers: &[&str],
) -> Result<Option<DateTime<Utc>>> {
    for pointer in pointers {
        if let Some(ts) = timestamp_at(value, pointer)? {
            return Ok(Some(ts));
        }
    }
    Ok(None)
}

pub(crate) fn required_timestamp(value: &Value, pointer: &str) -> Result<DateTime<Utc>> {
    timestamp_at(value, pointer)?
        .ok_or_else(|| Error::Payload(format!("missing timestamp {}", pointer)))
}

/// Map a platform deployment state to a status.
///
/// Only explicit success and failure states are classified; every other
/// terminal or intermediate state is recorded as a rollback.
pub(crate) fn deployment_status(state: Option<&str>, failure_state: &str) -> DeploymentStatus {
    match state {
        Some("success") => DeploymentStatus::Success,
        Some(s) if s == failure_state => DeploymentStatus::Failure,
        _ => DeploymentStatus::Rollback,
    }
}

/// One commit event per entry of a push payload's `commits` array.
pub(crate) fn push_commits(source: Source, service: &str, payload: &Value) -> Result<Vec<Event>> {
    let Some(commits) = payload.get("commits").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    commits
        .iter()
        .map(|commit| {
            let sha = required_str(commit, "/id")?;
            let timestamp = required_timestamp(commit, "/timestamp")?;
            Ok(Event::commit(source, service, sha, timestamp)
                .with_author(str_at(commit, "/author/email").map(str::to_string))
                .with_raw_data(commit.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_str_at_skips_empty() {
        let value = json!({"a": {"b": "x", "c": ""}});
        assert_eq!(str_at(&value, "/a/b"), Some("x"));
        assert_eq!(str_at(&value, "/a/c"), None);
        assert!(required_str(&value, "/a/missing").is_err());
    }

    #[test]
    fn test_u64_accepts_numeric_strings() {
        let value = json!({"n": 12, "s": "34", "bad": "x"});
        assert_eq!(u64_at(&value, "/n"), Some(12));
        assert_eq!(u64_at(&value, "/s"), Some(34));
        assert_eq!(u64_at(&value, "/bad"), None);
    }

    #[test]
    fn test_u64_rejects_numbers_beyond_signed_range() {
        let value = json!({
            "max": i64::MAX,
            "big": u64::MAX,
            "big_str": "18446744073709551615",
        });
        assert_eq!(u64_at(&value, "/max"), Some(i64::MAX as u64));
        assert_eq!(u64_at(&value, "/big"), None);
        assert!(matches!(
            required_u64(&value, "/big_str"),
            Err(Error::Payload(_))
        ));
    }

    #[test]
    fn test_timestamp_absent_versus_invalid() {
        let value = json!({
            "ok": "2026-10-14T10:00:00Z",
            "empty": "",
            "null": null,
            "bad": "2020-13-45 garbage",
            "number": 12,
        });
        assert!(timestamp_at(&value, "/ok").unwrap().is_some());
        assert!(timestamp_at(&value, "/missing").unwrap().is_none());
        assert!(timestamp_at(&value, "/empty").unwrap().is_none());
        assert!(timestamp_at(&value, "/null").unwrap().is_none());
        assert!(matches!(timestamp_at(&value, "/bad"), Err(Error::Payload(_))));
        assert!(matches!(timestamp_at(&value, "/number"), Err(Error::Payload(_))));
    }

    #[test]
    fn test_first_timestamp_stops_at_first_present_field() {
        let value = json!({"a": "2026-10-14T10:00:00Z", "b": "garbage"});
        assert!(first_timestamp(&value, &["/missing", "/a", "/b"])
            .unwrap()
            .is_some());
        assert!(first_timestamp(&value, &["/b", "/a"]).is_err());
        assert!(first_timestamp(&value, &["/missing"]).unwrap().is_none());
    }

    #[test]
    fn test_deployment_status_mapping() {
        assert_eq!(
            deployment_status(Some("success"), "failure"),
            DeploymentStatus::Success
        );
        assert_eq!(
            deployment_status(Some("failed"), "failed"),
            DeploymentStatus::Failure
        );
        assert_eq!(
            deployment_status(Some("failure"), "failed"),
            DeploymentStatus::Rollback
        );
        assert_eq!(deployment_status(None, "failure"), DeploymentStatus::Rollback);
    }

    #[test]
    fn test_push_commits_without_array_is_empty() {
        let events = push_commits(Source::Github, "org/repo", &json!({})).unwrap();
        assert!(events.is_empty());
    }
}
