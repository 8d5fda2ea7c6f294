//! Ingestion pipeline: the single choke point for stored events
//!
//! Both channels that produce events flow through [`Ingestor`]:
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │ Webhook delivery │ ──► │ WebhookNormalizer│ ─┐
//! └──────────────────┘     └──────────────────┘  │    ┌──────────┐     ┌──────────┐
//!                                                ├──► │ Ingestor │ ──► │ Database │
//! ┌──────────────────┐                           │    └──────────┘     └──────────┘
//! │  Poll scheduler  │ ──────────────────────────┘     (dedup gate)
//! └──────────────────┘
//! ```
//!
//! ## Dedup gate
//!
//! | Event type | Key |
//! |------------|-----|
//! | `commit` | `(commit_sha, source)` |
//! | `pr_merged` | `(pr_number, service, source)` |
//! | everything else | none, always inserted |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use devpulse_core::{Database, Config};
//! use devpulse_core::ingest::Ingestor;
//!
//! let db = Arc::new(Database::open(&Config::database_path())?);
//! let ingestor = Ingestor::new(db);
//!
//! let result = ingestor.ingest_delivery(Source::Github, "push", &payload)?;
//! println!("{} inserted, {} duplicates", result.inserted, result.skipped);
//! ```

mod normalizer;
pub mod normalizers;

pub use normalizer::WebhookNormalizer;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::{DedupKey, Event, EventDetails, Source};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

/// What happened to one event offered to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Stored with this row id
    Inserted { id: i64 },
    /// An event with the same dedup key already exists
    SkippedDuplicate,
}

/// Result of ingesting several events.
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Number of events stored
    pub inserted: usize,
    /// Number of events dropped as duplicates
    pub skipped: usize,
    /// Per-event failures; the remaining events were still attempted
    pub errors: Vec<Error>,
}

impl BatchResult {
    /// Whether every event was stored or skipped.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn record(&mut self, outcome: Result<IngestOutcome>) {
        match outcome {
            Ok(IngestOutcome::Inserted { .. }) => self.inserted += 1,
            Ok(IngestOutcome::SkippedDuplicate) => self.skipped += 1,
            Err(e) => self.errors.push(e),
        }
    }
}

/// The dedup key that gates `event`, if its type has one.
pub fn dedup_key(event: &Event) -> Option<DedupKey> {
    match &event.details {
        EventDetails::Commit { sha } => Some(DedupKey::Commit {
            sha: sha.clone(),
            source: event.source,
        }),
        EventDetails::PrMerged { number, .. } => Some(DedupKey::Merge {
            number: *number,
            service: event.service.clone(),
            source: event.source,
        }),
        EventDetails::PrOpened { .. } | EventDetails::Deployment { .. } => None,
    }
}

/// Applies the dedup gate and writes events to the store.
///
/// Cheap to share: the database handle is reference counted and the
/// normalizers are stateless.
pub struct Ingestor {
    db: Arc<Database>,
    normalizers: Vec<Box<dyn WebhookNormalizer>>,
}

impl Ingestor {
    /// Create an ingestor with the default normalizers.
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            normalizers: normalizers::create_all_normalizers(),
        }
    }

    /// Create an ingestor with custom normalizers.
    pub fn with_normalizers(db: Arc<Database>, normalizers: Vec<Box<dyn WebhookNormalizer>>) -> Self {
        Self { db, normalizers }
    }

    /// The underlying store.
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Offer one event to the store.
    pub fn ingest(&self, event: &Event) -> Result<IngestOutcome> {
        let stored = match dedup_key(event) {
            Some(key) => self.db.insert_unless_exists(event, &key),
            None => self.db.insert_event(event).map(Some),
        };

        match stored {
            Ok(Some(id)) => {
                tracing::debug!(id, event = %event.describe(), "Stored event");
                Ok(IngestOutcome::Inserted { id })
            }
            Ok(None) => {
                tracing::debug!(event = %event.describe(), "Skipped duplicate event");
                Ok(IngestOutcome::SkippedDuplicate)
            }
            Err(e) => Err(Error::Ingestion {
                event: event.describe(),
                source: Box::new(e),
            }),
        }
    }

    /// Offer every event independently and collect the outcomes.
    pub fn ingest_batch(&self, events: &[Event]) -> BatchResult {
        let mut result = BatchResult::default();

        for event in events {
            let outcome = self.ingest(event);
            if let Err(e) = &outcome {
                tracing::warn!(error = %e, "Failed to ingest event");
            }
            result.record(outcome);
        }

        result
    }

    /// Normalize one webhook delivery and ingest the resulting events.
    ///
    /// A payload that cannot be normalized fails the whole delivery. Once
    /// normalized, per-event failures are collected in the result.
    pub fn ingest_delivery(
        &self,
        source: Source,
        event_type: &str,
        payload: &Value,
    ) -> Result<BatchResult> {
        let normalizer = self
            .normalizers
            .iter()
            .find(|n| n.source() == source)
            .ok_or_else(|| Error::Payload(format!("no normalizer registered for {}", source)))?;

        let events = normalizer.normalize(event_type, payload, Utc::now())?;
        let result = self.ingest_batch(&events);

        tracing::info!(
            source = source.as_str(),
            event_type,
            inserted = result.inserted,
            skipped = result.skipped,
            errors = result.errors.len(),
            "Ingested webhook delivery"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeploymentStatus, EventKind};
    use chrono::{DateTime, Duration, TimeZone};
    use serde_json::json;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap()
    }

    fn ingestor() -> Ingestor {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        Ingestor::new(Arc::new(db))
    }

    fn window_count(ingestor: &Ingestor, kind: EventKind) -> usize {
        ingestor
            .database()
            .query_window(kind, ts() - Duration::days(30), ts() + Duration::days(1))
            .unwrap()
            .len()
    }

    #[test]
    fn test_commit_is_idempotent() {
        let ingestor = ingestor();
        let event = Event::commit(Source::Github, "acme/api", "abc123", ts());

        assert!(matches!(
            ingestor.ingest(&event).unwrap(),
            IngestOutcome::Inserted { .. }
        ));
        assert_eq!(
            ingestor.ingest(&event).unwrap(),
            IngestOutcome::SkippedDuplicate
        );
        assert_eq!(window_count(&ingestor, EventKind::Commit), 1);
    }

    #[test]
    fn test_same_sha_from_other_source_is_distinct() {
        let ingestor = ingestor();
        ingestor
            .ingest(&Event::commit(Source::Github, "acme/api", "abc123", ts()))
            .unwrap();
        let outcome = ingestor
            .ingest(&Event::commit(Source::Gitlab, "acme/api", "abc123", ts()))
            .unwrap();

        assert!(matches!(outcome, IngestOutcome::Inserted { .. }));
        assert_eq!(window_count(&ingestor, EventKind::Commit), 2);
    }

    #[test]
    fn test_merge_is_idempotent_per_service() {
        let ingestor = ingestor();
        let merged = Event::pr_merged(Source::Github, "acme/api", 42, None, ts());

        ingestor.ingest(&merged).unwrap();
        assert_eq!(
            ingestor.ingest(&merged).unwrap(),
            IngestOutcome::SkippedDuplicate
        );

        let other_repo = Event::pr_merged(Source::Github, "acme/web", 42, None, ts());
        assert!(matches!(
            ingestor.ingest(&other_repo).unwrap(),
            IngestOutcome::Inserted { .. }
        ));
        assert_eq!(window_count(&ingestor, EventKind::PrMerged), 2);
    }

    #[test]
    fn test_deployments_are_never_deduplicated() {
        let ingestor = ingestor();
        let deploy = Event::deployment(
            Source::Manual,
            "acme/api",
            "production",
            DeploymentStatus::Success,
            ts(),
        );

        ingestor.ingest(&deploy).unwrap();
        ingestor.ingest(&deploy).unwrap();
        assert_eq!(window_count(&ingestor, EventKind::Deployment), 2);
    }

    #[test]
    fn test_batch_counts_inserts_and_duplicates() {
        let ingestor = ingestor();
        let events = vec![
            Event::commit(Source::Github, "acme/api", "a", ts()),
            Event::commit(Source::Github, "acme/api", "b", ts()),
            Event::commit(Source::Github, "acme/api", "a", ts()),
        ];

        let result = ingestor.ingest_batch(&events);
        assert_eq!(result.inserted, 2);
        assert_eq!(result.skipped, 1);
        assert!(result.is_clean());
    }

    #[test]
    fn test_redelivered_webhook_stores_once() {
        let ingestor = ingestor();
        let payload = json!({
            "repository": {"full_name": "acme/api"},
            "commits": [
                {"id": "c1", "timestamp": "2026-10-14T10:00:00Z"},
                {"id": "c2", "timestamp": "2026-10-14T11:00:00Z"}
            ]
        });

        let first = ingestor
            .ingest_delivery(Source::Github, "push", &payload)
            .unwrap();
        let second = ingestor
            .ingest_delivery(Source::Github, "push", &payload)
            .unwrap();

        assert_eq!((first.inserted, first.skipped), (2, 0));
        assert_eq!((second.inserted, second.skipped), (0, 2));
    }

    #[test]
    fn test_malformed_delivery_fails_whole_request() {
        let ingestor = ingestor();
        let payload = json!({
            "repository": {"full_name": "acme/api"},
            "commits": [
                {"id": "c1", "timestamp": "2026-10-14T10:00:00Z"},
                {"timestamp": "2026-10-14T11:00:00Z"}
            ]
        });

        let err = ingestor
            .ingest_delivery(Source::Github, "push", &payload)
            .unwrap_err();
        assert!(matches!(err, Error::Payload(_)));
        assert_eq!(window_count(&ingestor, EventKind::Commit), 0);
    }

    #[test]
    fn test_oversized_request_number_never_reaches_the_store() {
        let ingestor = ingestor();
        let payload = json!({
            "type": "pr_merged",
            "service": "acme/api",
            "pr_number": "18446744073709551615",
            "timestamp": "2026-10-14T10:00:00Z"
        });

        let err = ingestor
            .ingest_delivery(Source::Manual, "pr_merged", &payload)
            .unwrap_err();
        assert!(matches!(err, Error::Payload(_)));

        // Events built directly are refused by the store
        let err = ingestor
            .ingest(&Event::pr_merged(Source::Github, "acme/api", u64::MAX, None, ts()))
            .unwrap_err();
        assert!(matches!(err, Error::Ingestion { .. }));

        ingestor
            .ingest(&Event::pr_merged(Source::Github, "acme/api", 7, None, ts()))
            .unwrap();
        assert_eq!(window_count(&ingestor, EventKind::PrMerged), 1);
    }

    #[test]
    fn test_unparseable_timestamp_fails_delivery() {
        let ingestor = ingestor();
        let payload = json!({
            "type": "deployment",
            "service": "acme/api",
            "timestamp": "2020-13-45 garbage"
        });

        let err = ingestor
            .ingest_delivery(Source::Manual, "deployment", &payload)
            .unwrap_err();
        assert!(matches!(err, Error::Payload(_)));
        assert_eq!(ingestor.database().event_count().unwrap(), 0);
    }

    #[test]
    fn test_missing_normalizer_is_payload_error() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let ingestor = Ingestor::with_normalizers(Arc::new(db), Vec::new());

        let err = ingestor
            .ingest_delivery(Source::Gitlab, "push", &json!({}))
            .unwrap_err();
        assert!(matches!(err, Error::Payload(_)));
    }

    #[test]
    fn test_store_failure_is_ingestion_error() {
        // Unmigrated database: the events table does not exist
        let db = Database::open_in_memory().unwrap();
        let ingestor = Ingestor::new(Arc::new(db));

        let err = ingestor
            .ingest(&Event::commit(Source::Github, "acme/api", "abc", ts()))
            .unwrap_err();
        match err {
            Error::Ingestion { event, .. } => assert!(event.contains("acme/api")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
