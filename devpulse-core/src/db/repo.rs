//! Database repository layer
//!
//! The event store is a plain fact table: it inserts, answers existence
//! queries for dedup keys, and reads time windows. Which key applies to
//! which event kind is the ingestion pipeline's business.

use crate::error::{Error, Result};
use crate::format::{parse_timestamp, storage_timestamp};
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SELECT_EVENT_COLUMNS: &str = "SELECT id, source, type, service, environment, commit_sha, \
     pr_number, status, timestamp, author, created_at, raw_data FROM events";

/// Database handle (single connection, writers serialized by the mutex)
pub struct Database {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL lets metric reads proceed while a poll cycle is writing
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        super::schema::run_migrations(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::StorageLock)
    }

    // ============================================
    // Writes
    // ============================================

    /// Append one event to the log and return its row id.
    ///
    /// Does not check for duplicates.
    pub fn insert_event(&self, event: &Event) -> Result<i64> {
        let conn = self.lock()?;
        insert_with(&conn, event)
    }

    /// Insert `event` unless an event with `key` is already stored.
    ///
    /// The lookup and the insert run in one `BEGIN IMMEDIATE` transaction
    /// under the connection lock, so two channels delivering the same event
    /// at the same moment still produce one row. Returns the new row id, or
    /// `None` when the key already existed.
    pub fn insert_unless_exists(&self, event: &Event, key: &DedupKey) -> Result<Option<i64>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if exists_with(&tx, key)? {
            return Ok(None);
        }

        let id = insert_with(&tx, event)?;
        tx.commit()?;
        Ok(Some(id))
    }

    // ============================================
    // Idempotency lookups
    // ============================================

    /// True iff a commit event with this `(sha, source)` is stored.
    pub fn commit_exists(&self, sha: &str, source: Source) -> Result<bool> {
        let conn = self.lock()?;
        exists_with(
            &conn,
            &DedupKey::Commit {
                sha: sha.to_string(),
                source,
            },
        )
    }

    /// True iff a merged-request event with this `(number, service, source)` is stored.
    pub fn merge_exists(&self, number: u64, service: &str, source: Source) -> Result<bool> {
        let conn = self.lock()?;
        exists_with(
            &conn,
            &DedupKey::Merge {
                number,
                service: service.to_string(),
                source,
            },
        )
    }

    // ============================================
    // Reads
    // ============================================

    /// All events of `kind` with `start <= timestamp < end`, oldest first.
    pub fn query_window(
        &self,
        kind: EventKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE type = ?1 AND timestamp >= ?2 AND timestamp < ?3 \
             ORDER BY timestamp ASC, id ASC",
            SELECT_EVENT_COLUMNS
        ))?;

        let events = stmt
            .query_map(
                params![
                    kind.as_str(),
                    storage_timestamp(start),
                    storage_timestamp(end)
                ],
                Self::row_to_event,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(events)
    }

    /// Every event of `kind`, oldest first.
    pub fn query_kind(&self, kind: EventKind) -> Result<Vec<StoredEvent>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE type = ?1 ORDER BY timestamp ASC, id ASC",
            SELECT_EVENT_COLUMNS
        ))?;

        let events = stmt
            .query_map([kind.as_str()], Self::row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(events)
    }

    /// Total number of stored events.
    pub fn event_count(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count = conn.query_row("SELECT COUNT(*) FROM events", [], |r| r.get(0))?;
        Ok(count)
    }

    /// Occurrence time of the newest event from `source`, if any.
    pub fn latest_event_time(&self, source: Source) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let latest: Option<String> = conn
            .query_row(
                "SELECT MAX(timestamp) FROM events WHERE source = ?",
                [source.as_str()],
                |r| r.get(0),
            )
            .optional()?
            .flatten();
        Ok(latest.as_deref().and_then(parse_timestamp))
    }

    fn row_to_event(row: &Row) -> rusqlite::Result<StoredEvent> {
        let source_str: String = row.get("source")?;
        let kind_str: String = row.get("type")?;
        let timestamp_str: String = row.get("timestamp")?;
        let created_at_str: String = row.get("created_at")?;
        let raw_str: Option<String> = row.get("raw_data")?;

        let source = source_str
            .parse::<Source>()
            .map_err(|e| conversion_error(1, e))?;
        let kind = kind_str
            .parse::<EventKind>()
            .map_err(|e| conversion_error(2, e))?;

        let commit_sha: Option<String> = row.get("commit_sha")?;
        let pr_number: Option<i64> = row.get("pr_number")?;
        let details = match kind {
            EventKind::Commit => EventDetails::Commit {
                sha: commit_sha.ok_or_else(|| conversion_error(5, "commit without sha"))?,
            },
            EventKind::PrOpened => EventDetails::PrOpened {
                number: request_number(pr_number)?,
                head_sha: commit_sha,
            },
            EventKind::PrMerged => EventDetails::PrMerged {
                number: request_number(pr_number)?,
                merge_commit_sha: commit_sha,
            },
            EventKind::Deployment => {
                let status_str: Option<String> = row.get("status")?;
                let status = status_str
                    .ok_or_else(|| conversion_error(7, "deployment without status"))?
                    .parse::<DeploymentStatus>()
                    .map_err(|e| conversion_error(7, e))?;
                EventDetails::Deployment {
                    environment: row
                        .get::<_, Option<String>>("environment")?
                        .unwrap_or_default(),
                    status,
                    sha: commit_sha,
                }
            }
        };

        Ok(StoredEvent {
            id: row.get("id")?,
            created_at: parse_timestamp(&created_at_str)
                .ok_or_else(|| conversion_error(10, "invalid created_at"))?,
            event: Event {
                source,
                service: row.get("service")?,
                timestamp: parse_timestamp(&timestamp_str)
                    .ok_or_else(|| conversion_error(8, "invalid timestamp"))?,
                author: row.get("author")?,
                details,
                raw_data: raw_str
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or(serde_json::Value::Null),
            },
        })
    }
}

fn insert_with(conn: &Connection, event: &Event) -> Result<i64> {
    let created_at = next_created_at(conn)?;

    let (environment, status) = match &event.details {
        EventDetails::Deployment {
            environment,
            status,
            ..
        } => (Some(environment.as_str()), Some(status.as_str())),
        _ => (None, None),
    };

    let pr_number = event
        .details
        .pr_number()
        .map(stored_number)
        .transpose()?;

    let raw_data = if event.raw_data.is_null() {
        None
    } else {
        Some(event.raw_data.to_string())
    };

    conn.execute(
        r#"
        INSERT INTO events (source, type, service, environment, commit_sha, pr_number,
                            status, timestamp, author, created_at, raw_data)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        params![
            event.source.as_str(),
            event.kind().as_str(),
            event.service,
            environment,
            event.details.commit_sha(),
            pr_number,
            status,
            storage_timestamp(event.timestamp),
            event.author,
            storage_timestamp(created_at),
            raw_data,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

fn exists_with(conn: &Connection, key: &DedupKey) -> Result<bool> {
    let count: i64 = match key {
        DedupKey::Commit { sha, source } => conn.query_row(
            "SELECT COUNT(*) FROM events WHERE commit_sha = ?1 AND source = ?2 AND type = 'commit'",
            params![sha, source.as_str()],
            |r| r.get(0),
        )?,
        DedupKey::Merge {
            number,
            service,
            source,
        } => {
            // Numbers outside the column's range can never have been stored
            let Ok(number) = i64::try_from(*number) else {
                return Ok(false);
            };
            conn.query_row(
                "SELECT COUNT(*) FROM events \
                 WHERE pr_number = ?1 AND service = ?2 AND source = ?3 AND type = 'pr_merged'",
                params![number, service, source.as_str()],
                |r| r.get(0),
            )?
        }
    };
    Ok(count > 0)
}

/// Storage time for the next insert: wall clock, but never earlier than
/// the newest `created_at` already stored.
fn next_created_at(conn: &Connection) -> Result<DateTime<Utc>> {
    let now = Utc::now();
    let last: Option<String> =
        conn.query_row("SELECT MAX(created_at) FROM events", [], |r| r.get(0))?;
    Ok(match last.as_deref().and_then(parse_timestamp) {
        Some(last) if last > now => last,
        _ => now,
    })
}

/// Request numbers are stored in a signed column; larger values are refused
/// before they reach the log.
fn stored_number(number: u64) -> Result<i64> {
    i64::try_from(number)
        .map_err(|_| Error::Payload(format!("request number {} is out of range", number)))
}

fn request_number(value: Option<i64>) -> rusqlite::Result<u64> {
    value
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| conversion_error(6, "request event without number"))
}

fn conversion_error(column: usize, message: impl Into<String>) -> rusqlite::Error {
    let message: String = message.into();
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}
