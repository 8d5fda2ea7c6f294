//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: append-only event log
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        source           TEXT NOT NULL,
        type             TEXT NOT NULL,
        service          TEXT NOT NULL,

        -- Type-specific fields (NULL when not applicable)
        environment      TEXT,
        commit_sha       TEXT,
        pr_number        INTEGER,
        status           TEXT,

        -- Occurrence time vs storage time
        timestamp        DATETIME NOT NULL,
        author           TEXT,
        created_at       DATETIME NOT NULL,

        -- Lossless capture
        raw_data         JSON
    );

    CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
    CREATE INDEX IF NOT EXISTS idx_events_type_timestamp ON events(type, timestamp);
    CREATE INDEX IF NOT EXISTS idx_events_service ON events(service);
    CREATE INDEX IF NOT EXISTS idx_events_commit ON events(commit_sha, source);
    CREATE INDEX IF NOT EXISTS idx_events_pr ON events(pr_number, service, source);
    CREATE INDEX IF NOT EXISTS idx_events_author ON events(author);
    CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version = get_schema_version(conn)?;

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
