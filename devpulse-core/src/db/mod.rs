//! Database layer for devpulse
//!
//! This module provides the event store using SQLite with:
//! - Schema migrations
//! - Append-only event inserts and idempotency lookups
//! - Time-window queries for the metrics engine

pub mod repo;
pub mod schema;

pub use repo::Database;
