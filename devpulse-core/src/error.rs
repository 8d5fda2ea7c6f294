//! Error types for devpulse-core

use crate::types::Source;
use thiserror::Error;

/// Main error type for the devpulse-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// The shared connection mutex was poisoned by a panicking writer
    #[error("storage error: connection lock poisoned")]
    StorageLock,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Webhook or API payload is missing a required field
    #[error("invalid payload: {0}")]
    Payload(String),

    /// Dedup check or insert failed for a single event
    #[error("failed to ingest {event}: {source}")]
    Ingestion {
        /// Short description of the event (kind, service, key)
        event: String,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// A provider's identity, enumeration or fetch step failed
    #[error("{provider} scan failed: {message}")]
    ProviderScan {
        /// Provider whose scan failed
        provider: Source,
        /// Failure description
        message: String,
    },

    /// HTTP transport or API error while talking to a provider
    #[error("HTTP error: {0}")]
    Http(String),

    /// A metrics query failed
    #[error("aggregation failed: {0}")]
    Aggregation(Box<Error>),
}

impl Error {
    /// Wrap an error as an aggregation failure.
    pub(crate) fn aggregation(err: Error) -> Self {
        match err {
            Error::Aggregation(_) => err,
            other => Error::Aggregation(Box::new(other)),
        }
    }
}

/// Result type alias for devpulse-core
pub type Result<T> = std::result::Result<T, Error>;
