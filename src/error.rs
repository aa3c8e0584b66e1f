//! Error types for Temporal-KV

use crate::core::temporal::Timestamp;
use thiserror::Error;

/// Result type alias for Temporal-KV operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Temporal-KV
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input, rejected before the backend is touched
    #[error("Validation error: {0}")]
    Validation(String),

    /// A record for this (key, timestamp) pair was committed by another writer.
    ///
    /// Raised by backends on save or commit. `put` absorbs it by retrying.
    #[error("Uniqueness violation: a record for key {key:?} at timestamp {timestamp} already exists")]
    UniqueViolation { key: String, timestamp: Timestamp },

    /// The retry budget ran out while other writers kept winning the race
    #[error("Conflict retries exhausted for key {key:?} at timestamp {timestamp} after {attempts} attempts")]
    ConflictExhausted {
        key: String,
        timestamp: Timestamp,
        attempts: u32,
    },

    /// Storage-related errors (backend unavailable)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error signals a lost race on a (key, timestamp) pair.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::UniqueViolation { .. })
    }

    /// Whether this error comes from the storage infrastructure itself.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Io(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Configuration(e.to_string())
    }
}
