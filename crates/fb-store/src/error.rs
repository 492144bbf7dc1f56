//! Error types for the entity store.

use thiserror::Error;

/// Errors raised by [`crate::EntityStore`] and its persistence backends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A write carried a version no newer than the stored one.
    /// The stored record is left untouched.
    #[error("stale write for {key}: version {attempted} <= current {current}")]
    StaleWrite {
        key: String,
        current: u64,
        attempted: u64,
    },

    /// The entity body does not belong under the key it was written to.
    #[error("entity {actual} written under key {key}")]
    KeyMismatch { key: String, actual: String },

    /// Backend I/O failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid configuration value.
    #[error("config error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Storage(format!("serialization: {}", err))
    }
}
