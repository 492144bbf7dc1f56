//! Error types for the ingestion layer.
//!
//! Variants own their data as strings so the error is `Clone` and can be
//! handed to every caller waiting on the same fetch.

use fb_types::TypeError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while fetching from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestionError {
    /// Connection, DNS or read failure before a status was received.
    #[error("network error: {0}")]
    Network(String),

    /// Provider answered with a 5xx status.
    #[error("provider error: HTTP {status}")]
    Server { status: u16 },

    /// Provider answered 429.
    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    /// Response did not match the expected schema or broke an entity
    /// invariant. Never retried, never cached.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Provider has no such entity.
    #[error("not found: {0}")]
    NotFound(String),

    /// Provider rejected the credential. The credential itself is never
    /// part of the message.
    #[error("provider rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    /// Configuration errors (e.g., unparseable env vars).
    #[error("config error: {0}")]
    Config(String),

    /// Caller deadline passed while waiting for budget or the network.
    #[error("timed out")]
    Timeout,

    /// Transient failures persisted through every allowed attempt.
    #[error("gave up after {attempts} attempts: {reason}")]
    Exhausted { attempts: u32, reason: String },
}

impl IngestionError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IngestionError::Network(_)
                | IngestionError::Server { .. }
                | IngestionError::RateLimited { .. }
        )
    }
}

impl From<reqwest::Error> for IngestionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            IngestionError::Malformed(err.to_string())
        } else {
            // reqwest's Display never includes request headers, so the
            // auth token cannot leak through here.
            IngestionError::Network(err.without_url().to_string())
        }
    }
}

impl From<TypeError> for IngestionError {
    fn from(err: TypeError) -> Self {
        IngestionError::Malformed(err.to_string())
    }
}

impl From<serde_json::Error> for IngestionError {
    fn from(err: serde_json::Error) -> Self {
        IngestionError::Malformed(err.to_string())
    }
}
