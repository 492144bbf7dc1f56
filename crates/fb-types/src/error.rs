//! Error types for fb-types.

use thiserror::Error;

/// Errors raised while parsing or validating entity data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// Unknown entity kind name.
    #[error("invalid entity kind: {0}")]
    InvalidKind(String),

    /// Entity key not of the form `<kind>:<id>`.
    #[error("invalid entity key: {0}")]
    InvalidKey(String),

    /// Match status string the model does not recognise.
    #[error("invalid match status: {0}")]
    InvalidStatus(String),

    /// An entity body broke one of its structural invariants.
    #[error("validation failed for {key}: {reason}")]
    Validation { key: String, reason: String },
}

impl TypeError {
    pub(crate) fn validation(key: impl ToString, reason: impl Into<String>) -> Self {
        TypeError::Validation {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
