//! Error types for the coordinator and the analysis layer.

use fb_ingestion::IngestionError;
use fb_types::EntityKind;
use thiserror::Error;

/// Outcome of a failed `resolve`. `Clone` so every caller waiting on the
/// same fetch receives it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The provider kept failing transiently (including rate limiting)
    /// until the retry policy gave up.
    #[error("provider unavailable after {attempts} attempts: {reason}")]
    Transient { attempts: u32, reason: String },

    /// The provider answered with something unusable. Nothing was cached.
    #[error("malformed provider response: {0}")]
    Malformed(String),

    /// The caller's deadline passed. The fetch itself may still complete
    /// and populate the store.
    #[error("timed out")]
    Timeout,

    /// No record exists and the provider has none either.
    #[error("not found: {0}")]
    NotFound(String),

    /// The provider rejected our credentials.
    #[error("provider rejected credentials")]
    Unauthorized,

    /// Provider client misconfigured.
    #[error("provider config error: {0}")]
    Config(String),

    /// The store could not commit the fetched record.
    #[error("store error: {0}")]
    Store(String),
}

impl From<IngestionError> for FetchError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::Exhausted { attempts, reason } => {
                FetchError::Transient { attempts, reason }
            }
            IngestionError::Network(_)
            | IngestionError::Server { .. }
            | IngestionError::RateLimited { .. } => FetchError::Transient {
                attempts: 1,
                reason: err.to_string(),
            },
            IngestionError::Malformed(reason) => FetchError::Malformed(reason),
            IngestionError::NotFound(what) => FetchError::NotFound(what),
            IngestionError::Unauthorized { .. } => FetchError::Unauthorized,
            IngestionError::Timeout => FetchError::Timeout,
            IngestionError::Config(reason) => FetchError::Config(reason),
        }
    }
}

/// Errors from the analysis layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexerError {
    /// Could not obtain the underlying entity.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The entity exists but lacks what the query needs.
    #[error("no data available: {0}")]
    NoData(String),

    /// Invalid request parameters.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The store returned a body of another kind than the key promised.
    #[error("expected a {expected} body for {key}")]
    WrongKind { key: String, expected: EntityKind },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_becomes_transient() {
        let err: FetchError = IngestionError::Exhausted {
            attempts: 4,
            reason: "HTTP 503".into(),
        }
        .into();
        assert_eq!(
            err,
            FetchError::Transient {
                attempts: 4,
                reason: "HTTP 503".into()
            }
        );
    }

    #[test]
    fn test_rate_limit_folds_into_transient() {
        let err: FetchError = IngestionError::RateLimited { retry_after: None }.into();
        assert!(matches!(err, FetchError::Transient { attempts: 1, .. }));
    }

    #[test]
    fn test_permanent_errors_map_one_to_one() {
        assert_eq!(
            FetchError::from(IngestionError::Malformed("x".into())),
            FetchError::Malformed("x".into())
        );
        assert_eq!(
            FetchError::from(IngestionError::Unauthorized { status: 401 }),
            FetchError::Unauthorized
        );
        assert_eq!(FetchError::from(IngestionError::Timeout), FetchError::Timeout);
    }
}
