//! API error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fb_indexer::{FetchError, IndexerError};
use serde::Serialize;
use thiserror::Error;

/// API errors that can be returned to clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Error from the indexer layer.
    #[error("indexer error: {0}")]
    Indexer(#[from] IndexerError),
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        ApiError::Indexer(err.into())
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Indexer(e) => match e {
                IndexerError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "bad_request"),
                IndexerError::NoData(_) => (StatusCode::NOT_FOUND, "no_data"),
                IndexerError::WrongKind { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
                }
                IndexerError::Fetch(fetch) => match fetch {
                    FetchError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
                    FetchError::Transient { .. } => {
                        (StatusCode::SERVICE_UNAVAILABLE, "provider_unavailable")
                    }
                    FetchError::Malformed(_) => (StatusCode::BAD_GATEWAY, "provider_malformed"),
                    FetchError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                    FetchError::Unauthorized => (StatusCode::BAD_GATEWAY, "provider_unauthorized"),
                    FetchError::Config(_) | FetchError::Store(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
                    }
                },
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.status();

        let details = if status.is_server_error() {
            tracing::error!("{} ({}): {}", error, status, self);
            // Internal failures are logged, not echoed.
            (status != StatusCode::INTERNAL_SERVER_ERROR).then(|| self.to_string())
        } else {
            Some(self.to_string())
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
