//! Axum-specific error types and mappings.
//!
//! Maps core session errors to HTTP status codes and a JSON error body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use speakd_core::SessionError;

/// Axum-specific error type.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Bad request (invalid input).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Conflict (a session is already active).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = ErrorBody { error: message, status: status.as_u16() };
        (status, axum::Json(body)).into_response()
    }
}

impl From<SessionError> for HttpError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Conflict { .. } => Self::Conflict(err.to_string()),
            SessionError::EmptyInput => Self::BadRequest(err.to_string()),
        }
    }
}
