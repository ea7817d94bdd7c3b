//! Error types for the API layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// API error mapped to a JSON error body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request (bad name, bad body, missing header).
    #[error("{0}")]
    BadRequest(String),

    /// No live session matched the presented ID (absent, invalid, or expired).
    #[error("session not found or expired")]
    SessionNotFound,

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("{0}")]
    Conflict(String),

    /// Missing or invalid authentication token.
    #[error("unauthorized")]
    Unauthorized,

    /// Rate limit exceeded.
    #[error("too many requests")]
    TooManyRequests,

    /// The active-session capacity limit is reached.
    #[error("active session limit reached")]
    SessionLimitReached,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error body: machine-readable code plus optional detail.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    /// Error code (e.g. "bad_request", "session_not_found", "internal_error").
    pub(crate) error: String,
    /// Human-readable error detail, if available.
    pub(crate) detail: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, detail) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone())),
            ApiError::SessionNotFound => (StatusCode::NOT_FOUND, "session_not_found", None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            ApiError::TooManyRequests => {
                (StatusCode::TOO_MANY_REQUESTS, "too_many_requests", None)
            }
            ApiError::SessionLimitReached => (
                StatusCode::SERVICE_UNAVAILABLE,
                "session_limit_reached",
                None,
            ),
            ApiError::Internal(msg) => {
                tracing::error!(%msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    Some(msg.clone()),
                )
            }
        };

        let body = ErrorBody {
            error: error.to_string(),
            detail,
        };

        (status, axum::Json(body)).into_response()
    }
}
