//! API error types and JSON error response formatting.
//!
//! Turn outcomes are never errors: a failed turn is still a turn body with
//! a non-2xx status (see [`status_for`]). `ApiError` covers requests that
//! never reach the orchestrator.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lectern_action::{FailureKind, OrchestratorResponse};
use lectern_chat::ChatError;
use serde::Serialize;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
    #[error("{0}")]
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyMessage | ChatError::MessageTooLong(_) => ApiError::BadRequest(err.to_string()),
            ChatError::Store(_) => ApiError::ServiceUnavailable(err.to_string()),
            ChatError::History(msg) => {
                tracing::warn!(error = %msg, "History store error");
                ApiError::Internal("history unavailable".to_string())
            }
        }
    }
}

/// HTTP status for a turn outcome.
pub fn status_for(response: &OrchestratorResponse) -> StatusCode {
    match response.failure_kind() {
        None => StatusCode::OK,
        Some(FailureKind::Unauthorized | FailureKind::Forbidden) => StatusCode::FORBIDDEN,
        Some(FailureKind::InvalidInput) => StatusCode::BAD_REQUEST,
        Some(FailureKind::NotFound) => StatusCode::NOT_FOUND,
        Some(FailureKind::Transient) => StatusCode::SERVICE_UNAVAILABLE,
        Some(FailureKind::PreconditionManual | FailureKind::Rejected) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}
