//! Voice chat service error types.
//!
//! All errors map to appropriate HTTP status codes via the `IntoResponse` impl.
//! Store failures are logged server-side and surfaced with a generic message.
//! Provider failures never reach this type: the workflows swallow them and
//! degrade to mock credentials instead.

use crate::repositories::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Message returned when a session already holds the maximum number of members.
pub const SESSION_FULL_MESSAGE: &str = "Session is full (max 5 users)";

/// Voice chat service error type.
///
/// Maps to HTTP status codes:
/// - BadRequest: 400 Bad Request
/// - SessionFull: 403 Forbidden
/// - Conflict: 409 Conflict
/// - Store, Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum VcError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Session is full (max 5 users)")]
    SessionFull,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal server error")]
    Internal,
}

impl VcError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            VcError::BadRequest(_) => 400,
            VcError::SessionFull => 403,
            VcError::Conflict(_) => 409,
            VcError::Store(_) | VcError::Internal => 500,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for VcError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            VcError::BadRequest(reason) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone()),
            VcError::SessionFull => (
                StatusCode::FORBIDDEN,
                "SESSION_FULL",
                SESSION_FULL_MESSAGE.to_string(),
            ),
            VcError::Conflict(reason) => (StatusCode::CONFLICT, "CONFLICT", reason.clone()),
            VcError::Store(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "vc.store", error = %err, "Store operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "An internal storage error occurred".to_string(),
                )
            }
            VcError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<StoreError> for VcError {
    fn from(err: StoreError) -> Self {
        VcError::Store(err.to_string())
    }
}
