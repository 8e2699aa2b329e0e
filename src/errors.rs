use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::services::intake::SubmitError;

/// A lightweight wrapper for request-level errors that keeps the machine
/// code and human message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status, code, and message.
    pub fn new(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "code": self.code,
            "message": self.message,
        }));

        (self.status, body).into_response()
    }
}

/// Map the closed submission taxonomy onto HTTP statuses.
///
/// This is the only place the taxonomy meets the wire, so the status
/// mapping cannot drift between handlers.
impl From<SubmitError> for AppError {
    fn from(err: SubmitError) -> Self {
        let status = match &err {
            SubmitError::MissingFile => StatusCode::BAD_REQUEST,
            SubmitError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            SubmitError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            SubmitError::Unauthenticated => StatusCode::UNAUTHORIZED,
            SubmitError::AccessDenied => StatusCode::FORBIDDEN,
            SubmitError::QuotaExceeded => StatusCode::INSUFFICIENT_STORAGE,
            SubmitError::KeyConflict(_) => StatusCode::CONFLICT,
            SubmitError::Network(_) => StatusCode::BAD_GATEWAY,
        };
        let code = err.code();
        // Environment detail stays in the logs; the body carries only the
        // taxonomy-level message.
        let message = match &err {
            SubmitError::Network(_) => "storage temporarily unavailable".to_string(),
            other => other.to_string(),
        };
        AppError::new(status, code, message)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
