//! Error types for sima-server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// No acting user could be established (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Database error outside a sima-common call
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// sima-common error, mapped by kind
    #[error(transparent)]
    Common(#[from] sima_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use sima_common::Error as Common;

        let (status, error_code) = match &self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::NotFound(_) | ApiError::Common(Common::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            ApiError::Common(Common::Validation(_)) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Common(Common::Reference(_)) => (StatusCode::BAD_REQUEST, "REFERENCE_ERROR"),
            ApiError::Common(Common::Integrity(_)) => (StatusCode::CONFLICT, "INTEGRITY_ERROR"),
            ApiError::Database(_) | ApiError::Common(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let message = self.to_string();
        if status.is_server_error() {
            error!("Request failed: {}", message);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
