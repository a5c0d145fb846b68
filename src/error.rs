//! Error types for Clipstream
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// This enum represents all possible errors that can occur
/// in the application. It implements `IntoResponse` to
/// automatically convert errors to the failure envelope.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing input (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A provided entity reference is not a well-formed id (400)
    #[error("Invalid identifier")]
    InvalidIdentifier,

    /// Uniqueness violation (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No credential was presented on a protected route (401)
    #[error("Credential missing")]
    MissingCredential,

    /// Credential or password rejected (401)
    ///
    /// Deliberately used for both unknown identity and wrong
    /// password so the response does not reveal which check failed.
    #[error("Invalid credentials")]
    InvalidCredential,

    /// Token signature, shape, or kind rejected (401)
    #[error("Invalid token")]
    InvalidToken,

    /// Token past its expiry (401)
    #[error("Expired token")]
    ExpiredToken,

    /// Refresh token no longer matches the persisted value (401)
    #[error("Stale refresh token")]
    StaleToken,

    /// Authenticated but not authorized for this resource (403)
    #[error("Access denied")]
    Forbidden,

    /// Referenced entity absent (404)
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Object store error (500)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to the appropriate status code and
    /// the uniform failure envelope `{statusCode, message, errors?}`.
    /// Internal details are never leaked to the caller.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, message, error_type) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "validation"),
            AppError::InvalidIdentifier => {
                (StatusCode::BAD_REQUEST, self.to_string(), "invalid_identifier")
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone(), "conflict"),
            AppError::MissingCredential => {
                (StatusCode::UNAUTHORIZED, self.to_string(), "missing_credential")
            }
            AppError::InvalidCredential => {
                (StatusCode::UNAUTHORIZED, self.to_string(), "invalid_credential")
            }
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, self.to_string(), "invalid_token"),
            AppError::ExpiredToken => (StatusCode::UNAUTHORIZED, self.to_string(), "expired_token"),
            AppError::StaleToken => (StatusCode::UNAUTHORIZED, self.to_string(), "stale_token"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, self.to_string(), "forbidden"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string(), "not_found"),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                "database",
            ),
            AppError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Storage error".to_string(),
                "storage",
            ),
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error".to_string(),
                "config",
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal",
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        // Record error metric
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        let body = Json(serde_json::json!({
            "statusCode": status.as_u16(),
            "message": message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
