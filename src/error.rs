//! Custom error types and handling
//!
//! This module defines the application's error types and implements
//! conversion to HTTP responses for the Axum framework. Errors reach judge
//! workers in the same envelope they use themselves: `{"error": code, "data": message}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Errors raised while talking to a sandbox worker
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JudgeError {
    /// HTTP status >= 400, `err != null`, or an unreadable body
    #[error("Judge client error: {0}")]
    Client(String),

    /// Timeout, refused connection, or any other transport failure
    #[error("Judge transport error: {0}")]
    Transport(String),

    /// The sandbox reported a compilation failure
    #[error("Compile error: {0}")]
    Compile(String),
}

impl JudgeError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Client(_) => "JUDGE_CLIENT_ERROR",
            Self::Transport(_) => "JUDGE_TRANSPORT_ERROR",
            Self::Compile(_) => "COMPILE_ERROR",
        }
    }

    /// The message without the category prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Client(msg) | Self::Transport(msg) | Self::Compile(msg) => msg,
        }
    }
}

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Admission errors
    #[error("Invalid token")]
    InvalidToken,

    #[error("Unknown hostname: {0}")]
    UnknownHostname(String),

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    // Resource errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // Scheduling errors
    #[error("No judge server available")]
    NoServer,

    #[error("Lock unavailable: {0}")]
    LockUnavailable(String),

    // Sandbox errors
    #[error(transparent)]
    Judge(#[from] JudgeError),

    // Storage errors
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    // Internal errors
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Response envelope shared with judge workers
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub data: String,
}

impl AppError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid-token",
            Self::UnknownHostname(_) => "unknown-hostname",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::NoServer => "NO_SERVER",
            Self::LockUnavailable(_) => "LOCK_UNAVAILABLE",
            Self::Judge(e) => e.error_code(),
            Self::MalformedRecord(_) => "MALFORMED_RECORD",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Redis(_) => "REDIS_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::UnknownHostname(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NoServer | Self::LockUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Judge(_) => StatusCode::BAD_GATEWAY,
            Self::MalformedRecord(_)
            | Self::Database(_)
            | Self::Redis(_)
            | Self::Internal(_)
            | Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the work queue should deliver the task again later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NoServer | Self::LockUnavailable(_) | Self::Database(_) | Self::Redis(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Log internal errors but don't expose details to clients
        let message = match &self {
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                "An internal error occurred".to_string()
            }
            AppError::Database(e) | AppError::MalformedRecord(e) => {
                tracing::error!("Database error: {}", e);
                "A database error occurred".to_string()
            }
            AppError::Redis(e) => {
                tracing::error!("Redis error: {}", e);
                "A cache error occurred".to_string()
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            error: self.error_code().to_string(),
            data: message,
        };

        (status, Json(body)).into_response()
    }
}

// Implement From for common error types
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            sqlx::Error::ColumnDecode { index, source } => {
                AppError::MalformedRecord(format!("column {}: {}", index, source))
            }
            sqlx::Error::Database(db_err) => {
                // Check for unique constraint violations
                if db_err.is_unique_violation() {
                    AppError::Conflict("Resource already exists".to_string())
                } else {
                    AppError::Database(db_err.to_string())
                }
            }
            _ => AppError::Database(err.to_string()),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Redis(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::MalformedRecord(err.to_string())
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_error_codes() {
        assert_eq!(AppError::InvalidToken.error_code(), "invalid-token");
        assert_eq!(
            AppError::UnknownHostname("judge-1".into()).error_code(),
            "unknown-hostname"
        );
        assert_eq!(AppError::InvalidToken.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_judge_error_codes() {
        let client: AppError = JudgeError::Client("bad request".into()).into();
        let transport: AppError = JudgeError::Transport("timed out".into()).into();

        assert_eq!(client.error_code(), "JUDGE_CLIENT_ERROR");
        assert_eq!(transport.error_code(), "JUDGE_TRANSPORT_ERROR");
        assert_eq!(JudgeError::Compile("x".into()).message(), "x");
    }

    #[test]
    fn test_retryable() {
        assert!(AppError::NoServer.is_retryable());
        assert!(AppError::LockUnavailable("busy".into()).is_retryable());
        assert!(AppError::Database("down".into()).is_retryable());
        assert!(!AppError::NotFound("submission".into()).is_retryable());
        assert!(!AppError::MalformedRecord("bad json".into()).is_retryable());
    }
}
