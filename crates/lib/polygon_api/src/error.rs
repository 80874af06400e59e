//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use polygon_core::auth::AuthError;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Carries its own machine code so the gateway can distinguish
    /// a malformed header from a bad token.
    #[error("Unauthenticated: {message}")]
    Unauthenticated { code: &'static str, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {message}")]
    Forbidden { code: &'static str, message: String },

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        AppError::Unauthenticated {
            code: "unauthenticated",
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden {
            code: "permission_denied",
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::InvalidArgument(m) => {
                (StatusCode::BAD_REQUEST, "invalid_argument", m.as_str())
            }
            AppError::Unauthenticated { code, message } => {
                (StatusCode::UNAUTHORIZED, *code, message.as_str())
            }
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Forbidden { code, message } => {
                (StatusCode::FORBIDDEN, *code, message.as_str())
            }
            AppError::PayloadTooLarge(m) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", m.as_str())
            }
            AppError::BadGateway(m) => {
                error!(detail = %m, "upstream request failed");
                (StatusCode::BAD_GATEWAY, "bad_gateway", "Upstream unavailable")
            }
            AppError::Internal(m) => {
                error!(detail = %m, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidArgument(msg) => AppError::InvalidArgument(msg),
            AuthError::Unauthenticated(msg) => AppError::unauthenticated(msg),
            AuthError::NotFound(msg) => AppError::NotFound(msg),
            AuthError::PermissionDenied(msg) => AppError::forbidden(msg),
            AuthError::Db(e) => AppError::Internal(e.to_string()),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}
