//! Authentication and session logic.
//!
//! Provides password hashing, access-token signing and validation, the
//! refresh-token ledger, and the session orchestration shared by the HTTP
//! layer and the gateway middleware.

pub mod jwt;
pub mod password;
pub mod refresh;
pub mod session;
pub mod store;

use thiserror::Error;

/// Authentication errors.
///
/// Variants mirror the status taxonomy callers see; `Db` and `Internal`
/// carry detail for logs only.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        AuthError::Unauthenticated(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        AuthError::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AuthError::Internal(msg.into())
    }
}
