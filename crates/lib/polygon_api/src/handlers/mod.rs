//! Request handlers.

pub mod admin;
pub mod auth;
pub mod health;

use axum::body::Bytes;
use serde::de::DeserializeOwned;

use crate::error::{AppError, AppResult};

/// Decode a JSON body. An empty body decodes as `T::default()` so missing
/// fields surface as `InvalidArgument` from the service, not a parse error.
pub(crate) fn json_body<T>(body: &Bytes) -> AppResult<T>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidArgument(format!("invalid JSON body: {e}")))
}
