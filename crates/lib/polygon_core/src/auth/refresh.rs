//! Opaque refresh-token generation.
//!
//! The token is 256 bits from the operating system CSPRNG, URL-safe base64
//! encoded without padding. Its unguessability is its only security
//! property: it is stored and compared verbatim.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::TryRngCore;
use rand::rngs::OsRng;

use super::AuthError;

/// Number of random bytes in a refresh token.
pub const REFRESH_TOKEN_BYTES: usize = 32;

/// Generate a new refresh token.
///
/// Fails instead of degrading when the OS random source is unavailable.
pub fn generate_refresh_token() -> Result<String, AuthError> {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AuthError::internal(format!("os random source: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
