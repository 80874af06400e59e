//! Access token signing and verification (HS256).
//!
//! Access tokens are stateless: validation never consults the refresh
//! ledger, so a token stays valid until its own `exp` even after the refresh
//! token that produced it is revoked.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::AuthError;
use crate::models::auth::{Role, VerifiedIdentity};

/// The symmetric HMAC key shared by the session service and the gateway.
///
/// Debug output is redacted.
#[derive(Clone)]
pub struct SigningSecret(Arc<SecretString>);

impl SigningSecret {
    pub fn new(secret: impl Into<String>) -> Result<Self, AuthError> {
        let secret: String = secret.into();
        if secret.is_empty() {
            return Err(AuthError::invalid_argument("signing secret must not be empty"));
        }
        Ok(Self(Arc::new(SecretString::from(secret))))
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.expose_secret().as_bytes()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret([REDACTED])")
    }
}

/// Claims embedded in access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the user ID.
    #[serde(rename = "sub")]
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    /// Absent in tokens minted without a role; read as `user`.
    #[serde(default)]
    pub role: Role,
    /// Issued at (unix timestamp).
    #[serde(rename = "iat")]
    pub issued_at: i64,
    /// Expiry (unix timestamp).
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

impl TokenClaims {
    pub fn into_identity(self) -> VerifiedIdentity {
        VerifiedIdentity {
            user_id: self.subject,
            team_id: self.team_id.filter(|t| !t.is_empty()),
            role: self.role,
        }
    }
}

/// Mints signed access tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    key: EncodingKey,
}

impl TokenIssuer {
    pub fn new(secret: &SigningSecret) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Sign an access token valid for `ttl` from now.
    pub fn issue(
        &self,
        user_id: &str,
        team_id: Option<&str>,
        role: Role,
        ttl: Duration,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        self.issue_at(user_id, team_id, role, ttl, Utc::now())
    }

    /// Sign an access token as if issued at `now`.
    pub fn issue_at(
        &self,
        user_id: &str,
        team_id: Option<&str>,
        role: Role,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::internal("access token expiry out of range"))?;
        let claims = TokenClaims {
            subject: user_id.to_string(),
            team_id: team_id.filter(|t| !t.is_empty()).map(str::to_string),
            role,
            issued_at: now.timestamp(),
            expires_at: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| AuthError::internal(format!("jwt encode: {e}")))?;
        // Round to the second actually embedded in the token.
        let expires_at = Utc
            .timestamp_opt(claims.expires_at, 0)
            .single()
            .unwrap_or(expires_at);
        Ok((token, expires_at))
    }
}

/// Verifies access tokens without touching storage.
#[derive(Clone)]
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(secret: &SigningSecret) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Check signature, algorithm, expiry and subject.
    ///
    /// Every failure maps to the same generic `Unauthenticated` message.
    pub fn validate(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let claims = decode::<TokenClaims>(token, &self.key, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "access token rejected");
                AuthError::unauthenticated("invalid token")
            })?
            .claims;
        if claims.subject.is_empty() {
            return Err(AuthError::unauthenticated("invalid token"));
        }
        Ok(claims)
    }
}
