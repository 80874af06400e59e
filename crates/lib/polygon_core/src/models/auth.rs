//! Authentication domain models.
//!
//! These are internal domain models, distinct from the request/response
//! shapes the HTTP layer serializes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;

/// Role flag stored on a credential and carried in the access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// One hashed-password record per user.
#[derive(Debug, Clone)]
pub struct Credential {
    pub user_id: String,
    /// Profile name captured at creation; used to resolve logins.
    pub user_name: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row of the refresh-token ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    /// The opaque token value, used verbatim as the primary key.
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub replaced_by_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of a refresh-token row, derived on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTokenState {
    Active,
    Expired,
    RotatedOut,
    Revoked,
}

impl RefreshTokenRecord {
    /// A fresh, usable row expiring `ttl` after `now`.
    pub fn new(
        token: String,
        user_id: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::internal("refresh token expiry out of range"))?;
        Ok(Self {
            token,
            user_id: user_id.to_string(),
            expires_at,
            revoked: false,
            replaced_by_token: None,
            created_at: now,
        })
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> RefreshTokenState {
        if self.replaced_by_token.is_some() {
            RefreshTokenState::RotatedOut
        } else if self.revoked {
            RefreshTokenState::Revoked
        } else if now >= self.expires_at {
            RefreshTokenState::Expired
        } else {
            RefreshTokenState::Active
        }
    }

    /// Usable iff not revoked, not replaced, and not yet expired.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.state_at(now) == RefreshTokenState::Active
    }
}

/// Profile record owned by the users service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Identity proven by a valid access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    pub user_id: String,
    pub team_id: Option<String>,
    pub role: Role,
}

/// Token pair handed out by Login and Refresh.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub user_id: String,
    pub team_id: Option<String>,
    pub role: Role,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}
