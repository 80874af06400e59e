//! Session orchestration: CreateUser, SetPassword, Login, Refresh,
//! ValidateToken, logout and maintenance.
//!
//! Holds no mutable state of its own; every invariant that needs atomicity
//! is delegated to a single [`AuthStore`] call.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AuthError;
use super::jwt::{SigningSecret, TokenIssuer, TokenValidator};
use super::password::{hash_password_blocking, verify_password_blocking};
use super::refresh::generate_refresh_token;
use super::store::{AuthStore, RotateOutcome};
use crate::collaborators::{ProfileDirectory, TeamDirectory};
use crate::models::auth::{Credential, IssuedSession, RefreshTokenRecord, Role, VerifiedIdentity};

/// Default access token lifetime: 1 hour.
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 60 * 60;

/// Default refresh token lifetime: 30 days.
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Default bound on the team lookup.
pub const DEFAULT_TEAM_LOOKUP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

const REFRESH_REJECTED: &str = "refresh token expired or revoked";

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub team_lookup_timeout: std::time::Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            access_ttl: Duration::seconds(DEFAULT_ACCESS_TTL_SECS),
            refresh_ttl: Duration::seconds(DEFAULT_REFRESH_TTL_SECS),
            team_lookup_timeout: DEFAULT_TEAM_LOOKUP_TIMEOUT,
        }
    }
}

/// Result of CreateUser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedUser {
    pub user_id: String,
    pub name: String,
    pub avatar_url: Option<String>,
}

pub struct SessionService {
    store: Arc<dyn AuthStore>,
    profiles: Arc<dyn ProfileDirectory>,
    teams: Option<Arc<dyn TeamDirectory>>,
    issuer: TokenIssuer,
    validator: TokenValidator,
    settings: SessionSettings,
}

fn require_uuid(user_id: &str) -> Result<(), AuthError> {
    Uuid::parse_str(user_id)
        .map(|_| ())
        .map_err(|_| AuthError::invalid_argument("user_id must be a UUID"))
}

impl SessionService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        profiles: Arc<dyn ProfileDirectory>,
        teams: Option<Arc<dyn TeamDirectory>>,
        secret: &SigningSecret,
        settings: SessionSettings,
    ) -> Self {
        Self {
            store,
            profiles,
            teams,
            issuer: TokenIssuer::new(secret),
            validator: TokenValidator::new(secret),
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Create the profile upstream, then store its credential.
    pub async fn create_user(
        &self,
        name: &str,
        password: &str,
        avatar: Option<&str>,
    ) -> Result<CreatedUser, AuthError> {
        if name.is_empty() || password.is_empty() {
            return Err(AuthError::invalid_argument("name and password required"));
        }
        let profile = self
            .profiles
            .create_profile(name, avatar.filter(|a| !a.is_empty()))
            .await
            .map_err(|e| AuthError::internal(format!("create user upstream: {e}")))?;

        self.create_credential(&profile.id, Some(&profile.name), password)
            .await?;
        info!(user_id = %profile.id, "user created");

        Ok(CreatedUser {
            user_id: profile.id,
            name: profile.name,
            avatar_url: profile.avatar_url,
        })
    }

    /// Hash and upsert a credential. A second call replaces the hash.
    pub async fn create_credential(
        &self,
        user_id: &str,
        user_name: Option<&str>,
        password: &str,
    ) -> Result<(), AuthError> {
        let hash = hash_password_blocking(password.to_string()).await?;
        self.store
            .upsert_credential(user_id, user_name, &hash)
            .await
    }

    /// Replace the password and revoke every live session of the user, atomically.
    pub async fn set_password(&self, user_id: &str, password: &str) -> Result<(), AuthError> {
        if user_id.is_empty() || password.is_empty() {
            return Err(AuthError::invalid_argument("user_id and password required"));
        }
        require_uuid(user_id)?;
        let hash = hash_password_blocking(password.to_string()).await?;
        let revoked = self.store.set_password(user_id, &hash, Utc::now()).await?;
        info!(%user_id, revoked, "password changed, sessions revoked");
        Ok(())
    }

    /// Resolve a username and check the password.
    ///
    /// An unknown name is `NotFound` and a wrong password `Unauthenticated`;
    /// the HTTP layer decides whether to merge them.
    pub async fn verify_password(&self, name: &str, password: &str) -> Result<Credential, AuthError> {
        let credential = self
            .store
            .find_credential_by_name(name)
            .await?
            .ok_or_else(|| AuthError::NotFound("credentials not found".into()))?;
        let matches =
            verify_password_blocking(password.to_string(), credential.password_hash.clone())
                .await?;
        if !matches {
            return Err(AuthError::unauthenticated("invalid credentials"));
        }
        Ok(credential)
    }

    pub async fn login(&self, name: &str, password: &str) -> Result<IssuedSession, AuthError> {
        if name.is_empty() || password.is_empty() {
            return Err(AuthError::invalid_argument("name and password required"));
        }
        let credential = self.verify_password(name, password).await?;
        let team_id = self.lookup_team(&credential.user_id).await;

        let now = Utc::now();
        let (access_token, access_expires_at) = self.issuer.issue_at(
            &credential.user_id,
            team_id.as_deref(),
            credential.role,
            self.settings.access_ttl,
            now,
        )?;
        let refresh = self.new_refresh_record(&credential.user_id, now)?;
        self.store.insert_refresh_token(&refresh).await?;

        info!(user_id = %credential.user_id, "login succeeded");
        Ok(IssuedSession {
            user_id: credential.user_id,
            team_id,
            role: credential.role,
            access_token,
            access_expires_at,
            refresh_token: refresh.token,
            refresh_expires_at: refresh.expires_at,
        })
    }

    /// Exchange a usable refresh token for a new pair, rotating it out.
    pub async fn refresh(&self, presented: &str) -> Result<IssuedSession, AuthError> {
        if presented.is_empty() {
            return Err(AuthError::invalid_argument("refresh token required"));
        }
        let now = Utc::now();
        let record = self
            .store
            .find_refresh_token(presented)
            .await?
            .ok_or_else(|| AuthError::unauthenticated("invalid refresh token"))?;
        if !record.is_usable_at(now) {
            debug!(user_id = %record.user_id, state = ?record.state_at(now), "refresh rejected");
            return Err(AuthError::unauthenticated(REFRESH_REJECTED));
        }

        let user_id = record.user_id;
        let role = self
            .store
            .find_credential(&user_id)
            .await?
            .map(|c| c.role)
            .unwrap_or_default();
        let team_id = self.lookup_team(&user_id).await;

        let (access_token, access_expires_at) = self.issuer.issue_at(
            &user_id,
            team_id.as_deref(),
            role,
            self.settings.access_ttl,
            now,
        )?;
        let replacement = self.new_refresh_record(&user_id, now)?;

        match self
            .store
            .rotate_refresh_token(presented, &replacement, now)
            .await?
        {
            RotateOutcome::Rotated => {}
            RotateOutcome::Stale => {
                warn!(%user_id, "refresh token lost a concurrent rotation");
                return Err(AuthError::unauthenticated(REFRESH_REJECTED));
            }
        }

        debug!(%user_id, "refresh token rotated");
        Ok(IssuedSession {
            user_id,
            team_id,
            role,
            access_token,
            access_expires_at,
            refresh_token: replacement.token,
            refresh_expires_at: replacement.expires_at,
        })
    }

    /// Stateless access-token check.
    pub fn validate_token(&self, access_token: &str) -> Result<VerifiedIdentity, AuthError> {
        if access_token.is_empty() {
            return Err(AuthError::invalid_argument("token required"));
        }
        self.validator
            .validate(access_token)
            .map(|claims| claims.into_identity())
    }

    /// Revoke one refresh token without replacement. Unknown or spent
    /// tokens are not an error.
    pub async fn logout(&self, refresh_token: &str) -> Result<bool, AuthError> {
        if refresh_token.is_empty() {
            return Ok(false);
        }
        self.store
            .revoke_refresh_token(refresh_token, Utc::now())
            .await
    }

    /// Revoke every usable refresh token of a user.
    pub async fn revoke_all(&self, user_id: &str) -> Result<u64, AuthError> {
        require_uuid(user_id)?;
        let revoked = self
            .store
            .revoke_all_refresh_tokens(user_id, Utc::now())
            .await?;
        info!(%user_id, revoked, "sessions revoked");
        Ok(revoked)
    }

    pub async fn set_role(&self, user_id: &str, role: Role) -> Result<(), AuthError> {
        require_uuid(user_id)?;
        if !self.store.set_role(user_id, role).await? {
            return Err(AuthError::NotFound("credentials not found".into()));
        }
        info!(%user_id, %role, "role updated");
        Ok(())
    }

    /// Delete ledger rows that expired before `before`.
    pub async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, AuthError> {
        let deleted = self.store.purge_expired_refresh_tokens(before).await?;
        info!(deleted, before = %before, "purged expired refresh tokens");
        Ok(deleted)
    }

    pub async fn health(&self) -> Result<(), AuthError> {
        self.store.ping().await
    }

    fn new_refresh_record(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, AuthError> {
        RefreshTokenRecord::new(
            generate_refresh_token()?,
            user_id,
            self.settings.refresh_ttl,
            now,
        )
    }

    /// Best-effort team resolution; errors and timeouts yield `None`.
    async fn lookup_team(&self, user_id: &str) -> Option<String> {
        let teams = self.teams.as_ref()?;
        match tokio::time::timeout(self.settings.team_lookup_timeout, teams.team_of(user_id)).await
        {
            Ok(Ok(team)) => team,
            Ok(Err(e)) => {
                warn!(%user_id, error = %e, "team lookup failed, continuing without team");
                None
            }
            Err(_) => {
                warn!(%user_id, "team lookup timed out, continuing without team");
                None
            }
        }
    }
}
