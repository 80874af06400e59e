//! Persistence seam for the Credential Store and the Refresh Ledger.
//!
//! [`AuthStore`] is the only path through which credential and refresh-token
//! rows are read or written. Methods documented as atomic must either apply
//! every write or none of them.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::AuthError;
use crate::models::auth::{Credential, RefreshTokenRecord, Role};

pub use memory::{FailPoint, MemoryAuthStore};
pub use pg::PgAuthStore;

/// Result of a conditional rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOutcome {
    /// The presented row was usable and is now rotated out.
    Rotated,
    /// The presented row was missing or no longer usable; nothing was written.
    Stale,
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    /// Insert or replace a credential's hash. An existing `user_name` is kept
    /// when `user_name` is `None`; the role is never touched.
    async fn upsert_credential(
        &self,
        user_id: &str,
        user_name: Option<&str>,
        password_hash: &str,
    ) -> Result<(), AuthError>;

    /// Atomically upsert the hash and revoke every usable refresh token of
    /// the user. Returns the number of tokens revoked.
    async fn set_password(
        &self,
        user_id: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError>;

    async fn find_credential(&self, user_id: &str) -> Result<Option<Credential>, AuthError>;

    /// Most recently updated credential carrying `user_name`.
    async fn find_credential_by_name(
        &self,
        user_name: &str,
    ) -> Result<Option<Credential>, AuthError>;

    /// Returns `false` when no credential exists for the user.
    async fn set_role(&self, user_id: &str, role: Role) -> Result<bool, AuthError>;

    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), AuthError>;

    async fn find_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, AuthError>;

    /// Atomically mark `presented` as revoked and replaced by
    /// `replacement.token`, and insert `replacement`. The presented row is
    /// only touched if it is still usable at `now`; of two concurrent
    /// rotations of the same token exactly one observes `Rotated`.
    async fn rotate_refresh_token(
        &self,
        presented: &str,
        replacement: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<RotateOutcome, AuthError>;

    /// Revoke one token without replacement. Returns `false` if it was not usable.
    async fn revoke_refresh_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError>;

    /// Revoke every usable token of the user. Returns the number revoked.
    async fn revoke_all_refresh_tokens(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError>;

    /// Delete rows whose `expires_at` is before `before`. Returns the number deleted.
    async fn purge_expired_refresh_tokens(&self, before: DateTime<Utc>)
    -> Result<u64, AuthError>;

    /// Reachability check.
    async fn ping(&self) -> Result<(), AuthError>;
}
