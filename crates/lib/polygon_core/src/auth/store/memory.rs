//! In-memory implementation of [`AuthStore`] for tests and local development.
//!
//! A single mutex serializes every operation, which gives the same
//! single-winner guarantee the database provides for rotation. Fail points
//! make a chosen write fail; multi-write operations check all of their fail
//! points before mutating anything so a failure leaves no partial state.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{AuthStore, RotateOutcome};
use crate::auth::AuthError;
use crate::models::auth::{Credential, RefreshTokenRecord, Role};

/// Writes that can be forced to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// Inserting a refresh-token row (login or rotation replacement).
    TokenInsert,
    /// Revoking refresh tokens as part of a password change.
    TokenRevoke,
}

#[derive(Debug, Default)]
struct State {
    credentials: HashMap<String, Credential>,
    tokens: HashMap<String, RefreshTokenRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryAuthStore {
    state: Mutex<State>,
    armed: StdMutex<HashSet<FailPoint>>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next write at `point` fail with an internal error.
    pub fn fail_next(&self, point: FailPoint) {
        self.armed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(point);
    }

    fn trip(&self, point: FailPoint) -> Result<(), AuthError> {
        let fired = self
            .armed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&point);
        if fired {
            Err(AuthError::internal(format!("injected failure at {point:?}")))
        } else {
            Ok(())
        }
    }

    /// Number of refresh-token rows, including revoked tombstones.
    pub async fn refresh_token_count(&self) -> usize {
        self.state.lock().await.tokens.len()
    }

    /// Number of credential rows.
    pub async fn credential_count(&self) -> usize {
        self.state.lock().await.credentials.len()
    }

    fn upsert_locked(
        state: &mut State,
        user_id: &str,
        user_name: Option<&str>,
        password_hash: &str,
        now: DateTime<Utc>,
    ) {
        state
            .credentials
            .entry(user_id.to_string())
            .and_modify(|c| {
                c.password_hash = password_hash.to_string();
                if let Some(name) = user_name {
                    c.user_name = Some(name.to_string());
                }
                c.updated_at = now;
            })
            .or_insert_with(|| Credential {
                user_id: user_id.to_string(),
                user_name: user_name.map(str::to_string),
                password_hash: password_hash.to_string(),
                role: Role::User,
                created_at: now,
                updated_at: now,
            });
    }
}

#[async_trait]
impl AuthStore for MemoryAuthStore {
    async fn upsert_credential(
        &self,
        user_id: &str,
        user_name: Option<&str>,
        password_hash: &str,
    ) -> Result<(), AuthError> {
        let mut state = self.state.lock().await;
        Self::upsert_locked(&mut state, user_id, user_name, password_hash, Utc::now());
        Ok(())
    }

    async fn set_password(
        &self,
        user_id: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let mut state = self.state.lock().await;
        self.trip(FailPoint::TokenRevoke)?;

        Self::upsert_locked(&mut state, user_id, None, password_hash, Utc::now());
        let mut revoked = 0;
        for record in state.tokens.values_mut() {
            if record.user_id == user_id && record.is_usable_at(now) {
                record.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn find_credential(&self, user_id: &str) -> Result<Option<Credential>, AuthError> {
        Ok(self.state.lock().await.credentials.get(user_id).cloned())
    }

    async fn find_credential_by_name(
        &self,
        user_name: &str,
    ) -> Result<Option<Credential>, AuthError> {
        let state = self.state.lock().await;
        Ok(state
            .credentials
            .values()
            .filter(|c| c.user_name.as_deref() == Some(user_name))
            .max_by_key(|c| c.updated_at)
            .cloned())
    }

    async fn set_role(&self, user_id: &str, role: Role) -> Result<bool, AuthError> {
        let mut state = self.state.lock().await;
        match state.credentials.get_mut(user_id) {
            Some(c) => {
                c.role = role;
                c.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), AuthError> {
        let mut state = self.state.lock().await;
        self.trip(FailPoint::TokenInsert)?;
        if state.tokens.contains_key(&record.token) {
            return Err(AuthError::internal("duplicate refresh token"));
        }
        state.tokens.insert(record.token.clone(), record.clone());
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, AuthError> {
        Ok(self.state.lock().await.tokens.get(token).cloned())
    }

    async fn rotate_refresh_token(
        &self,
        presented: &str,
        replacement: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<RotateOutcome, AuthError> {
        let mut state = self.state.lock().await;

        let usable = state
            .tokens
            .get(presented)
            .is_some_and(|r| r.is_usable_at(now));
        if !usable {
            return Ok(RotateOutcome::Stale);
        }
        self.trip(FailPoint::TokenInsert)?;
        if state.tokens.contains_key(&replacement.token) {
            return Err(AuthError::internal("duplicate refresh token"));
        }

        if let Some(record) = state.tokens.get_mut(presented) {
            record.revoked = true;
            record.replaced_by_token = Some(replacement.token.clone());
        }
        state
            .tokens
            .insert(replacement.token.clone(), replacement.clone());
        Ok(RotateOutcome::Rotated)
    }

    async fn revoke_refresh_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let mut state = self.state.lock().await;
        match state.tokens.get_mut(token) {
            Some(record) if record.is_usable_at(now) => {
                record.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_refresh_tokens(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let mut state = self.state.lock().await;
        let mut revoked = 0;
        for record in state.tokens.values_mut() {
            if record.user_id == user_id && record.is_usable_at(now) {
                record.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn purge_expired_refresh_tokens(
        &self,
        before: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let mut state = self.state.lock().await;
        let len = state.tokens.len();
        state.tokens.retain(|_, r| r.expires_at >= before);
        Ok((len - state.tokens.len()) as u64)
    }

    async fn ping(&self) -> Result<(), AuthError> {
        Ok(())
    }
}
