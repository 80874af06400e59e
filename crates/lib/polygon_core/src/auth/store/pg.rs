//! PostgreSQL implementation of [`AuthStore`].
//!
//! Atomic operations run inside a single transaction at the default
//! read-committed isolation. Rotation relies on the row lock taken by the
//! conditional `UPDATE`: a concurrent rotation of the same token blocks,
//! re-evaluates the predicate after the winner commits, and matches zero rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{AuthStore, RotateOutcome};
use crate::auth::AuthError;
use crate::models::auth::{Credential, RefreshTokenRecord, Role};

/// Predicate matching rows that are still usable at `$2`.
const USABLE: &str = "revoked = false AND replaced_by_token IS NULL AND expires_at > $2";

type CredentialRow = (
    String,
    Option<String>,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

type RefreshRow = (
    String,
    String,
    DateTime<Utc>,
    bool,
    Option<String>,
    DateTime<Utc>,
);

fn credential_from_row(row: CredentialRow) -> Result<Credential, AuthError> {
    let (user_id, user_name, password_hash, role, created_at, updated_at) = row;
    let role = role.parse::<Role>().map_err(AuthError::Internal)?;
    Ok(Credential {
        user_id,
        user_name,
        password_hash,
        role,
        created_at,
        updated_at,
    })
}

fn refresh_from_row(row: RefreshRow) -> RefreshTokenRecord {
    let (token, user_id, expires_at, revoked, replaced_by_token, created_at) = row;
    RefreshTokenRecord {
        token,
        user_id,
        expires_at,
        revoked,
        replaced_by_token,
        created_at,
    }
}

/// Credential Store and Refresh Ledger backed by a connection pool.
#[derive(Debug, Clone)]
pub struct PgAuthStore {
    pool: PgPool,
}

impl PgAuthStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AuthStore for PgAuthStore {
    async fn upsert_credential(
        &self,
        user_id: &str,
        user_name: Option<&str>,
        password_hash: &str,
    ) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO credentials (user_id, user_name, password_hash) \
             VALUES ($1::uuid, $2, $3) \
             ON CONFLICT (user_id) DO UPDATE SET \
               password_hash = excluded.password_hash, \
               user_name = COALESCE(excluded.user_name, credentials.user_name), \
               updated_at = now()",
        )
        .bind(user_id)
        .bind(user_name)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_password(
        &self,
        user_id: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let mut tx = self.pool.begin().await?;

        let written = sqlx::query(
            "INSERT INTO credentials (user_id, password_hash) VALUES ($1::uuid, $2) \
             ON CONFLICT (user_id) DO UPDATE SET \
               password_hash = excluded.password_hash, updated_at = now()",
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if written == 0 {
            return Err(AuthError::internal("credential upsert affected no rows"));
        }

        let revoked = sqlx::query(&format!(
            "UPDATE refresh_tokens SET revoked = true WHERE user_id = $1::uuid AND {USABLE}"
        ))
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(revoked)
    }

    async fn find_credential(&self, user_id: &str) -> Result<Option<Credential>, AuthError> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT user_id::text, user_name, password_hash, role, created_at, updated_at \
             FROM credentials WHERE user_id = $1::uuid",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(credential_from_row).transpose()
    }

    async fn find_credential_by_name(
        &self,
        user_name: &str,
    ) -> Result<Option<Credential>, AuthError> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT user_id::text, user_name, password_hash, role, created_at, updated_at \
             FROM credentials WHERE user_name = $1 \
             ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(user_name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(credential_from_row).transpose()
    }

    async fn set_role(&self, user_id: &str, role: Role) -> Result<bool, AuthError> {
        let updated = sqlx::query(
            "UPDATE credentials SET role = $2, updated_at = now() WHERE user_id = $1::uuid",
        )
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (token, user_id, expires_at, created_at) \
             VALUES ($1, $2::uuid, $3, $4)",
        )
        .bind(&record.token)
        .bind(&record.user_id)
        .bind(record.expires_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, AuthError> {
        let row = sqlx::query_as::<_, RefreshRow>(
            "SELECT token, user_id::text, expires_at, revoked, replaced_by_token, created_at \
             FROM refresh_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(refresh_from_row))
    }

    async fn rotate_refresh_token(
        &self,
        presented: &str,
        replacement: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<RotateOutcome, AuthError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(&format!(
            "UPDATE refresh_tokens SET revoked = true, replaced_by_token = $3 \
             WHERE token = $1 AND {USABLE}"
        ))
        .bind(presented)
        .bind(now)
        .bind(&replacement.token)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(RotateOutcome::Stale);
        }

        sqlx::query(
            "INSERT INTO refresh_tokens (token, user_id, expires_at, created_at) \
             VALUES ($1, $2::uuid, $3, $4)",
        )
        .bind(&replacement.token)
        .bind(&replacement.user_id)
        .bind(replacement.expires_at)
        .bind(replacement.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(RotateOutcome::Rotated)
    }

    async fn revoke_refresh_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let updated = sqlx::query(&format!(
            "UPDATE refresh_tokens SET revoked = true WHERE token = $1 AND {USABLE}"
        ))
        .bind(token)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    async fn revoke_all_refresh_tokens(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let revoked = sqlx::query(&format!(
            "UPDATE refresh_tokens SET revoked = true WHERE user_id = $1::uuid AND {USABLE}"
        ))
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(revoked)
    }

    async fn purge_expired_refresh_tokens(
        &self,
        before: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let deleted = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    async fn ping(&self) -> Result<(), AuthError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
