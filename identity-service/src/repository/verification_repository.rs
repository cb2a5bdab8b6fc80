//! # Verification Token Repository
//!
//! One-shot hashed tokens. Consumption is DELETE..RETURNING with the
//! purpose and expiry folded into the WHERE clause: found, matching, and
//! unexpired means deleted-and-returned in one statement, so a second
//! validation of the same token can never succeed.

use chrono::{DateTime, Utc};
use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::VerificationToken;

/// Repository for verification tokens.
#[derive(Debug, Clone)]
pub struct VerificationRepository {
    pool: PgPool,
}

impl VerificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persists a new token hash with its purpose tag.
    pub async fn create(
        &self,
        realm_id: Uuid,
        user_id: Uuid,
        token_hash: &str,
        purpose: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<VerificationToken, ApiError> {
        let token = sqlx::query_as::<_, VerificationToken>(
            r#"
            INSERT INTO verification_tokens (
                realm_id, user_id, token_hash, purpose, expires_at
            )
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(realm_id)
        .bind(user_id)
        .bind(token_hash)
        .bind(purpose)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(token)
    }

    /// Atomically consumes a token, returning the owning user id.
    ///
    /// The row is deleted iff it exists with the expected purpose and has
    /// not expired. Anything else returns `None` and leaves no trace to
    /// retry against.
    pub async fn consume(
        &self,
        realm_id: Uuid,
        token_hash: &str,
        purpose: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, ApiError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            DELETE FROM verification_tokens
            WHERE realm_id = $1
              AND token_hash = $2
              AND purpose = $3
              AND expires_at > $4
            RETURNING user_id
            "#,
        )
        .bind(realm_id)
        .bind(token_hash)
        .bind(purpose)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(user_id,)| user_id))
    }

    /// Drops any outstanding tokens of one purpose for a user, e.g. before
    /// issuing a fresh password-reset link.
    pub async fn delete_for_user(
        &self,
        user_id: Uuid,
        purpose: &str,
    ) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            DELETE FROM verification_tokens
            WHERE user_id = $1 AND purpose = $2
            "#,
        )
        .bind(user_id)
        .bind(purpose)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Deletes expired tokens.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            DELETE FROM verification_tokens WHERE expires_at < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
