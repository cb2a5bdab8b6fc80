//! # Authorization Code Repository
//!
//! Single-use codes. Consumption is one conditional UPDATE: of any number
//! of concurrent exchanges for the same code, exactly one gets the row
//! back, everyone else gets `None` and answers `invalid_grant`.

use chrono::{DateTime, Utc};
use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{AuthorizationCode, NewAuthorizationCode};

/// Repository for authorization codes.
#[derive(Debug, Clone)]
pub struct CodeRepository {
    pool: PgPool,
}

impl CodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persists a new authorization code.
    pub async fn create(&self, new: NewAuthorizationCode) -> Result<AuthorizationCode, ApiError> {
        let code = sqlx::query_as::<_, AuthorizationCode>(
            r#"
            INSERT INTO authorization_codes (
                realm_id, code_hash, client_pk, user_id, session_id,
                redirect_uri, scopes, nonce, code_challenge,
                code_challenge_method, auth_time, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(new.realm_id)
        .bind(&new.code_hash)
        .bind(new.client_pk)
        .bind(new.user_id)
        .bind(new.session_id)
        .bind(&new.redirect_uri)
        .bind(&new.scopes)
        .bind(&new.nonce)
        .bind(&new.code_challenge)
        .bind(&new.code_challenge_method)
        .bind(new.auth_time)
        .bind(new.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(code)
    }

    /// Atomically consumes a code.
    ///
    /// Flips `consumed` iff it was false and the code is unexpired,
    /// returning the row to the single winner.
    pub async fn consume(
        &self,
        realm_id: Uuid,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>, ApiError> {
        let code = sqlx::query_as::<_, AuthorizationCode>(
            r#"
            UPDATE authorization_codes
            SET consumed = TRUE
            WHERE realm_id = $1
              AND code_hash = $2
              AND consumed = FALSE
              AND expires_at > $3
            RETURNING *
            "#,
        )
        .bind(realm_id)
        .bind(code_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(code)
    }

    /// Deletes expired and consumed codes.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            DELETE FROM authorization_codes
            WHERE expires_at < $1 OR consumed = TRUE
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
