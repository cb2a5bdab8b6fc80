//! # MFA Repository
//!
//! TOTP credentials, recovery codes, and MFA challenges. Two operations
//! here are race-sensitive and resolved in SQL:
//!
//! - **Replay rejection**: accepting a TOTP code advances
//!   `last_used_counter` with a conditional UPDATE; a second submission of
//!   the same code in the same window finds the counter already there and
//!   fails.
//! - **Attempt counting**: a challenge attempt increments atomically and
//!   only while under the limit and unexpired; the losing side of any race
//!   sees no row and restarts the login.

use chrono::{DateTime, Utc};
use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::mfa::{MfaChallenge, RecoveryCode, TotpCredential, MFA_MAX_ATTEMPTS};

/// Repository for MFA state.
#[derive(Debug, Clone)]
pub struct MfaRepository {
    pool: PgPool,
}

impl MfaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // TOTP CREDENTIALS
    // =========================================================================

    /// The user's TOTP credential, pending or enabled.
    pub async fn find_totp(&self, user_id: Uuid) -> Result<Option<TotpCredential>, ApiError> {
        let credential = sqlx::query_as::<_, TotpCredential>(
            r#"
            SELECT * FROM totp_credentials WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(credential)
    }

    /// Starts (or restarts) enrolment with a fresh pending secret.
    /// A pending credential is replaced wholesale; an enabled one is not
    /// touched by this call.
    pub async fn upsert_pending_totp(
        &self,
        realm_id: Uuid,
        user_id: Uuid,
        encrypted_secret: &str,
        algorithm: &str,
        digits: i32,
        period_secs: i32,
    ) -> Result<TotpCredential, ApiError> {
        let credential = sqlx::query_as::<_, TotpCredential>(
            r#"
            INSERT INTO totp_credentials (
                user_id, realm_id, encrypted_secret, algorithm, digits,
                period_secs, enabled
            )
            VALUES ($1, $2, $3, $4, $5, $6, FALSE)
            ON CONFLICT (user_id) DO UPDATE
            SET encrypted_secret = EXCLUDED.encrypted_secret,
                algorithm = EXCLUDED.algorithm,
                digits = EXCLUDED.digits,
                period_secs = EXCLUDED.period_secs,
                enabled = FALSE,
                last_used_counter = NULL
            WHERE totp_credentials.enabled = FALSE
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(realm_id)
        .bind(encrypted_secret)
        .bind(algorithm)
        .bind(digits)
        .bind(period_secs)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::Conflict {
            resource: "totp credential already enabled".to_string(),
        })?;

        Ok(credential)
    }

    /// Completes enrolment: flips the pending credential to enabled.
    pub async fn enable_totp(&self, user_id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE totp_credentials
            SET enabled = TRUE
            WHERE user_id = $1 AND enabled = FALSE
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound {
                resource: format!("pending totp:{}", user_id),
            });
        }

        Ok(())
    }

    /// Removes a user's TOTP credential and recovery codes.
    pub async fn delete_totp(&self, user_id: Uuid) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM totp_credentials WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM recovery_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Advances the replay guard.
    ///
    /// Succeeds iff `counter` is strictly newer than the stored one, so a
    /// code can be accepted at most once per time-step.
    pub async fn advance_totp_counter(&self, user_id: Uuid, counter: i64) -> Result<bool, ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE totp_credentials
            SET last_used_counter = $2
            WHERE user_id = $1
              AND (last_used_counter IS NULL OR last_used_counter < $2)
            "#,
        )
        .bind(user_id)
        .bind(counter)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // RECOVERY CODES
    // =========================================================================

    /// Replaces the user's recovery codes with a new hashed set.
    pub async fn replace_recovery_codes(
        &self,
        user_id: Uuid,
        code_hashes: &[String],
    ) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM recovery_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for hash in code_hashes {
            sqlx::query(
                r#"
                INSERT INTO recovery_codes (user_id, code_hash)
                VALUES ($1, $2)
                "#,
            )
            .bind(user_id)
            .bind(hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// Consumes a recovery code: marks it used iff it was unused.
    pub async fn use_recovery_code(
        &self,
        user_id: Uuid,
        code_hash: &str,
    ) -> Result<bool, ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE recovery_codes
            SET used = TRUE
            WHERE user_id = $1 AND code_hash = $2 AND used = FALSE
            "#,
        )
        .bind(user_id)
        .bind(code_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Unused recovery codes remaining for a user.
    pub async fn remaining_recovery_codes(&self, user_id: Uuid) -> Result<i64, ApiError> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM recovery_codes
            WHERE user_id = $1 AND used = FALSE
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }

    /// All recovery code rows for a user (hashes only).
    pub async fn recovery_codes(&self, user_id: Uuid) -> Result<Vec<RecoveryCode>, ApiError> {
        let codes = sqlx::query_as::<_, RecoveryCode>(
            r#"
            SELECT * FROM recovery_codes WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(codes)
    }

    // =========================================================================
    // MFA CHALLENGES
    // =========================================================================

    /// Persists a new challenge.
    pub async fn create_challenge(
        &self,
        realm_id: Uuid,
        user_id: Uuid,
        token_hash: &str,
        oauth_params: &serde_json::Value,
        remember_me: bool,
        expires_at: DateTime<Utc>,
    ) -> Result<MfaChallenge, ApiError> {
        let challenge = sqlx::query_as::<_, MfaChallenge>(
            r#"
            INSERT INTO mfa_challenges (
                realm_id, user_id, token_hash, oauth_params, remember_me, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(realm_id)
        .bind(user_id)
        .bind(token_hash)
        .bind(oauth_params)
        .bind(remember_me)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(challenge)
    }

    /// Registers a verification attempt against a challenge.
    ///
    /// Atomically increments the attempt counter while the challenge is
    /// live and under the limit, returning the updated row. `None` means
    /// expired, missing, or out of attempts; the caller clears the cookie
    /// and restarts login.
    pub async fn register_challenge_attempt(
        &self,
        realm_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MfaChallenge>, ApiError> {
        let challenge = sqlx::query_as::<_, MfaChallenge>(
            r#"
            UPDATE mfa_challenges
            SET attempt_count = attempt_count + 1
            WHERE realm_id = $1
              AND token_hash = $2
              AND expires_at > $3
              AND attempt_count < $4
            RETURNING *
            "#,
        )
        .bind(realm_id)
        .bind(token_hash)
        .bind(now)
        .bind(MFA_MAX_ATTEMPTS)
        .fetch_optional(&self.pool)
        .await?;

        Ok(challenge)
    }

    /// Peeks at a live challenge without spending an attempt (used by the
    /// GET that renders the TOTP form).
    pub async fn find_live_challenge(
        &self,
        realm_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MfaChallenge>, ApiError> {
        let challenge = sqlx::query_as::<_, MfaChallenge>(
            r#"
            SELECT * FROM mfa_challenges
            WHERE realm_id = $1
              AND token_hash = $2
              AND expires_at > $3
              AND attempt_count < $4
            "#,
        )
        .bind(realm_id)
        .bind(token_hash)
        .bind(now)
        .bind(MFA_MAX_ATTEMPTS)
        .fetch_optional(&self.pool)
        .await?;

        Ok(challenge)
    }

    /// Deletes a challenge after success or invalidation.
    pub async fn delete_challenge(&self, id: Uuid) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM mfa_challenges WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Deletes expired and exhausted challenges.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            DELETE FROM mfa_challenges
            WHERE expires_at < $1 OR attempt_count >= $2
            "#,
        )
        .bind(now)
        .bind(MFA_MAX_ATTEMPTS)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
