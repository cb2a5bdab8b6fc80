//! # Brute-Force Guard Repository
//!
//! Login failure bookkeeping with per-user serialization. The record path
//! takes a row lock on the user (`SELECT ... FOR UPDATE`) before counting
//! and inserting, so two concurrent bad attempts cannot both read N-1
//! failures and slip past the limit together.

use chrono::{DateTime, Utc};
use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

/// Snapshot of a user's failure state inside the guarded transaction.
#[derive(Debug, Clone, Copy)]
pub struct FailureState {
    /// Failures within the reset window, including the one just recorded
    pub recent_failures: i64,
    /// Timestamp of the newest failure
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Completed lockouts so far (for the permanent threshold)
    pub lockout_count: i32,
    /// Whether the account is permanently locked
    pub permanently_locked: bool,
}

/// Repository for login failures and lockout bookkeeping.
#[derive(Debug, Clone)]
pub struct GuardRepository {
    pool: PgPool,
}

impl GuardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Reads the current failure state without recording anything.
    pub async fn failure_state(
        &self,
        realm_id: Uuid,
        user_id: Uuid,
        window_start: DateTime<Utc>,
    ) -> Result<FailureState, ApiError> {
        let row: (i64, Option<DateTime<Utc>>, i32, bool) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM login_failures
                  WHERE realm_id = $1 AND user_id = $2 AND created_at >= $3),
                (SELECT MAX(created_at) FROM login_failures
                  WHERE realm_id = $1 AND user_id = $2),
                u.lockout_count,
                u.permanently_locked
            FROM users u
            WHERE u.id = $2
            "#,
        )
        .bind(realm_id)
        .bind(user_id)
        .bind(window_start)
        .fetch_one(&self.pool)
        .await?;

        Ok(FailureState {
            recent_failures: row.0,
            last_failure_at: row.1,
            lockout_count: row.2,
            permanently_locked: row.3,
        })
    }

    /// Records a failure and returns the post-insert state, serialized per
    /// user via a row lock on the user record.
    ///
    /// When the failure that crosses `max_failures` lands, the user's
    /// lockout counter is incremented in the same transaction, and the
    /// account flips to permanently locked once the counter reaches
    /// `permanent_after` (when that threshold is positive).
    #[allow(clippy::too_many_arguments)]
    pub async fn record_failure(
        &self,
        realm_id: Uuid,
        user_id: Uuid,
        ip_address: Option<&str>,
        now: DateTime<Utc>,
        window_start: DateTime<Utc>,
        max_failures: i64,
        permanent_after: i32,
    ) -> Result<FailureState, ApiError> {
        let mut tx = self.pool.begin().await?;

        // Per-user serialization point
        let locked: (i32, bool) = sqlx::query_as(
            r#"
            SELECT lockout_count, permanently_locked FROM users
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO login_failures (realm_id, user_id, ip_address, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(realm_id)
        .bind(user_id)
        .bind(ip_address)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let counted: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM login_failures
            WHERE realm_id = $1 AND user_id = $2 AND created_at >= $3
            "#,
        )
        .bind(realm_id)
        .bind(user_id)
        .bind(window_start)
        .fetch_one(&mut *tx)
        .await?;

        let mut lockout_count = locked.0;
        let mut permanently_locked = locked.1;

        // The attempt that crosses the limit completes a lockout
        if counted.0 == max_failures {
            lockout_count += 1;
            permanently_locked =
                permanently_locked || (permanent_after > 0 && lockout_count >= permanent_after);

            sqlx::query(
                r#"
                UPDATE users
                SET lockout_count = $1, permanently_locked = $2
                WHERE id = $3
                "#,
            )
            .bind(lockout_count)
            .bind(permanently_locked)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(FailureState {
            recent_failures: counted.0,
            last_failure_at: Some(now),
            lockout_count,
            permanently_locked,
        })
    }

    /// Clears all recorded failures for a user (successful login or admin
    /// unlock).
    pub async fn reset_failures(&self, realm_id: Uuid, user_id: Uuid) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            DELETE FROM login_failures
            WHERE realm_id = $1 AND user_id = $2
            "#,
        )
        .bind(realm_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Admin unlock: clears failures and the permanent lock flag.
    pub async fn unlock(&self, realm_id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM login_failures WHERE realm_id = $1 AND user_id = $2
            "#,
        )
        .bind(realm_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE users
            SET permanently_locked = FALSE, lockout_count = 0
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Deletes failures older than the largest plausible window.
    pub async fn sweep_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            DELETE FROM login_failures WHERE created_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
