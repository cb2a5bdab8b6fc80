//! # Device Code Repository
//!
//! Device authorization flow state (RFC 8628). Poll pacing is enforced in
//! SQL: the poll UPDATE only stamps `last_polled_at` when the interval has
//! elapsed, so a too-eager client is detected without a read-modify-write
//! race.

use chrono::{DateTime, Duration, Utc};
use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{DeviceCode, NewDeviceCode};

/// Outcome of a poll attempt at the token endpoint.
#[derive(Debug, Clone)]
pub enum DevicePoll {
    /// No such device code
    Unknown,
    /// The code existed but its lifetime ran out
    Expired,
    /// Client polled faster than the mandated interval
    TooFast,
    /// Current state of the grant
    State(DeviceCode),
}

/// Repository for device codes.
#[derive(Debug, Clone)]
pub struct DeviceRepository {
    pool: PgPool,
}

impl DeviceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persists a new device code.
    pub async fn create(&self, new: NewDeviceCode) -> Result<DeviceCode, ApiError> {
        let code = sqlx::query_as::<_, DeviceCode>(
            r#"
            INSERT INTO device_codes (
                realm_id, device_code_hash, user_code, client_pk,
                scopes, interval_secs, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(new.realm_id)
        .bind(&new.device_code_hash)
        .bind(&new.user_code)
        .bind(new.client_pk)
        .bind(&new.scopes)
        .bind(new.interval_secs)
        .bind(new.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(code)
    }

    /// Records a poll and returns the grant state.
    ///
    /// The interval check and the `last_polled_at` stamp happen in one
    /// UPDATE; zero affected rows on a live code means the client polled
    /// too fast.
    pub async fn poll(
        &self,
        realm_id: Uuid,
        device_code_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<DevicePoll, ApiError> {
        let stamped = sqlx::query_as::<_, DeviceCode>(
            r#"
            UPDATE device_codes
            SET last_polled_at = $3
            WHERE realm_id = $1
              AND device_code_hash = $2
              AND expires_at > $3
              AND (last_polled_at IS NULL
                   OR last_polled_at + make_interval(secs => interval_secs) <= $3)
            RETURNING *
            "#,
        )
        .bind(realm_id)
        .bind(device_code_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(code) = stamped {
            return Ok(DevicePoll::State(code));
        }

        // Distinguish "too fast" from "expired" from "gone"
        let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
            r#"
            SELECT expires_at FROM device_codes
            WHERE realm_id = $1 AND device_code_hash = $2
            "#,
        )
        .bind(realm_id)
        .bind(device_code_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((expires_at,)) if expires_at > now => DevicePoll::TooFast,
            Some(_) => DevicePoll::Expired,
            None => DevicePoll::Unknown,
        })
    }

    /// Finds a pending device code by its human-readable user code.
    pub async fn find_pending_by_user_code(
        &self,
        realm_id: Uuid,
        user_code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DeviceCode>, ApiError> {
        let code = sqlx::query_as::<_, DeviceCode>(
            r#"
            SELECT * FROM device_codes
            WHERE realm_id = $1
              AND user_code = $2
              AND status = 'pending'
              AND expires_at > $3
            "#,
        )
        .bind(realm_id)
        .bind(user_code)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(code)
    }

    /// Resolves a pending grant to approved (with the approving user) or
    /// denied. Only pending rows transition.
    pub async fn resolve(
        &self,
        id: Uuid,
        approved: bool,
        user_id: Option<Uuid>,
    ) -> Result<bool, ApiError> {
        let status = if approved { "approved" } else { "denied" };

        let result = sqlx::query(
            r#"
            UPDATE device_codes
            SET status = $1, user_id = $2
            WHERE id = $3 AND status = 'pending'
            "#,
        )
        .bind(status)
        .bind(user_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Deletes a device code once tokens have been issued for it, making
    /// the grant single-use.
    pub async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            DELETE FROM device_codes WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes expired device codes; grants that never completed just age
    /// out.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            DELETE FROM device_codes WHERE expires_at < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Grace window helper used in tests to reason about pacing.
    pub fn next_allowed_poll(last: Option<DateTime<Utc>>, interval_secs: i32) -> Option<DateTime<Utc>> {
        last.map(|t| t + Duration::seconds(interval_secs as i64))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_allowed_poll() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        assert_eq!(DeviceRepository::next_allowed_poll(None, 5), None);
        assert_eq!(
            DeviceRepository::next_allowed_poll(Some(t0), 5),
            Some(t0 + Duration::seconds(5))
        );
    }
}
