//! # Event Repository
//!
//! Append-only audit rows plus the retention sweep. The append runs on the
//! background writer task, never on a request path.

use chrono::{DateTime, Utc};
use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{EventRecord, NewEvent};

/// Repository for audit events.
#[derive(Debug, Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends one event. Realms with event recording switched off absorb
    /// the write silently; the filter lives in the INSERT itself.
    pub async fn append(&self, event: &NewEvent, now: DateTime<Utc>) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO events (
                realm_id, category, event_type, user_id, client_id,
                ip_address, error, details, created_at
            )
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9
            FROM realms r
            WHERE r.id = $1 AND r.events_enabled
            "#,
        )
        .bind(event.realm_id)
        .bind(event.category.as_str())
        .bind(&event.event_type)
        .bind(event.user_id)
        .bind(&event.client_id)
        .bind(&event.ip_address)
        .bind(&event.error)
        .bind(&event.details)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Recent events of a realm, newest first.
    pub async fn recent(&self, realm_id: Uuid, limit: i64) -> Result<Vec<EventRecord>, ApiError> {
        let events = sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT * FROM events
            WHERE realm_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(realm_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Deletes events past each realm's retention window.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            DELETE FROM events e
            USING realms r
            WHERE e.realm_id = r.id
              AND e.created_at < $1 - make_interval(secs => r.events_expiration_secs)
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
