//! # Consent Repository
//!
//! Persistent per-(user, client) scope grants and the transient consent
//! requests backing the approval page. Granting unions scope sets in SQL;
//! taking a transient request is a DELETE..RETURNING so it can only happen
//! once.

use chrono::{DateTime, Utc};
use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{ConsentRequest, UserConsent};

/// Repository for consent state.
#[derive(Debug, Clone)]
pub struct ConsentRepository {
    pool: PgPool,
}

impl ConsentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // PERSISTENT GRANTS
    // =========================================================================

    /// The stored grant for a (user, client) pair, if any.
    pub async fn find(
        &self,
        user_id: Uuid,
        client_pk: Uuid,
    ) -> Result<Option<UserConsent>, ApiError> {
        let consent = sqlx::query_as::<_, UserConsent>(
            r#"
            SELECT * FROM user_consents
            WHERE user_id = $1 AND client_pk = $2
            "#,
        )
        .bind(user_id)
        .bind(client_pk)
        .fetch_optional(&self.pool)
        .await?;

        Ok(consent)
    }

    /// Grants scopes, unioning with anything previously granted.
    pub async fn grant(
        &self,
        user_id: Uuid,
        client_pk: Uuid,
        scopes: &[String],
        now: DateTime<Utc>,
    ) -> Result<UserConsent, ApiError> {
        let consent = sqlx::query_as::<_, UserConsent>(
            r#"
            INSERT INTO user_consents (user_id, client_pk, scopes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (user_id, client_pk) DO UPDATE
            SET scopes = ARRAY(
                    SELECT DISTINCT s FROM unnest(user_consents.scopes || EXCLUDED.scopes) AS s
                    ORDER BY s
                ),
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(client_pk)
        .bind(scopes)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(consent)
    }

    /// Removes the grant for a (user, client) pair.
    pub async fn revoke(&self, user_id: Uuid, client_pk: Uuid) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            DELETE FROM user_consents
            WHERE user_id = $1 AND client_pk = $2
            "#,
        )
        .bind(user_id)
        .bind(client_pk)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // TRANSIENT CONSENT REQUESTS
    // =========================================================================

    /// Stores a transient consent request and returns its opaque id.
    pub async fn create_request(
        &self,
        realm_id: Uuid,
        user_id: Uuid,
        client_pk: Uuid,
        scopes: &[String],
        oauth_params: &serde_json::Value,
        expires_at: DateTime<Utc>,
    ) -> Result<ConsentRequest, ApiError> {
        let request = sqlx::query_as::<_, ConsentRequest>(
            r#"
            INSERT INTO consent_requests (
                realm_id, user_id, client_pk, scopes, oauth_params, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(realm_id)
        .bind(user_id)
        .bind(client_pk)
        .bind(scopes)
        .bind(oauth_params)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(request)
    }

    /// Atomically takes a transient request: the row is deleted in the same
    /// statement that reads it. Callers re-store under a fresh id when the
    /// flow continues (read-and-rotate).
    pub async fn take_request(
        &self,
        realm_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ConsentRequest>, ApiError> {
        let request = sqlx::query_as::<_, ConsentRequest>(
            r#"
            DELETE FROM consent_requests
            WHERE realm_id = $1 AND id = $2 AND expires_at > $3
            RETURNING *
            "#,
        )
        .bind(realm_id)
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(request)
    }

    /// Deletes expired consent requests.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            DELETE FROM consent_requests WHERE expires_at < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
