//! # Signing Key Repository
//!
//! Storage for per-realm RSA signing keys. Multiple keys can be active
//! during rotation; the newest active key signs, all active keys verify
//! and publish via JWKS.

use shared::crypto::keys::GeneratedSigningKey;
use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::RealmSigningKey;

/// Repository for realm signing keys.
#[derive(Debug, Clone)]
pub struct KeyRepository {
    pool: PgPool,
}

impl KeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persists a freshly generated key as active.
    pub async fn insert(
        &self,
        realm_id: Uuid,
        key: &GeneratedSigningKey,
    ) -> Result<RealmSigningKey, ApiError> {
        let stored = sqlx::query_as::<_, RealmSigningKey>(
            r#"
            INSERT INTO realm_signing_keys (
                realm_id, kid, public_key_pem, private_key_pem
            )
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(realm_id)
        .bind(&key.kid)
        .bind(&key.public_key_pem)
        .bind(&key.private_key_pem)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    /// Every active key of a realm, newest first.
    pub async fn active_keys(&self, realm_id: Uuid) -> Result<Vec<RealmSigningKey>, ApiError> {
        let keys = sqlx::query_as::<_, RealmSigningKey>(
            r#"
            SELECT * FROM realm_signing_keys
            WHERE realm_id = $1 AND active
            ORDER BY created_at DESC
            "#,
        )
        .bind(realm_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    /// Retires a key. Verification of already-issued tokens stops once the
    /// key goes inactive, so rotation keeps old keys active until the
    /// longest-lived token signed with them has expired.
    pub async fn deactivate(&self, realm_id: Uuid, kid: &str) -> Result<(), ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE realm_signing_keys
            SET active = FALSE
            WHERE realm_id = $1 AND kid = $2 AND active
            "#,
        )
        .bind(realm_id)
        .bind(kid)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound {
                resource: format!("signing key:{}", kid),
            });
        }

        Ok(())
    }
}
