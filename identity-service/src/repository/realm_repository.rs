//! # Realm Repository
//!
//! Lookup and lifecycle of realm rows. The hot path is `find_by_name`,
//! called once per request by the realm context extractor (and served from
//! the realm cache most of the time).

use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::Realm;

/// Repository for realm rows.
#[derive(Debug, Clone)]
pub struct RealmRepository {
    pool: PgPool,
}

impl RealmRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Finds a realm by its URL name.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Realm>, ApiError> {
        let realm = sqlx::query_as::<_, Realm>(
            r#"
            SELECT * FROM realms
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(realm)
    }

    /// Finds a realm by primary key.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Realm>, ApiError> {
        let realm = sqlx::query_as::<_, Realm>(
            r#"
            SELECT * FROM realms
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(realm)
    }

    /// Creates a realm with default policies.
    ///
    /// Everything beyond name and display name starts at the schema
    /// defaults and is tuned afterwards.
    pub async fn create(&self, name: &str, display_name: &str) -> Result<Realm, ApiError> {
        let realm = sqlx::query_as::<_, Realm>(
            r#"
            INSERT INTO realms (name, display_name)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(display_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.constraint() == Some("realms_name_key") {
                    return ApiError::Conflict {
                        resource: format!("realm:{}", name),
                    };
                }
            }
            ApiError::Database(e)
        })?;

        Ok(realm)
    }
}
