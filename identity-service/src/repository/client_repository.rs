//! # Client Repository
//!
//! Clients, their scope assignments, and the protocol mappers hanging off
//! those scopes. The token factory pulls its mapper set through here.

use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::client::{Client, ClientScope, ProtocolMapper};

/// A scope together with how it is attached to the client.
#[derive(Debug, Clone)]
pub struct AssignedScope {
    pub scope: ClientScope,
    /// `default` or `optional`
    pub assignment: String,
}

/// Repository for client rows and their scope wiring.
#[derive(Debug, Clone)]
pub struct ClientRepository {
    pool: PgPool,
}

impl ClientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Finds a client by its public OAuth identifier within a realm.
    pub async fn find_by_client_id(
        &self,
        realm_id: Uuid,
        client_id: &str,
    ) -> Result<Option<Client>, ApiError> {
        let client = sqlx::query_as::<_, Client>(
            r#"
            SELECT * FROM clients
            WHERE realm_id = $1 AND client_id = $2
            "#,
        )
        .bind(realm_id)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }

    /// Finds a client by primary key.
    pub async fn find_by_pk(&self, pk: Uuid) -> Result<Option<Client>, ApiError> {
        let client = sqlx::query_as::<_, Client>(
            r#"
            SELECT * FROM clients
            WHERE id = $1
            "#,
        )
        .bind(pk)
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }

    /// Rotates a confidential client's secret hash.
    /// The caller generated the plaintext and returns it exactly once.
    pub async fn update_secret_hash(&self, pk: Uuid, secret_hash: &str) -> Result<(), ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE clients
            SET secret_hash = $1, updated_at = NOW()
            WHERE id = $2 AND client_type = 'confidential'
            "#,
        )
        .bind(secret_hash)
        .bind(pk)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound {
                resource: format!("client:{}", pk),
            });
        }

        Ok(())
    }

    // =========================================================================
    // SCOPES AND MAPPERS
    // =========================================================================

    /// All scopes assigned to a client, with their assignment kind.
    pub async fn assigned_scopes(&self, client_pk: Uuid) -> Result<Vec<AssignedScope>, ApiError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            id: Uuid,
            realm_id: Uuid,
            name: String,
            description: Option<String>,
            built_in: bool,
            created_at: chrono::DateTime<chrono::Utc>,
            assignment: String,
        }

        let rows: Vec<Row> = sqlx::query_as(
            r#"
            SELECT s.id, s.realm_id, s.name, s.description, s.built_in,
                   s.created_at, a.assignment
            FROM client_scope_assignments a
            JOIN client_scopes s ON s.id = a.scope_id
            WHERE a.client_pk = $1
            ORDER BY s.name
            "#,
        )
        .bind(client_pk)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| AssignedScope {
                scope: ClientScope {
                    id: r.id,
                    realm_id: r.realm_id,
                    name: r.name,
                    description: r.description,
                    built_in: r.built_in,
                    created_at: r.created_at,
                },
                assignment: r.assignment,
            })
            .collect())
    }

    /// Creates a client scope. Existing scopes of the same name are left
    /// untouched and returned as-is.
    pub async fn ensure_scope(
        &self,
        realm_id: Uuid,
        name: &str,
        description: Option<&str>,
        built_in: bool,
    ) -> Result<ClientScope, ApiError> {
        if let Some(existing) = sqlx::query_as::<_, ClientScope>(
            r#"
            SELECT * FROM client_scopes WHERE realm_id = $1 AND name = $2
            "#,
        )
        .bind(realm_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(existing);
        }

        let scope = sqlx::query_as::<_, ClientScope>(
            r#"
            INSERT INTO client_scopes (realm_id, name, description, built_in)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(realm_id)
        .bind(name)
        .bind(description)
        .bind(built_in)
        .fetch_one(&self.pool)
        .await?;

        Ok(scope)
    }

    /// Attaches a protocol mapper to a scope.
    pub async fn add_mapper(
        &self,
        scope_id: Uuid,
        name: &str,
        mapper_type: &str,
        config: &serde_json::Value,
    ) -> Result<ProtocolMapper, ApiError> {
        let mapper = sqlx::query_as::<_, ProtocolMapper>(
            r#"
            INSERT INTO protocol_mappers (scope_id, name, mapper_type, config)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(scope_id)
        .bind(name)
        .bind(mapper_type)
        .bind(config)
        .fetch_one(&self.pool)
        .await?;

        Ok(mapper)
    }

    /// Assigns a scope to a client as `default` or `optional`, replacing
    /// any previous assignment kind.
    pub async fn assign_scope(
        &self,
        client_pk: Uuid,
        scope_id: Uuid,
        assignment: &str,
    ) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO client_scope_assignments (client_pk, scope_id, assignment)
            VALUES ($1, $2, $3)
            ON CONFLICT (client_pk, scope_id) DO UPDATE SET assignment = EXCLUDED.assignment
            "#,
        )
        .bind(client_pk)
        .bind(scope_id)
        .bind(assignment)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Protocol mappers attached to a realm's scopes, filtered by scope name.
    pub async fn mappers_for_scope_names(
        &self,
        realm_id: Uuid,
        scope_names: &[String],
    ) -> Result<Vec<ProtocolMapper>, ApiError> {
        let mappers = sqlx::query_as::<_, ProtocolMapper>(
            r#"
            SELECT m.* FROM protocol_mappers m
            JOIN client_scopes s ON s.id = m.scope_id
            WHERE s.realm_id = $1 AND s.name = ANY($2)
            "#,
        )
        .bind(realm_id)
        .bind(scope_names)
        .fetch_all(&self.pool)
        .await?;

        Ok(mappers)
    }
}
