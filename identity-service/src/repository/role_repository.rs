//! # Role and Group Repository
//!
//! Role claims come from two places: roles mapped directly to the user and
//! roles inherited through group membership, where a member of a group also
//! holds everything mapped to that group's ancestors. The effective-role
//! queries walk the group tree with a recursive CTE.

use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::client::Group;

/// Repository for roles, groups, and their mappings.
#[derive(Debug, Clone)]
pub struct RoleRepository {
    pool: PgPool,
}

impl RoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Effective realm-role names for a user: direct mappings plus group
    /// inheritance (including ancestor groups).
    pub async fn effective_realm_roles(&self, user_id: Uuid) -> Result<Vec<String>, ApiError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            WITH RECURSIVE member_groups AS (
                SELECT g.id, g.parent_id
                FROM user_groups ug
                JOIN groups g ON g.id = ug.group_id
                WHERE ug.user_id = $1
                UNION
                SELECT parent.id, parent.parent_id
                FROM groups parent
                JOIN member_groups child ON child.parent_id = parent.id
            )
            SELECT DISTINCT r.name
            FROM roles r
            WHERE r.client_pk IS NULL
              AND (
                  r.id IN (SELECT role_id FROM user_roles WHERE user_id = $1)
                  OR r.id IN (
                      SELECT gr.role_id FROM group_roles gr
                      WHERE gr.group_id IN (SELECT id FROM member_groups)
                  )
              )
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Effective client-role names for a user, grouped by the owning
    /// client's public identifier.
    pub async fn effective_client_roles(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(String, String)>, ApiError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            WITH RECURSIVE member_groups AS (
                SELECT g.id, g.parent_id
                FROM user_groups ug
                JOIN groups g ON g.id = ug.group_id
                WHERE ug.user_id = $1
                UNION
                SELECT parent.id, parent.parent_id
                FROM groups parent
                JOIN member_groups child ON child.parent_id = parent.id
            )
            SELECT DISTINCT c.client_id, r.name
            FROM roles r
            JOIN clients c ON c.id = r.client_pk
            WHERE r.client_pk IS NOT NULL
              AND (
                  r.id IN (SELECT role_id FROM user_roles WHERE user_id = $1)
                  OR r.id IN (
                      SELECT gr.role_id FROM group_roles gr
                      WHERE gr.group_id IN (SELECT id FROM member_groups)
                  )
              )
            ORDER BY c.client_id, r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // =========================================================================
    // GROUP TREE
    // =========================================================================

    /// Creates a group under `parent_id` (or at the root for `None`).
    ///
    /// Refuses inserts that would close a cycle: the parent chain is walked
    /// first and must terminate at a root.
    pub async fn create_group(
        &self,
        realm_id: Uuid,
        parent_id: Option<Uuid>,
        name: &str,
    ) -> Result<Group, ApiError> {
        if let Some(parent) = parent_id {
            self.assert_acyclic_parent_chain(parent).await?;
        }

        let group = sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO groups (realm_id, parent_id, name)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(realm_id)
        .bind(parent_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(group)
    }

    /// Re-parents a group, refusing moves that would make the group its own
    /// ancestor.
    pub async fn move_group(&self, group_id: Uuid, new_parent: Uuid) -> Result<(), ApiError> {
        // The new parent's ancestor chain must not contain the group itself
        let ancestors = self.ancestor_ids(new_parent).await?;
        if new_parent == group_id || ancestors.contains(&group_id) {
            return Err(ApiError::Conflict {
                resource: "group cycle".to_string(),
            });
        }

        sqlx::query(
            r#"
            UPDATE groups SET parent_id = $1 WHERE id = $2
            "#,
        )
        .bind(new_parent)
        .bind(group_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Ancestor chain of a group, nearest first.
    async fn ancestor_ids(&self, group_id: Uuid) -> Result<Vec<Uuid>, ApiError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            WITH RECURSIVE chain AS (
                SELECT id, parent_id, 0 AS depth FROM groups WHERE id = $1
                UNION ALL
                SELECT g.id, g.parent_id, chain.depth + 1
                FROM groups g
                JOIN chain ON chain.parent_id = g.id
                WHERE chain.depth < 64
            )
            SELECT id FROM chain WHERE id <> $1 ORDER BY depth
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn assert_acyclic_parent_chain(&self, parent: Uuid) -> Result<(), ApiError> {
        // Walking the chain also verifies the parent exists
        let exists: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM groups WHERE id = $1
            "#,
        )
        .bind(parent)
        .fetch_optional(&self.pool)
        .await?;

        if exists.is_none() {
            return Err(ApiError::NotFound {
                resource: format!("group:{}", parent),
            });
        }

        // Depth guard in ancestor_ids caps runaway chains
        self.ancestor_ids(parent).await?;
        Ok(())
    }
}
