//! # User Repository
//!
//! User rows plus the password-history bookkeeping that belongs to them.
//! Every lookup is realm-scoped; a user id from one realm never resolves
//! in another.

use chrono::{DateTime, Utc};
use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{NewUser, User};

/// Repository for user rows and password history.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // USER OPERATIONS
    // =========================================================================

    /// Creates a new user.
    ///
    /// # Errors
    ///
    /// - `ApiError::Conflict` if the username or email is taken in the realm
    pub async fn create(&self, new_user: NewUser, now: DateTime<Utc>) -> Result<User, ApiError> {
        let password_changed_at = new_user.password_hash.as_ref().map(|_| now);

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                realm_id, username, email, first_name, last_name,
                password_hash, password_changed_at, federation_link, email_verified
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(new_user.realm_id)
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.password_hash)
        .bind(password_changed_at)
        .bind(&new_user.federation_link)
        .bind(new_user.email_verified)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                match db_err.constraint() {
                    Some("users_realm_id_username_key") => {
                        return ApiError::Conflict {
                            resource: "username".to_string(),
                        }
                    }
                    Some("users_realm_email_key") => {
                        return ApiError::Conflict {
                            resource: "email".to_string(),
                        }
                    }
                    _ => {}
                }
            }
            ApiError::Database(e)
        })?;

        Ok(user)
    }

    /// Finds a user by username within a realm.
    pub async fn find_by_username(
        &self,
        realm_id: Uuid,
        username: &str,
    ) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE realm_id = $1 AND username = $2
            "#,
        )
        .bind(realm_id)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Finds a user by email within a realm.
    pub async fn find_by_email(
        &self,
        realm_id: Uuid,
        email: &str,
    ) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE realm_id = $1 AND email = $2
            "#,
        )
        .bind(realm_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Finds a user by id within a realm.
    pub async fn find_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE realm_id = $1 AND id = $2
            "#,
        )
        .bind(realm_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Updates a user's password hash.
    ///
    /// Stamps `password_changed_at` and clears any forced-change flag.
    pub async fn update_password(
        &self,
        user_id: Uuid,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $1,
                password_changed_at = $2,
                update_password_required = FALSE,
                updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(new_password_hash)
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound {
                resource: format!("user:{}", user_id),
            });
        }

        Ok(())
    }

    /// Marks a user's email as verified.
    pub async fn set_email_verified(&self, user_id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email_verified = TRUE, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound {
                resource: format!("user:{}", user_id),
            });
        }

        Ok(())
    }

    /// Deletes a user. Sessions, tokens, consents, credentials, and history
    /// go with it via foreign-key cascade.
    pub async fn delete(&self, realm_id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query(
            r#"
            DELETE FROM users
            WHERE realm_id = $1 AND id = $2
            "#,
        )
        .bind(realm_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound {
                resource: format!("user:{}", user_id),
            });
        }

        Ok(())
    }

    /// Checks if a username is taken within a realm.
    pub async fn username_exists(&self, realm_id: Uuid, username: &str) -> Result<bool, ApiError> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM users
            WHERE realm_id = $1 AND username = $2
            "#,
        )
        .bind(realm_id)
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0 > 0)
    }

    // =========================================================================
    // PASSWORD HISTORY
    // =========================================================================

    /// Returns the most recent `n` password hashes for a user, newest first.
    pub async fn recent_password_hashes(
        &self,
        user_id: Uuid,
        n: i64,
    ) -> Result<Vec<String>, ApiError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT password_hash FROM password_history
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(n)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(h,)| h).collect())
    }

    /// Appends a hash to the password history and prunes to the retention
    /// count.
    pub async fn add_password_history(
        &self,
        realm_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
        keep: i64,
    ) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO password_history (user_id, realm_id, password_hash)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(realm_id)
        .bind(password_hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM password_history
            WHERE user_id = $1
              AND id NOT IN (
                  SELECT id FROM password_history
                  WHERE user_id = $1
                  ORDER BY created_at DESC
                  LIMIT $2
              )
            "#,
        )
        .bind(user_id)
        .bind(keep)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
