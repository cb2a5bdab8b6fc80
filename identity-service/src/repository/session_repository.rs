//! # Session and Refresh Token Repository
//!
//! SSO sessions and the refresh tokens bound to them, including the
//! rotation CAS that makes concurrent refreshes safe: the UPDATE that
//! revokes the presented token only matches an unrevoked row, so of two
//! racing exchanges exactly one sees `rows_affected = 1` and mints the
//! successor. The loser falls through to reuse handling.

use chrono::{DateTime, Utc};
use shared::errors::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{NewRefreshToken, NewSsoSession, RefreshToken, SsoSession};

/// Repository for SSO sessions and refresh tokens.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // SSO SESSIONS
    // =========================================================================

    /// Persists a new SSO session.
    pub async fn create_session(&self, new: NewSsoSession) -> Result<SsoSession, ApiError> {
        let session = sqlx::query_as::<_, SsoSession>(
            r#"
            INSERT INTO sso_sessions (
                realm_id, user_id, token_hash, ip_address, user_agent,
                remember_me, auth_time, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(new.realm_id)
        .bind(new.user_id)
        .bind(&new.token_hash)
        .bind(&new.ip_address)
        .bind(&new.user_agent)
        .bind(new.remember_me)
        .bind(new.auth_time)
        .bind(new.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    /// Looks up an unexpired session by cookie hash, realm-scoped.
    pub async fn find_valid_session(
        &self,
        realm_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SsoSession>, ApiError> {
        let session = sqlx::query_as::<_, SsoSession>(
            r#"
            SELECT * FROM sso_sessions
            WHERE realm_id = $1
              AND token_hash = $2
              AND expires_at > $3
            "#,
        )
        .bind(realm_id)
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Finds a session by id.
    pub async fn find_session_by_id(&self, id: Uuid) -> Result<Option<SsoSession>, ApiError> {
        let session = sqlx::query_as::<_, SsoSession>(
            r#"
            SELECT * FROM sso_sessions WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Deletes one session. Offline tokens keep living with `session_id`
    /// nulled by the FK; non-offline tokens must be revoked by the caller
    /// before this.
    pub async fn delete_session(&self, id: Uuid) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            DELETE FROM sso_sessions WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All live sessions of a user.
    pub async fn sessions_for_user(
        &self,
        realm_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<SsoSession>, ApiError> {
        let sessions = sqlx::query_as::<_, SsoSession>(
            r#"
            SELECT * FROM sso_sessions
            WHERE realm_id = $1 AND user_id = $2
            ORDER BY created_at
            "#,
        )
        .bind(realm_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    // =========================================================================
    // REFRESH TOKENS
    // =========================================================================

    /// Persists a new refresh token.
    pub async fn create_refresh_token(
        &self,
        new: NewRefreshToken,
        now: DateTime<Utc>,
    ) -> Result<RefreshToken, ApiError> {
        let token = sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (
                realm_id, session_id, client_pk, user_id, token_hash,
                scopes, is_offline, parent_id, created_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(new.realm_id)
        .bind(new.session_id)
        .bind(new.client_pk)
        .bind(new.user_id)
        .bind(&new.token_hash)
        .bind(&new.scopes)
        .bind(new.is_offline)
        .bind(new.parent_id)
        .bind(now)
        .bind(new.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(token)
    }

    /// Finds a refresh token by hash regardless of state. Reuse detection
    /// needs to see revoked rows too.
    pub async fn find_refresh_token(
        &self,
        realm_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, ApiError> {
        let token = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT * FROM refresh_tokens
            WHERE realm_id = $1 AND token_hash = $2
            "#,
        )
        .bind(realm_id)
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    /// Atomically claims a live refresh token for rotation.
    ///
    /// Marks the row revoked iff it was unrevoked and unexpired, returning
    /// it on success. A `None` means the token is missing, expired, or was
    /// already claimed: the caller distinguishes via
    /// [`find_refresh_token`](Self::find_refresh_token).
    pub async fn claim_for_rotation(
        &self,
        realm_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>, ApiError> {
        let token = sqlx::query_as::<_, RefreshToken>(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE realm_id = $1
              AND token_hash = $2
              AND revoked = FALSE
              AND expires_at > $3
            RETURNING *
            "#,
        )
        .bind(realm_id)
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    /// Revokes a single refresh token by hash. Idempotent; used by the
    /// revocation endpoint, which always answers 200.
    pub async fn revoke_by_hash(&self, realm_id: Uuid, token_hash: &str) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE realm_id = $1 AND token_hash = $2 AND revoked = FALSE
            "#,
        )
        .bind(realm_id)
        .bind(token_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Revokes a single refresh token by id (offline token management).
    pub async fn revoke_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE realm_id = $1 AND id = $2 AND revoked = FALSE
            "#,
        )
        .bind(realm_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Revokes every refresh token bound to a session, offline ones
    /// included. This is the reuse-detection hammer.
    pub async fn revoke_all_for_session(&self, session_id: Uuid) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE session_id = $1 AND revoked = FALSE
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Revokes the non-offline refresh tokens of a session. Used on
    /// logout, where offline tokens must survive.
    pub async fn revoke_online_for_session(&self, session_id: Uuid) -> Result<u64, ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE session_id = $1 AND is_offline = FALSE AND revoked = FALSE
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Distinct clients holding refresh tokens in a session. These are the
    /// session's participants for backchannel logout.
    pub async fn client_pks_for_session(&self, session_id: Uuid) -> Result<Vec<Uuid>, ApiError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT client_pk FROM refresh_tokens
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(pk,)| pk).collect())
    }

    /// Live offline tokens of a user, enumerable and individually
    /// revocable.
    pub async fn offline_tokens_for_user(
        &self,
        realm_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshToken>, ApiError> {
        let tokens = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT * FROM refresh_tokens
            WHERE realm_id = $1 AND user_id = $2
              AND is_offline = TRUE
              AND revoked = FALSE
              AND expires_at > $3
            ORDER BY created_at
            "#,
        )
        .bind(realm_id)
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(tokens)
    }

    // =========================================================================
    // SWEEP
    // =========================================================================

    /// Deletes expired sessions and expired or revoked refresh tokens.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, ApiError> {
        let mut removed = 0;

        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens WHERE expires_at < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        removed += result.rows_affected();

        let result = sqlx::query(
            r#"
            DELETE FROM sso_sessions WHERE expires_at < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        removed += result.rows_affected();

        Ok(removed)
    }
}
