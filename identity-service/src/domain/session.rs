//! # Session and Refresh Token Entities
//!
//! An SSO session is the server-side record of a browser's authenticated
//! state; the cookie carries the raw token, the row stores its SHA-256 hash.
//! Refresh tokens hang off a session (one per client) and rotate on use:
//! every exchange revokes the presented token and issues a successor linked
//! via `parent_id`, forming the rotation chain that reuse detection walks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Browser SSO session row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SsoSession {
    pub id: Uuid,
    pub realm_id: Uuid,
    pub user_id: Uuid,
    /// SHA-256 hex of the cookie value
    pub token_hash: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub remember_me: bool,
    /// When the user actually authenticated; becomes the `auth_time` claim
    pub auth_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Data required to persist a new SSO session.
#[derive(Debug, Clone)]
pub struct NewSsoSession {
    pub realm_id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub remember_me: bool,
    pub auth_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Refresh token row.
///
/// `session_id` goes `None` when the origin session is deleted; offline
/// tokens (`is_offline`) stay valid in that state, regular tokens are
/// revoked before the session goes away.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,
    pub realm_id: Uuid,
    pub session_id: Option<Uuid>,
    pub client_pk: Uuid,
    pub user_id: Uuid,
    /// SHA-256 hex of the raw token
    pub token_hash: String,
    pub scopes: Vec<String>,
    pub is_offline: bool,
    pub revoked: bool,
    /// Predecessor in the rotation chain
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Data required to persist a new refresh token.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub realm_id: Uuid,
    pub session_id: Option<Uuid>,
    pub client_pk: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub scopes: Vec<String>,
    pub is_offline: bool,
    pub parent_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_refresh_token_struct() {
        let token = NewRefreshToken {
            realm_id: Uuid::new_v4(),
            session_id: Some(Uuid::new_v4()),
            client_pk: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "sha256-hex".to_string(),
            scopes: vec!["openid".to_string(), "offline_access".to_string()],
            is_offline: true,
            parent_id: None,
            expires_at: Utc::now(),
        };

        assert!(token.is_offline);
        assert!(token.parent_id.is_none());
        assert_eq!(token.scopes.len(), 2);
    }
}
