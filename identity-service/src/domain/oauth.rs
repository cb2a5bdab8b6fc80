//! # OAuth Flow Entities
//!
//! The transient state of the authorization machinery: single-use
//! authorization codes, device-flow codes, persistent consent grants, and
//! the short-lived consent requests that bridge login and approval.
//!
//! ## Lifecycle
//!
//! | Entity | Lifetime | Deleted on |
//! |--------|----------|------------|
//! | [`AuthorizationCode`] | 60 s | consumption or sweep |
//! | [`DeviceCode`] | 600 s | completion or sweep |
//! | [`ConsentRequest`] | 10 min | read (rotated) or sweep |
//! | [`UserConsent`] | indefinite | user/admin revocation |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The OAuth parameters of an authorization request, carried through the
/// login state machine (query string → MFA challenge → consent request)
/// so the flow can resume exactly where it started after every detour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuthParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub redirect_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,
}

impl OAuthParams {
    /// Re-encodes the parameters as a query string, for redirects back into
    /// the login flow.
    pub fn to_query(&self) -> String {
        serde_urlencoded::to_string(self).unwrap_or_default()
    }

    /// Whether this is an actual authorization request. The login pages
    /// also serve bare sign-ins with no OAuth parameters at all.
    pub fn is_present(&self) -> bool {
        !self.client_id.is_empty()
    }

    /// Scope parameter split on whitespace.
    pub fn requested_scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

/// Single-use authorization code row. `consumed` flips exactly once via a
/// conditional UPDATE; the losing side of a concurrent exchange sees zero
/// affected rows.
#[derive(Debug, Clone, FromRow)]
pub struct AuthorizationCode {
    pub id: Uuid,
    pub realm_id: Uuid,
    /// SHA-256 hex of the code handed to the client
    pub code_hash: String,
    pub client_pk: Uuid,
    pub user_id: Uuid,
    pub session_id: Option<Uuid>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub auth_time: DateTime<Utc>,
    pub consumed: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Data required to persist a new authorization code.
#[derive(Debug, Clone)]
pub struct NewAuthorizationCode {
    pub realm_id: Uuid,
    pub code_hash: String,
    pub client_pk: Uuid,
    pub user_id: Uuid,
    pub session_id: Option<Uuid>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub auth_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Device flow states.
pub mod device_status {
    pub const PENDING: &str = "pending";
    pub const APPROVED: &str = "approved";
    pub const DENIED: &str = "denied";
    pub const EXPIRED: &str = "expired";
}

/// Re-exported name for signatures that pass a status string around.
pub type DeviceStatus = String;

/// Device authorization grant state (RFC 8628).
#[derive(Debug, Clone, FromRow)]
pub struct DeviceCode {
    pub id: Uuid,
    pub realm_id: Uuid,
    /// SHA-256 hex of the device code polled by the client
    pub device_code_hash: String,
    /// Human-readable code the user types at the verification URI
    pub user_code: String,
    pub client_pk: Uuid,
    pub scopes: Vec<String>,
    /// Minimum seconds between polls; faster polling earns `slow_down`
    pub interval_secs: i32,
    pub status: String,
    /// Set at approval time
    pub user_id: Option<Uuid>,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Data required to persist a new device code.
#[derive(Debug, Clone)]
pub struct NewDeviceCode {
    pub realm_id: Uuid,
    pub device_code_hash: String,
    pub user_code: String,
    pub client_pk: Uuid,
    pub scopes: Vec<String>,
    pub interval_secs: i32,
    pub expires_at: DateTime<Utc>,
}

/// Persistent record of scopes a user has granted to a client.
/// Granting again unions the scope sets.
#[derive(Debug, Clone, FromRow)]
pub struct UserConsent {
    pub user_id: Uuid,
    pub client_pk: Uuid,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserConsent {
    /// True iff every requested scope is already covered.
    pub fn covers(&self, requested: &[String]) -> bool {
        requested.iter().all(|s| self.scopes.contains(s))
    }
}

/// Transient consent request shown on the approval page.
///
/// Single-use: reading one deletes it and re-stores the payload under a
/// fresh id, so a stale form cannot be re-submitted.
#[derive(Debug, Clone, FromRow)]
pub struct ConsentRequest {
    pub id: Uuid,
    pub realm_id: Uuid,
    pub user_id: Uuid,
    pub client_pk: Uuid,
    pub scopes: Vec<String>,
    pub oauth_params: serde_json::Value,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_params_query_round_trip() {
        let params = OAuthParams {
            response_type: Some("code".to_string()),
            client_id: "app".to_string(),
            redirect_uri: "https://app.example/cb".to_string(),
            scope: Some("openid profile".to_string()),
            state: Some("xyz".to_string()),
            nonce: None,
            code_challenge: Some("E9Melhoa".to_string()),
            code_challenge_method: Some("S256".to_string()),
        };

        let query = params.to_query();
        let parsed: OAuthParams = serde_urlencoded::from_str(&query).unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn test_oauth_params_query_omits_absent_fields() {
        let params = OAuthParams {
            client_id: "app".to_string(),
            redirect_uri: "https://app.example/cb".to_string(),
            ..Default::default()
        };
        let query = params.to_query();
        assert!(!query.contains("nonce"));
        assert!(!query.contains("state"));
    }

    #[test]
    fn test_requested_scopes_split() {
        let params = OAuthParams {
            scope: Some("openid  profile email".to_string()),
            ..Default::default()
        };
        assert_eq!(params.requested_scopes(), vec!["openid", "profile", "email"]);

        let empty = OAuthParams::default();
        assert!(empty.requested_scopes().is_empty());
    }

    #[test]
    fn test_consent_covers() {
        let consent = UserConsent {
            user_id: Uuid::new_v4(),
            client_pk: Uuid::new_v4(),
            scopes: vec!["openid".to_string(), "profile".to_string()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(consent.covers(&["openid".to_string()]));
        assert!(consent.covers(&["openid".to_string(), "profile".to_string()]));
        assert!(!consent.covers(&["openid".to_string(), "email".to_string()]));
        assert!(consent.covers(&[]));
    }
}
