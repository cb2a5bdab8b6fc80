//! # Client, Role, Group, and Scope Entities
//!
//! OAuth clients registered within a realm, plus the role/group/scope
//! structure that feeds claims into issued tokens.
//!
//! ```text
//! Client ──┬── redirect_uris (exact-match checked)
//!          ├── grant_types (subset of the five supported grants)
//!          ├── scope assignments: default | optional ──► ClientScope
//!          │                                                 └── ProtocolMapper*
//!          └── service account user (client_credentials only)
//!
//! Role  - realm role (client_pk NULL) or client role (client_pk set)
//! Group - tree via parent_id; members inherit the group's role mappings
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Client confidentiality classes.
pub mod client_types {
    /// Holds a secret; authenticates with `client_secret_basic`/`_post`
    pub const CONFIDENTIAL: &str = "confidential";
    /// No secret; must use PKCE for the code grant
    pub const PUBLIC: &str = "public";
}

/// OAuth grant type identifiers as they appear on the wire and in
/// `clients.grant_types`.
pub mod grant_types {
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const CLIENT_CREDENTIALS: &str = "client_credentials";
    pub const PASSWORD: &str = "password";
    pub const DEVICE_CODE: &str = "urn:ietf:params:oauth:grant-type:device_code";
}

/// Convenience alias used in signatures that switch on client type.
pub type ClientType = String;

/// OAuth client registered in a realm.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Client {
    /// Primary key (internal)
    pub id: Uuid,
    pub realm_id: Uuid,
    /// Public OAuth client identifier, unique within the realm
    pub client_id: String,
    /// `confidential` or `public`
    pub client_type: String,
    /// Hash of the client secret; confidential clients only.
    /// The plaintext secret is returned exactly once, at creation/rotation.
    pub secret_hash: Option<String>,
    /// Registered redirect URIs; authorization requests must match one
    /// byte-for-byte
    pub redirect_uris: Vec<String>,
    pub web_origins: Vec<String>,
    /// Enabled grants, drawn from [`grant_types`]
    pub grant_types: Vec<String>,
    /// When set, the user must approve the requested scopes before a code
    /// is issued (unless a covering consent is already on file)
    pub require_consent: bool,
    pub backchannel_logout_uri: Option<String>,
    pub backchannel_logout_session_required: bool,
    /// Present iff `client_credentials` is enabled
    pub service_account_user_id: Option<Uuid>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    pub fn is_public(&self) -> bool {
        self.client_type == client_types::PUBLIC
    }

    pub fn is_confidential(&self) -> bool {
        self.client_type == client_types::CONFIDENTIAL
    }

    /// Whether the given grant is enabled for this client.
    pub fn allows_grant(&self, grant: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant)
    }

    /// Exact-match check of a redirect URI against the registered list.
    /// No prefix matching, no normalization: byte equality only.
    pub fn redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
    }
}

/// Realm role (`client_pk` = None) or client role (`client_pk` = Some).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub realm_id: Uuid,
    /// Owning client for client roles; `None` for realm roles
    pub client_pk: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Group within a realm's group tree.
///
/// `parent_id` forms a tree; the repository refuses inserts that would
/// create a cycle. Members inherit role mappings from every ancestor.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub realm_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Named scope bundling protocol mappers.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ClientScope {
    pub id: Uuid,
    pub realm_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Built-in scopes (`openid`, `profile`, `email`, `roles`,
    /// `offline_access`) are read-only
    pub built_in: bool,
    pub created_at: DateTime<Utc>,
}

/// How a scope is attached to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeAssignment {
    /// Always included in tokens for this client
    Default,
    /// Included only when named in the request's `scope` parameter
    Optional,
}

impl ScopeAssignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Optional => "optional",
        }
    }
}

/// Kinds of protocol mappers the token factory understands.
pub mod mapper_types {
    /// `preferred_username` claim
    pub const USERNAME: &str = "username";
    /// `email` and `email_verified` claims
    pub const EMAIL: &str = "email";
    /// `given_name`, `family_name`, `name` claims
    pub const PROFILE: &str = "profile";
    /// `realm_access.roles` claim
    pub const REALM_ROLES: &str = "realm_roles";
    /// `resource_access.{clientId}.roles` claims
    pub const CLIENT_ROLES: &str = "client_roles";
    /// Adds a fixed value to `aud`
    pub const AUDIENCE: &str = "audience";
    /// Arbitrary fixed claim from config `{"claim": ..., "value": ...}`
    pub const HARDCODED_CLAIM: &str = "hardcoded_claim";
}

/// Rule that injects claims into issued tokens.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProtocolMapper {
    pub id: Uuid,
    pub scope_id: Uuid,
    pub name: String,
    /// One of [`mapper_types`]
    pub mapper_type: String,
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> Client {
        Client {
            id: Uuid::new_v4(),
            realm_id: Uuid::new_v4(),
            client_id: "app".to_string(),
            client_type: client_types::PUBLIC.to_string(),
            secret_hash: None,
            redirect_uris: vec!["https://app.example/cb".to_string()],
            web_origins: vec![],
            grant_types: vec![
                grant_types::AUTHORIZATION_CODE.to_string(),
                grant_types::REFRESH_TOKEN.to_string(),
            ],
            require_consent: true,
            backchannel_logout_uri: None,
            backchannel_logout_session_required: false,
            service_account_user_id: None,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_redirect_uri_exact_match_only() {
        let client = test_client();
        assert!(client.redirect_uri_allowed("https://app.example/cb"));
        // No prefix or suffix slack
        assert!(!client.redirect_uri_allowed("https://app.example/cb/"));
        assert!(!client.redirect_uri_allowed("https://app.example/cb?x=1"));
        assert!(!client.redirect_uri_allowed("https://app.example/CB"));
        assert!(!client.redirect_uri_allowed("https://evil.example/cb"));
    }

    #[test]
    fn test_allows_grant() {
        let client = test_client();
        assert!(client.allows_grant(grant_types::AUTHORIZATION_CODE));
        assert!(client.allows_grant(grant_types::REFRESH_TOKEN));
        assert!(!client.allows_grant(grant_types::CLIENT_CREDENTIALS));
        assert!(!client.allows_grant(grant_types::PASSWORD));
        assert!(!client.allows_grant(grant_types::DEVICE_CODE));
    }

    #[test]
    fn test_client_type_predicates() {
        let client = test_client();
        assert!(client.is_public());
        assert!(!client.is_confidential());
    }

    #[test]
    fn test_device_grant_uses_urn() {
        assert_eq!(
            grant_types::DEVICE_CODE,
            "urn:ietf:params:oauth:grant-type:device_code"
        );
    }

    #[test]
    fn test_scope_assignment_str() {
        assert_eq!(ScopeAssignment::Default.as_str(), "default");
        assert_eq!(ScopeAssignment::Optional.as_str(), "optional");
    }
}
