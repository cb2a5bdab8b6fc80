//! # User Entities
//!
//! Users are scoped to a realm: `(realm_id, username)` is unique, as is
//! `(realm_id, email)` when an email is present. A user can authenticate
//! when `enabled` and either a local `password_hash` or a `federation_link`
//! exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Complete user record as stored in the database.
///
/// Contains `password_hash`; never serialize this struct into an API
/// response. Use [`UserProfile`] instead.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    /// Primary key
    pub id: Uuid,
    /// Owning realm
    pub realm_id: Uuid,
    /// Login identifier, unique within the realm
    pub username: String,
    /// Optional email, unique within the realm when present
    pub email: Option<String>,
    pub email_verified: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Disabled users fail credential checks outright
    pub enabled: bool,
    /// Argon2id hash in PHC format; absent for federation-only users
    pub password_hash: Option<String>,
    /// When the current password was set; drives max-age expiry
    pub password_changed_at: Option<DateTime<Utc>>,
    /// Opaque reference into an external user directory
    pub federation_link: Option<String>,
    /// Set when an administrator forces a password change at next login
    pub update_password_required: bool,
    /// Completed lockouts so far; feeds the permanent-lockout threshold
    pub lockout_count: i32,
    /// Permanently locked accounts require an admin unlock
    pub permanently_locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether any credential check can possibly succeed for this user.
    pub fn can_authenticate(&self) -> bool {
        self.enabled && (self.password_hash.is_some() || self.federation_link.is_some())
    }

    /// Display name for consent and userinfo: "First Last", falling back to
    /// the username.
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(f), Some(l)) => format!("{} {}", f, l),
            (Some(f), None) => f.clone(),
            (None, Some(l)) => l.clone(),
            (None, None) => self.username.clone(),
        }
    }
}

/// Data required to create a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub realm_id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Pre-hashed; `None` for federated users
    pub password_hash: Option<String>,
    pub federation_link: Option<String>,
    pub email_verified: bool,
}

/// Public user view without sensitive fields, safe for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            email_verified: user.email_verified,
            first_name: user.first_name,
            last_name: user.last_name,
            enabled: user.enabled,
            created_at: user.created_at,
        }
    }
}

/// One failed login attempt, appended by the brute-force guard.
#[derive(Debug, Clone, FromRow)]
pub struct LoginFailure {
    pub id: Uuid,
    pub realm_id: Uuid,
    pub user_id: Uuid,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A previously used password hash, retained per the realm's history count.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordHistoryEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub realm_id: Uuid,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn base_user() -> User {
        User {
            id: Uuid::new_v4(),
            realm_id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: Some("alice@example.com".to_string()),
            email_verified: true,
            first_name: Some("Alice".to_string()),
            last_name: Some("Smith".to_string()),
            enabled: true,
            password_hash: Some("$argon2id$...".to_string()),
            password_changed_at: Some(Utc::now()),
            federation_link: None,
            update_password_required: false,
            lockout_count: 0,
            permanently_locked: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_can_authenticate_requires_enabled_and_credential() {
        let user = base_user();
        assert!(user.can_authenticate());

        let disabled = User {
            enabled: false,
            ..base_user()
        };
        assert!(!disabled.can_authenticate());

        let no_credential = User {
            password_hash: None,
            federation_link: None,
            ..base_user()
        };
        assert!(!no_credential.can_authenticate());

        let federated = User {
            password_hash: None,
            federation_link: Some("ldap://dc=example".to_string()),
            ..base_user()
        };
        assert!(federated.can_authenticate());
    }

    #[test]
    fn test_display_name_fallbacks() {
        assert_eq!(base_user().display_name(), "Alice Smith");

        let only_first = User {
            last_name: None,
            ..base_user()
        };
        assert_eq!(only_first.display_name(), "Alice");

        let bare = User {
            first_name: None,
            last_name: None,
            ..base_user()
        };
        assert_eq!(bare.display_name(), "alice");
    }

    #[test]
    fn test_profile_drops_sensitive_fields() {
        let profile: UserProfile = base_user().into();
        let json = serde_json::to_value(&profile).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "alice");
    }
}
