//! # Realm Entity
//!
//! A realm is an isolated tenant: its own users, clients, keys, and policies.
//! The realm `name` is the stable key that appears in URLs
//! (`/realms/{name}/...`) and in the issuer claim of every token the realm
//! signs. Everything configurable about authentication behavior hangs off
//! this entity.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Complete realm record as stored in the database.
///
/// Policy fields are grouped by prefix:
///
/// | Prefix | Governs |
/// |--------|---------|
/// | `*_token_lifespan_secs` | Token factory lifetimes |
/// | `password_*` | Password policy |
/// | `brute_force_*` / `*_login_failures` / `lockout_*` | Brute-force guard |
/// | `events_*` | Event recording and retention |
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Realm {
    /// Primary key
    pub id: Uuid,
    /// Stable, URL-safe tenant key; unique across the process
    pub name: String,
    /// Human-readable name for login pages
    pub display_name: String,
    /// Disabled realms reject every request with Forbidden
    pub enabled: bool,

    // -- token lifespans ------------------------------------------------------
    pub access_token_lifespan_secs: i32,
    pub refresh_token_lifespan_secs: i32,
    pub offline_token_lifespan_secs: i32,
    pub sso_session_lifespan_secs: i32,

    // -- password policy ------------------------------------------------------
    pub password_min_length: i32,
    pub password_require_uppercase: bool,
    pub password_require_lowercase: bool,
    pub password_require_digit: bool,
    pub password_require_special: bool,
    /// How many previous hashes a new password must not match (0 = off)
    pub password_history_count: i32,
    /// Days until a password expires and must be changed (0 = never)
    pub password_max_age_days: i32,

    // -- brute-force policy ---------------------------------------------------
    pub brute_force_enabled: bool,
    pub max_login_failures: i32,
    pub lockout_duration_secs: i32,
    /// Failures older than this no longer count toward the limit
    pub failure_reset_secs: i32,
    /// Cumulative lockouts before the account locks permanently (0 = never)
    pub permanent_lockout_after: i32,

    // -- login features -------------------------------------------------------
    pub mfa_required: bool,
    pub registration_allowed: bool,
    pub require_email_verification: bool,

    // -- events ---------------------------------------------------------------
    pub events_enabled: bool,
    pub events_expiration_secs: i64,

    // -- outbound mail --------------------------------------------------------
    pub smtp_from: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<i32>,

    /// Selected login theme; rendering happens outside the core
    pub login_theme: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Realm {
    /// The issuer string for this realm: `{base_url}/realms/{name}`.
    ///
    /// Appears as `iss` in every token and in the discovery document.
    pub fn issuer(&self, base_url: &str) -> String {
        format!("{}/realms/{}", base_url.trim_end_matches('/'), self.name)
    }

    /// Access token lifetime as a `Duration`.
    pub fn access_token_lifespan(&self) -> Duration {
        Duration::seconds(self.access_token_lifespan_secs as i64)
    }

    /// Refresh token lifetime, honoring the offline variant.
    pub fn refresh_token_lifespan(&self, offline: bool) -> Duration {
        if offline {
            Duration::seconds(self.offline_token_lifespan_secs as i64)
        } else {
            Duration::seconds(self.refresh_token_lifespan_secs as i64)
        }
    }

    /// Browser SSO session lifetime. Remember-me sessions run 30 days.
    pub fn sso_session_lifespan(&self, remember_me: bool) -> Duration {
        if remember_me {
            Duration::days(30)
        } else {
            Duration::seconds(self.sso_session_lifespan_secs as i64)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_realm() -> Realm {
        Realm {
            id: Uuid::new_v4(),
            name: "acme".to_string(),
            display_name: "Acme Corp".to_string(),
            enabled: true,
            access_token_lifespan_secs: 300,
            refresh_token_lifespan_secs: 2_592_000,
            offline_token_lifespan_secs: 5_184_000,
            sso_session_lifespan_secs: 36_000,
            password_min_length: 8,
            password_require_uppercase: false,
            password_require_lowercase: false,
            password_require_digit: false,
            password_require_special: false,
            password_history_count: 0,
            password_max_age_days: 0,
            brute_force_enabled: false,
            max_login_failures: 5,
            lockout_duration_secs: 300,
            failure_reset_secs: 900,
            permanent_lockout_after: 0,
            mfa_required: false,
            registration_allowed: false,
            require_email_verification: false,
            events_enabled: true,
            events_expiration_secs: 2_592_000,
            smtp_from: None,
            smtp_host: None,
            smtp_port: None,
            login_theme: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_issuer_format() {
        let realm = test_realm();
        assert_eq!(
            realm.issuer("https://id.example.com"),
            "https://id.example.com/realms/acme"
        );
        // Trailing slash on the base URL must not double up
        assert_eq!(
            realm.issuer("https://id.example.com/"),
            "https://id.example.com/realms/acme"
        );
    }

    #[test]
    fn test_lifespans() {
        let realm = test_realm();
        assert_eq!(realm.access_token_lifespan(), Duration::seconds(300));
        assert_eq!(
            realm.refresh_token_lifespan(false),
            Duration::seconds(2_592_000)
        );
        assert_eq!(
            realm.refresh_token_lifespan(true),
            Duration::seconds(5_184_000)
        );
        assert_eq!(realm.sso_session_lifespan(false), Duration::seconds(36_000));
        assert_eq!(realm.sso_session_lifespan(true), Duration::days(30));
    }
}
