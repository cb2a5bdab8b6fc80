//! # Event Entities
//!
//! Append-only audit records. Recording is fire-and-forget: the request
//! path enqueues and moves on, a background writer persists, and a sweep
//! deletes rows past the realm's retention window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Event stream an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    /// End-user authentication activity
    Login,
    /// Administrative/infrastructure activity
    Admin,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Admin => "admin",
        }
    }
}

/// Well-known event type names.
///
/// Free-form strings are allowed; these constants cover the types the core
/// emits itself.
pub mod event_types {
    pub const LOGIN: &str = "login";
    pub const LOGIN_ERROR: &str = "login_error";
    pub const LOGOUT: &str = "logout";
    pub const REGISTER: &str = "register";
    pub const CODE_TO_TOKEN: &str = "code_to_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const REFRESH_TOKEN_REUSE: &str = "refresh_token_reuse";
    pub const TOKEN_REVOKED: &str = "token_revoked";
    pub const MFA_ENROLLED: &str = "mfa_enrolled";
    pub const MFA_FAILURE: &str = "mfa_failure";
    pub const ACCOUNT_LOCKED: &str = "account_locked";
    pub const EMAIL_VERIFIED: &str = "email_verified";
    pub const PASSWORD_RESET: &str = "password_reset";
    pub const BACKCHANNEL_LOGOUT_FAILED: &str = "backchannel_logout_failed";
}

/// A new event to append.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub realm_id: Uuid,
    pub category: EventCategory,
    pub event_type: String,
    pub user_id: Option<Uuid>,
    pub client_id: Option<String>,
    pub ip_address: Option<String>,
    pub error: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl NewEvent {
    /// Convenience constructor for login-stream events.
    pub fn login(realm_id: Uuid, event_type: &str) -> Self {
        Self {
            realm_id,
            category: EventCategory::Login,
            event_type: event_type.to_string(),
            user_id: None,
            client_id: None,
            ip_address: None,
            error: None,
            details: None,
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_client(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_string());
        self
    }

    pub fn with_ip(mut self, ip: Option<String>) -> Self {
        self.ip_address = ip;
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Stored event row.
#[derive(Debug, Clone, FromRow)]
pub struct EventRecord {
    pub id: Uuid,
    pub realm_id: Uuid,
    pub category: String,
    pub event_type: String,
    pub user_id: Option<Uuid>,
    pub client_id: Option<String>,
    pub ip_address: Option<String>,
    pub error: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let realm_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let event = NewEvent::login(realm_id, event_types::LOGIN_ERROR)
            .with_user(user_id)
            .with_client("app")
            .with_ip(Some("10.0.0.1".to_string()))
            .with_error("invalid_credentials");

        assert_eq!(event.category, EventCategory::Login);
        assert_eq!(event.event_type, "login_error");
        assert_eq!(event.user_id, Some(user_id));
        assert_eq!(event.client_id.as_deref(), Some("app"));
        assert_eq!(event.error.as_deref(), Some("invalid_credentials"));
    }
}
