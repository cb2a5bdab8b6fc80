//! # Request / Response DTOs
//!
//! JSON bodies use camelCase (client-facing convention); browser form
//! bodies use snake_case field names matching the rendered inputs.

use serde::{Deserialize, Serialize};
use shared::validation::validators;
use uuid::Uuid;
use validator::Validate;

use crate::domain::UserProfile;

// =============================================================================
// JSON API
// =============================================================================

/// `GET /health` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: String,
}

/// Generic confirmation response.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// `POST /realms/{realm}/register` request body.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(custom(function = "validators::valid_username"))]
    pub username: String,

    #[validate(email)]
    pub email: Option<String>,

    /// Checked against the realm's password policy in the service layer;
    /// only shape-checked here.
    #[validate(length(min = 1, max = 512))]
    pub password: String,

    #[validate(length(max = 128))]
    pub first_name: Option<String>,

    #[validate(length(max = 128))]
    pub last_name: Option<String>,
}

/// `POST /realms/{realm}/register` response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user: UserProfile,
    /// Whether a verification email was queued
    pub email_verification_required: bool,
}

/// `POST /realms/{realm}/forgot-password` request body.
#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email)]
    pub email: String,
}

/// `POST /realms/{realm}/account/totp` response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotpSetupResponse {
    /// `otpauth://` URI for the authenticator app
    pub otpauth_url: String,
}

/// `PUT /realms/{realm}/account/totp` request body.
#[derive(Debug, Deserialize, Validate)]
pub struct TotpConfirmRequest {
    #[validate(length(min = 6, max = 8))]
    pub code: String,
}

/// `PUT /realms/{realm}/account/totp` response body. The recovery codes
/// appear here once and are never retrievable again.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryCodesResponse {
    pub recovery_codes: Vec<String>,
}

// =============================================================================
// Browser Forms
// =============================================================================

/// Credentials form on the login page.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    /// Checkbox; present means checked
    pub remember_me: Option<String>,
}

impl LoginForm {
    pub fn remember_me(&self) -> bool {
        self.remember_me.is_some()
    }
}

/// TOTP / recovery code form.
#[derive(Debug, Deserialize)]
pub struct OtpForm {
    pub code: String,
}

/// Consent decision form.
#[derive(Debug, Deserialize)]
pub struct ConsentForm {
    pub request: Uuid,
    /// "approve" or "deny"
    pub decision: String,
}

/// Device user-code entry + decision form.
#[derive(Debug, Deserialize)]
pub struct DeviceVerifyForm {
    pub user_code: String,
    /// "approve" or "deny"
    pub decision: String,
}

/// Password reset form (reached from an emailed link).
#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    pub token: String,
    pub new_password: String,
}

/// Query string on pages that carry a verification token.
#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

/// Query string on the device verification page.
#[derive(Debug, Deserialize, Default)]
pub struct UserCodeQuery {
    pub user_code: Option<String>,
}

/// Query string on the consent page.
#[derive(Debug, Deserialize)]
pub struct ConsentQuery {
    pub request: Uuid,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_validation() {
        let valid = RegisterRequest {
            username: "alice".to_string(),
            email: Some("alice@example.com".to_string()),
            password: "Str0ng&Password!".to_string(),
            first_name: Some("Alice".to_string()),
            last_name: None,
        };
        assert!(valid.validate().is_ok());

        let bad_email = RegisterRequest {
            email: Some("not-an-email".to_string()),
            ..valid_clone(&valid)
        };
        assert!(bad_email.validate().is_err());

        let bad_username = RegisterRequest {
            username: "has space".to_string(),
            ..valid_clone(&valid)
        };
        assert!(bad_username.validate().is_err());
    }

    fn valid_clone(r: &RegisterRequest) -> RegisterRequest {
        RegisterRequest {
            username: r.username.clone(),
            email: r.email.clone(),
            password: r.password.clone(),
            first_name: r.first_name.clone(),
            last_name: r.last_name.clone(),
        }
    }

    #[test]
    fn test_login_form_remember_me() {
        let form = LoginForm {
            username: "alice".to_string(),
            password: "pw".to_string(),
            remember_me: Some("on".to_string()),
        };
        assert!(form.remember_me());

        let form = LoginForm {
            username: "alice".to_string(),
            password: "pw".to_string(),
            remember_me: None,
        };
        assert!(!form.remember_me());
    }
}
