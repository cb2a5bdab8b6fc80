//! # Verification Token Entity
//!
//! One-shot tokens for email verification, password reset, and forced
//! password change. The caller gets the raw token (delivered by email); the
//! row stores only the hash with a purpose tag. Validation is atomic: a
//! matching, unexpired row is deleted in the same statement that finds it,
//! so a token can never validate twice.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Purpose tags for verification tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationPurpose {
    EmailVerification,
    PasswordReset,
    ChangePassword,
}

impl VerificationPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmailVerification => "email_verification",
            Self::PasswordReset => "password_reset",
            Self::ChangePassword => "change_password",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "email_verification" => Some(Self::EmailVerification),
            "password_reset" => Some(Self::PasswordReset),
            "change_password" => Some(Self::ChangePassword),
            _ => None,
        }
    }

    /// Token lifetime for this purpose.
    pub fn ttl(&self) -> chrono::Duration {
        match self {
            // Email links may sit in an inbox for a while
            Self::EmailVerification => chrono::Duration::hours(24),
            Self::PasswordReset => chrono::Duration::hours(1),
            Self::ChangePassword => chrono::Duration::hours(1),
        }
    }
}

/// Stored verification token row.
#[derive(Debug, Clone, FromRow)]
pub struct VerificationToken {
    pub id: Uuid,
    pub realm_id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub purpose: String,
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
    fn test_purpose_round_trip() {
        for purpose in [
            VerificationPurpose::EmailVerification,
            VerificationPurpose::PasswordReset,
            VerificationPurpose::ChangePassword,
        ] {
            assert_eq!(
                VerificationPurpose::from_str(purpose.as_str()),
                Some(purpose)
            );
        }
        assert_eq!(VerificationPurpose::from_str("bogus"), None);
    }

    #[test]
    fn test_reset_ttl_is_one_hour() {
        assert_eq!(
            VerificationPurpose::PasswordReset.ttl(),
            chrono::Duration::hours(1)
        );
    }
}
