//! # MFA Entities
//!
//! TOTP credentials (one per user, secret encrypted at rest), single-use
//! recovery codes, and the short-lived challenge rows that carry the
//! half-authenticated state between the password form and the TOTP form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Supported TOTP hash algorithms, stored as text.
pub mod totp_algorithms {
    pub const SHA1: &str = "SHA-1";
    pub const SHA256: &str = "SHA-256";
    pub const SHA512: &str = "SHA-512";
}

/// A user's TOTP credential.
///
/// Created disabled during enrolment; flips to enabled when the user first
/// proves possession by submitting a valid code. `last_used_counter` stores
/// the time-step of the last accepted code so a code can never be replayed
/// within its own window.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TotpCredential {
    pub user_id: Uuid,
    pub realm_id: Uuid,
    /// AES-256-GCM sealed Base32 secret
    pub encrypted_secret: String,
    pub algorithm: String,
    pub digits: i32,
    pub period_secs: i32,
    pub enabled: bool,
    pub last_used_counter: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// One single-use recovery code (hashed).
#[derive(Debug, Clone, FromRow)]
pub struct RecoveryCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code_hash: String,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

/// Server-side MFA challenge.
///
/// Issued after a correct password when the user has TOTP enabled. The
/// browser holds the raw token in `AUTHME_MFA_CHALLENGE`; this row stores
/// the hash, the preserved OAuth parameters, and the attempt counter.
/// Five failed attempts or five minutes kill the challenge and send the
/// browser back to the login form.
#[derive(Debug, Clone, FromRow)]
pub struct MfaChallenge {
    pub id: Uuid,
    pub realm_id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub oauth_params: serde_json::Value,
    pub remember_me: bool,
    pub attempt_count: i32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Maximum wrong codes before a challenge is invalidated.
pub const MFA_MAX_ATTEMPTS: i32 = 5;

/// Challenge lifetime in seconds.
pub const MFA_CHALLENGE_TTL_SECS: i64 = 300;

/// Number of recovery codes issued at enrolment.
pub const RECOVERY_CODE_COUNT: usize = 10;

/// Length of each recovery code.
pub const RECOVERY_CODE_LEN: usize = 10;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_match_policy() {
        assert_eq!(MFA_MAX_ATTEMPTS, 5);
        assert_eq!(MFA_CHALLENGE_TTL_SECS, 300);
        assert_eq!(RECOVERY_CODE_COUNT, 10);
        assert_eq!(RECOVERY_CODE_LEN, 10);
    }
}
