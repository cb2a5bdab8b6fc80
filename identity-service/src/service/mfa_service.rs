//! # MFA Engine
//!
//! TOTP enrolment and verification, recovery codes, and the challenge
//! tokens that carry half-authenticated state between the password form
//! and the TOTP form.
//!
//! ## Enrolment
//!
//! ```text
//! begin_enrolment   -> random 160-bit secret, stored encrypted + disabled,
//!                      otpauth:// URI returned for the authenticator app
//! confirm_enrolment -> user posts a valid code -> credential enabled,
//!                      10 recovery codes generated (returned once, stored
//!                      hashed)
//! ```
//!
//! ## Verification
//!
//! The current 30-second window and one adjacent window on each side are
//! accepted (clock skew). The matched time-step is persisted through a
//! conditional update, so the same code is rejected if replayed within its
//! window.

use shared::clock::SharedClock;
use shared::crypto::random::{random_from_alphabet, secure_token, sha256_hex};
use shared::crypto::SecretCipher;
use shared::errors::ApiError;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::{info, warn};

use crate::domain::mfa::{
    totp_algorithms, MfaChallenge, TotpCredential, MFA_CHALLENGE_TTL_SECS, RECOVERY_CODE_COUNT,
    RECOVERY_CODE_LEN,
};
use crate::domain::{OAuthParams, Realm, User};
use crate::repository::MfaRepository;

/// Alphabet for recovery codes: no 0/O, 1/I ambiguity.
const RECOVERY_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// MFA service.
#[derive(Clone)]
pub struct MfaService {
    repository: MfaRepository,
    cipher: SecretCipher,
    clock: SharedClock,
}

/// Raw challenge token plus the stored row, returned at challenge
/// creation.
pub struct IssuedChallenge {
    pub raw_token: String,
    pub challenge: MfaChallenge,
}

impl MfaService {
    pub fn new(repository: MfaRepository, cipher: SecretCipher, clock: SharedClock) -> Self {
        Self {
            repository,
            cipher,
            clock,
        }
    }

    // =========================================================================
    // ENROLMENT
    // =========================================================================

    /// Starts TOTP enrolment: generates a 160-bit secret, stores it
    /// encrypted and disabled, and returns the `otpauth://` URI.
    ///
    /// # Errors
    ///
    /// `ApiError::Conflict` when the user already has an enabled TOTP
    /// credential.
    pub async fn begin_enrolment(&self, realm: &Realm, user: &User) -> Result<String, ApiError> {
        let secret = Secret::generate_secret();
        let secret_b32 = secret.to_encoded().to_string();

        let encrypted = self.cipher.encrypt(&secret_b32)?;
        let credential = self
            .repository
            .upsert_pending_totp(realm.id, user.id, &encrypted, totp_algorithms::SHA1, 6, 30)
            .await?;

        let totp = self.build_totp(&credential, &secret_b32, realm, user)?;
        info!(user_id = %user.id, realm = %realm.name, "TOTP enrolment started");

        Ok(totp.get_url())
    }

    /// Completes enrolment with a code from the authenticator app.
    ///
    /// On success the credential is enabled and the plaintext recovery
    /// codes are returned. They are never retrievable again.
    pub async fn confirm_enrolment(
        &self,
        realm: &Realm,
        user: &User,
        code: &str,
    ) -> Result<Vec<String>, ApiError> {
        let credential = self
            .repository
            .find_totp(user.id)
            .await?
            .filter(|c| !c.enabled)
            .ok_or_else(|| ApiError::NotFound {
                resource: "pending totp enrolment".to_string(),
            })?;

        if self.matching_step(&credential, realm, user, code)?.is_none() {
            warn!(user_id = %user.id, "TOTP enrolment code rejected");
            return Err(ApiError::BadRequest {
                message: "Invalid authenticator code".to_string(),
            });
        }

        self.repository.enable_totp(user.id).await?;

        let codes: Vec<String> = (0..RECOVERY_CODE_COUNT)
            .map(|_| random_from_alphabet(RECOVERY_ALPHABET, RECOVERY_CODE_LEN))
            .collect();
        let hashes: Vec<String> = codes.iter().map(|c| sha256_hex(c)).collect();
        self.repository
            .replace_recovery_codes(user.id, &hashes)
            .await?;

        info!(user_id = %user.id, realm = %realm.name, "TOTP enrolment completed");

        Ok(codes)
    }

    /// Whether the user has a fully enrolled TOTP credential.
    pub async fn has_enabled_totp(&self, user_id: uuid::Uuid) -> Result<bool, ApiError> {
        Ok(self
            .repository
            .find_totp(user_id)
            .await?
            .map(|c| c.enabled)
            .unwrap_or(false))
    }

    // =========================================================================
    // VERIFICATION
    // =========================================================================

    /// Verifies a TOTP code for an enrolled user.
    ///
    /// Accepts the current window plus one on each side, and rejects
    /// replays of an already-accepted window.
    pub async fn verify_totp(
        &self,
        realm: &Realm,
        user: &User,
        code: &str,
    ) -> Result<bool, ApiError> {
        let credential = self
            .repository
            .find_totp(user.id)
            .await?
            .filter(|c| c.enabled)
            .ok_or_else(|| ApiError::NotFound {
                resource: "totp credential".to_string(),
            })?;

        let Some(step) = self.matching_step(&credential, realm, user, code)? else {
            return Ok(false);
        };

        // Conditional update: fails when this window was already spent
        let fresh = self.repository.advance_totp_counter(user.id, step).await?;
        if !fresh {
            warn!(user_id = %user.id, "TOTP code replay rejected");
        }
        Ok(fresh)
    }

    /// Verifies and consumes a recovery code.
    pub async fn verify_recovery_code(
        &self,
        user: &User,
        code: &str,
    ) -> Result<bool, ApiError> {
        let normalized = code.trim().to_uppercase();
        self.repository
            .use_recovery_code(user.id, &sha256_hex(&normalized))
            .await
    }

    // =========================================================================
    // CHALLENGES
    // =========================================================================

    /// Issues a challenge after a correct password for an MFA user.
    ///
    /// The raw token goes into the `AUTHME_MFA_CHALLENGE` cookie; the row
    /// stores its hash, the preserved OAuth parameters, and the attempt
    /// counter (TTL 5 minutes, 5 attempts).
    pub async fn create_challenge(
        &self,
        realm: &Realm,
        user: &User,
        params: &OAuthParams,
        remember_me: bool,
    ) -> Result<IssuedChallenge, ApiError> {
        let raw_token = secure_token();
        let now = self.clock.now();

        let challenge = self
            .repository
            .create_challenge(
                realm.id,
                user.id,
                &sha256_hex(&raw_token),
                &serde_json::to_value(params).unwrap_or_default(),
                remember_me,
                now + chrono::Duration::seconds(MFA_CHALLENGE_TTL_SECS),
            )
            .await?;

        Ok(IssuedChallenge {
            raw_token,
            challenge,
        })
    }

    /// Looks up a live challenge without spending an attempt (for
    /// rendering the TOTP form).
    pub async fn peek_challenge(
        &self,
        realm: &Realm,
        raw_token: &str,
    ) -> Result<Option<MfaChallenge>, ApiError> {
        self.repository
            .find_live_challenge(realm.id, &sha256_hex(raw_token), self.clock.now())
            .await
    }

    /// Spends one attempt on a challenge.
    ///
    /// `None` means the challenge is expired, unknown, or out of attempts;
    /// the caller clears the cookie and restarts the login.
    pub async fn register_attempt(
        &self,
        realm: &Realm,
        raw_token: &str,
    ) -> Result<Option<MfaChallenge>, ApiError> {
        self.repository
            .register_challenge_attempt(realm.id, &sha256_hex(raw_token), self.clock.now())
            .await
    }

    /// Deletes a challenge after successful verification.
    pub async fn complete_challenge(&self, challenge: &MfaChallenge) -> Result<(), ApiError> {
        self.repository.delete_challenge(challenge.id).await
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    /// Builds the TOTP machinery for a credential.
    fn build_totp_from_parts(
        &self,
        secret_b32: &str,
        algorithm: &str,
        digits: i32,
        period_secs: i32,
        realm: &Realm,
        user: &User,
    ) -> Result<TOTP, ApiError> {
        let secret_bytes = Secret::Encoded(secret_b32.to_string())
            .to_bytes()
            .map_err(|e| ApiError::Internal {
                message: format!("Invalid TOTP secret encoding: {:?}", e),
            })?;

        let algorithm = match algorithm {
            totp_algorithms::SHA256 => Algorithm::SHA256,
            totp_algorithms::SHA512 => Algorithm::SHA512,
            _ => Algorithm::SHA1,
        };

        let issuer = if realm.display_name.is_empty() {
            realm.name.clone()
        } else {
            realm.display_name.clone()
        };

        TOTP::new(
            algorithm,
            digits as usize,
            1, // skew: accept one adjacent window each side
            period_secs as u64,
            secret_bytes,
            Some(issuer),
            user.username.clone(),
        )
        .map_err(|e| ApiError::Internal {
            message: format!("TOTP construction failed: {}", e),
        })
    }

    fn build_totp(
        &self,
        credential: &TotpCredential,
        secret_b32: &str,
        realm: &Realm,
        user: &User,
    ) -> Result<TOTP, ApiError> {
        self.build_totp_from_parts(
            secret_b32,
            &credential.algorithm,
            credential.digits,
            credential.period_secs,
            realm,
            user,
        )
    }

    /// Finds which time-step (if any) the code matches, checking the
    /// current window and ±1.
    fn matching_step(
        &self,
        credential: &TotpCredential,
        realm: &Realm,
        user: &User,
        code: &str,
    ) -> Result<Option<i64>, ApiError> {
        let secret_b32 = self.cipher.decrypt(&credential.encrypted_secret)?;
        let totp = self.build_totp(credential, &secret_b32, realm, user)?;

        let now_ts = self.clock.now().timestamp().max(0) as u64;
        let step = credential.period_secs.max(1) as u64;
        let current = (now_ts / step) as i64;

        for candidate in [current, current - 1, current + 1] {
            if candidate < 0 {
                continue;
            }
            let window_time = candidate as u64 * step;
            if totp.generate(window_time) == code {
                return Ok(Some(candidate));
            }
        }

        Ok(None)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use totp_rs::{Algorithm, Secret, TOTP};

    fn test_totp() -> TOTP {
        let secret = Secret::Encoded("JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP".to_string());
        TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret.to_bytes().unwrap(),
            Some("acme".to_string()),
            "alice".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_adjacent_windows_produce_accepted_codes() {
        let totp = test_totp();
        let t: u64 = 1_700_000_000;
        let aligned = (t / 30) * 30;

        // Codes from the previous and next window pass the ±1 check
        let current = totp.generate(aligned);
        let previous = totp.generate(aligned - 30);
        let next = totp.generate(aligned + 30);

        assert!(totp.check(&current, aligned));
        assert!(totp.check(&previous, aligned));
        assert!(totp.check(&next, aligned));

        // Two windows away is out of tolerance
        let far = totp.generate(aligned + 90);
        if far != current && far != previous && far != next {
            assert!(!totp.check(&far, aligned));
        }
    }

    #[test]
    fn test_generated_secret_is_160_bits() {
        let secret = Secret::generate_secret();
        assert_eq!(secret.to_bytes().unwrap().len(), 20);
    }

    #[test]
    fn test_otpauth_url_carries_issuer_and_account() {
        let totp = test_totp();
        let url = totp.get_url();
        assert!(url.starts_with("otpauth://totp/"));
        assert!(url.contains("issuer=acme"));
        assert!(url.contains("alice"));
    }

    #[test]
    fn test_recovery_code_shape() {
        let code = random_from_alphabet(RECOVERY_ALPHABET, RECOVERY_CODE_LEN);
        assert_eq!(code.len(), 10);
        assert!(!code.contains('0'));
        assert!(!code.contains('O'));
        assert!(!code.contains('1'));
        assert!(!code.contains('I'));
    }
}
