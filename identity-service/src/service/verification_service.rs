//! # Verification Tokens
//!
//! One-shot tokens for email verification, password reset, and forced
//! password change. Creation hands the raw token to the caller (it travels
//! by email); only the SHA-256 hash is stored. Validation is atomic
//! delete-and-return, so a token can never validate twice.

use shared::clock::SharedClock;
use shared::crypto::random::{secure_token, sha256_hex};
use shared::errors::ApiError;
use tracing::info;
use uuid::Uuid;

use crate::domain::{Realm, VerificationPurpose};
use crate::repository::VerificationRepository;

/// Verification token service.
#[derive(Clone)]
pub struct VerificationService {
    repository: VerificationRepository,
    clock: SharedClock,
}

impl VerificationService {
    pub fn new(repository: VerificationRepository, clock: SharedClock) -> Self {
        Self { repository, clock }
    }

    /// Creates a token for a purpose and returns the raw value.
    ///
    /// Outstanding tokens of the same purpose are dropped first, so only
    /// the newest link in the user's inbox works.
    pub async fn create(
        &self,
        realm: &Realm,
        user_id: Uuid,
        purpose: VerificationPurpose,
    ) -> Result<String, ApiError> {
        self.repository
            .delete_for_user(user_id, purpose.as_str())
            .await?;

        let raw_token = secure_token();
        let expires_at = self.clock.now() + purpose.ttl();

        self.repository
            .create(
                realm.id,
                user_id,
                &sha256_hex(&raw_token),
                purpose.as_str(),
                expires_at,
            )
            .await?;

        info!(
            user_id = %user_id,
            purpose = purpose.as_str(),
            "verification token issued"
        );

        Ok(raw_token)
    }

    /// Validates and consumes a token.
    ///
    /// Returns the owning user id on the one successful validation;
    /// `None` for unknown, expired, wrong-purpose, or already-used tokens.
    pub async fn consume(
        &self,
        realm: &Realm,
        raw_token: &str,
        purpose: VerificationPurpose,
    ) -> Result<Option<Uuid>, ApiError> {
        self.repository
            .consume(
                realm.id,
                &sha256_hex(raw_token),
                purpose.as_str(),
                self.clock.now(),
            )
            .await
    }
}
