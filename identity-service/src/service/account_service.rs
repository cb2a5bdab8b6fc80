//! # Account Service
//!
//! Self-registration, email verification, and the password reset flow
//! (both user-initiated and the forced change after expiry). Email
//! delivery is fire-and-forget through the mail dispatcher; a relay outage
//! never fails the enclosing request.

use shared::clock::SharedClock;
use shared::crypto::password::PasswordHasher;
use shared::errors::ApiError;
use std::sync::Arc;
use tracing::info;

use crate::domain::event::event_types;
use crate::domain::{NewEvent, NewUser, Realm, User, VerificationPurpose};
use crate::repository::UserRepository;
use crate::service::events_recorder::EventRecorder;
use crate::service::mailer::{EmailRequest, MailDispatcher};
use crate::service::password_policy::PasswordPolicyService;
use crate::service::session_service::SessionLifecycle;
use crate::service::verification_service::VerificationService;

/// Registration input, already shape-validated at the API boundary.
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Account lifecycle service.
#[derive(Clone)]
pub struct AccountService {
    users: UserRepository,
    hasher: Arc<PasswordHasher>,
    policy: PasswordPolicyService,
    verification: VerificationService,
    lifecycle: SessionLifecycle,
    mail: MailDispatcher,
    events: EventRecorder,
    base_url: String,
    clock: SharedClock,
}

impl AccountService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: UserRepository,
        hasher: Arc<PasswordHasher>,
        policy: PasswordPolicyService,
        verification: VerificationService,
        lifecycle: SessionLifecycle,
        mail: MailDispatcher,
        events: EventRecorder,
        base_url: String,
        clock: SharedClock,
    ) -> Self {
        Self {
            users,
            hasher,
            policy,
            verification,
            lifecycle,
            mail,
            events,
            base_url,
            clock,
        }
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Registers a new user when the realm allows self-registration.
    ///
    /// Enforces the realm's password policy and, when email verification
    /// is required, queues the verification email. The email leaving the
    /// building is not part of this request's success.
    pub async fn register(
        &self,
        realm: &Realm,
        registration: Registration,
        ip: Option<&str>,
    ) -> Result<User, ApiError> {
        if !realm.registration_allowed {
            return Err(ApiError::Forbidden {
                reason: "registration is disabled for this realm".to_string(),
            });
        }

        if let Err(errors) = self.policy.validate(realm, &registration.password) {
            return Err(ApiError::PolicyViolation { errors });
        }

        // Check if the username is already taken
        if self
            .users
            .username_exists(realm.id, &registration.username)
            .await?
        {
            return Err(ApiError::Conflict {
                resource: "username".to_string(),
            });
        }

        let password_hash = self.hasher.hash(&registration.password)?;
        let user = self
            .users
            .create(
                NewUser {
                    realm_id: realm.id,
                    username: registration.username,
                    email: registration.email,
                    first_name: registration.first_name,
                    last_name: registration.last_name,
                    password_hash: Some(password_hash.clone()),
                    federation_link: None,
                    email_verified: false,
                },
                self.clock.now(),
            )
            .await?;

        self.policy
            .record_history(realm, user.id, &password_hash)
            .await?;

        if realm.require_email_verification {
            if let Err(e) = self.send_verification_email(realm, &user).await {
                // Delivery trouble stays out of the registration response
                tracing::warn!(user_id = %user.id, error = %e, "verification email not queued");
            }
        }

        info!(user_id = %user.id, realm = %realm.name, "user registered");
        self.events.record(
            NewEvent::login(realm.id, event_types::REGISTER)
                .with_user(user.id)
                .with_ip(ip.map(str::to_string)),
        );

        Ok(user)
    }

    /// Issues an email verification token and queues the email.
    pub async fn send_verification_email(&self, realm: &Realm, user: &User) -> Result<(), ApiError> {
        let Some(email) = user.email.clone() else {
            return Ok(());
        };

        let token = self
            .verification
            .create(realm, user.id, VerificationPurpose::EmailVerification)
            .await?;

        let link = format!(
            "{}/realms/{}/verify-email?token={}",
            self.base_url.trim_end_matches('/'),
            realm.name,
            token
        );

        self.mail.enqueue(EmailRequest {
            to: email,
            subject: format!("Verify your email for {}", realm_display(realm)),
            body: format!(
                "Hello {},\n\nPlease verify your email address by following this link:\n\n{}\n\nThe link expires in 24 hours.",
                user.display_name(),
                link
            ),
        });

        Ok(())
    }

    /// Completes email verification with a token from the emailed link.
    pub async fn verify_email(&self, realm: &Realm, raw_token: &str) -> Result<(), ApiError> {
        let user_id = self
            .verification
            .consume(realm, raw_token, VerificationPurpose::EmailVerification)
            .await?
            .ok_or(ApiError::InvalidToken)?;

        self.users.set_email_verified(user_id).await?;

        info!(user_id = %user_id, realm = %realm.name, "email verified");
        self.events.record(
            NewEvent::login(realm.id, event_types::EMAIL_VERIFIED).with_user(user_id),
        );

        Ok(())
    }

    // =========================================================================
    // PASSWORD RESET
    // =========================================================================

    /// Starts a password reset for the account behind an email address.
    ///
    /// Always reports success to the caller; whether the address exists is
    /// not disclosed.
    pub async fn forgot_password(&self, realm: &Realm, email: &str) -> Result<(), ApiError> {
        let Some(user) = self.users.find_by_email(realm.id, email).await? else {
            info!(realm = %realm.name, "password reset requested for unknown email");
            return Ok(());
        };

        self.issue_reset_email(realm, &user, VerificationPurpose::PasswordReset)
            .await
    }

    /// Issues a forced-change token after password expiry. Same mechanics
    /// as a reset, different purpose tag.
    pub async fn start_forced_change(&self, realm: &Realm, user: &User) -> Result<String, ApiError> {
        self.verification
            .create(realm, user.id, VerificationPurpose::ChangePassword)
            .await
    }

    /// Completes a reset or forced change with the emailed token.
    ///
    /// Enforces policy and history, records history, and logs the user
    /// out everywhere.
    pub async fn reset_password(
        &self,
        realm: &Realm,
        raw_token: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        // Either purpose tag completes here; the token itself encodes
        // which flow it came from
        let user_id = match self
            .verification
            .consume(realm, raw_token, VerificationPurpose::PasswordReset)
            .await?
        {
            Some(user_id) => user_id,
            None => self
                .verification
                .consume(realm, raw_token, VerificationPurpose::ChangePassword)
                .await?
                .ok_or(ApiError::InvalidToken)?,
        };

        if let Err(errors) = self.policy.validate(realm, new_password) {
            return Err(ApiError::PolicyViolation { errors });
        }

        if self
            .policy
            .violates_history(realm, user_id, new_password)
            .await?
        {
            return Err(ApiError::PolicyViolation {
                errors: vec!["Password was used recently and cannot be reused".to_string()],
            });
        }

        let password_hash = self.hasher.hash(new_password)?;
        self.users
            .update_password(user_id, &password_hash, self.clock.now())
            .await?;
        self.policy
            .record_history(realm, user_id, &password_hash)
            .await?;

        // Every session dies with the old password
        self.lifecycle.logout_all_sessions(realm, user_id).await?;

        info!(user_id = %user_id, realm = %realm.name, "password reset completed");
        self.events.record(
            NewEvent::login(realm.id, event_types::PASSWORD_RESET).with_user(user_id),
        );

        Ok(())
    }

    async fn issue_reset_email(
        &self,
        realm: &Realm,
        user: &User,
        purpose: VerificationPurpose,
    ) -> Result<(), ApiError> {
        let Some(email) = user.email.clone() else {
            return Ok(());
        };

        let token = self.verification.create(realm, user.id, purpose).await?;
        let link = format!(
            "{}/realms/{}/reset-password?token={}",
            self.base_url.trim_end_matches('/'),
            realm.name,
            token
        );

        self.mail.enqueue(EmailRequest {
            to: email,
            subject: format!("Password reset for {}", realm_display(realm)),
            body: format!(
                "Hello {},\n\nA password reset was requested for your account. Follow this link to choose a new password:\n\n{}\n\nThe link expires in 1 hour. If you did not request this, you can ignore this email.",
                user.display_name(),
                link
            ),
        });

        Ok(())
    }
}

fn realm_display(realm: &Realm) -> &str {
    if realm.display_name.is_empty() {
        &realm.name
    } else {
        &realm.display_name
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_struct_carries_optionals() {
        let registration = Registration {
            username: "alice".to_string(),
            email: Some("alice@example.com".to_string()),
            password: "Str0ng&Password!".to_string(),
            first_name: None,
            last_name: None,
        };

        assert_eq!(registration.username, "alice");
        assert!(registration.first_name.is_none());
    }
}
