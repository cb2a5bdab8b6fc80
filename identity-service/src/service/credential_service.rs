//! # Credential Verifier
//!
//! First factor of the login state machine: username + password against the
//! local Argon2id hash or, for linked users, against the federation
//! collaborator. Unknown usernames burn a dummy hash verification so the
//! response time matches the wrong-password path and accounts cannot be
//! enumerated by timing.
//!
//! ## Decision Table
//!
//! | User row | Credential source | Outcome |
//! |----------|-------------------|---------|
//! | linked (`federation_link`) | federation verify | success / failure recorded |
//! | local, enabled, has hash | Argon2id verify | success / failure recorded |
//! | disabled | none | AccountDisabled (after dummy verify) |
//! | exists, no credential | none | InvalidCredentials (after dummy verify) |
//! | missing, federation configured | federation bind | user materialized on success |
//! | missing | none | InvalidCredentials (after dummy verify) |

use shared::clock::SharedClock;
use shared::crypto::password::PasswordHasher;
use shared::errors::ApiError;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::event::event_types;
use crate::domain::{NewEvent, NewUser, Realm, User};
use crate::repository::UserRepository;
use crate::service::brute_force::BruteForceGuard;
use crate::service::events_recorder::EventRecorder;
use crate::service::federation::FederationProvider;

/// Credential verification service.
#[derive(Clone)]
pub struct CredentialVerifier {
    users: UserRepository,
    hasher: Arc<PasswordHasher>,
    guard: BruteForceGuard,
    federation: Arc<dyn FederationProvider>,
    events: EventRecorder,
    clock: SharedClock,
}

impl CredentialVerifier {
    pub fn new(
        users: UserRepository,
        hasher: Arc<PasswordHasher>,
        guard: BruteForceGuard,
        federation: Arc<dyn FederationProvider>,
        events: EventRecorder,
        clock: SharedClock,
    ) -> Self {
        Self {
            users,
            hasher,
            guard,
            federation,
            events,
            clock,
        }
    }

    /// Verifies a username/password pair within a realm.
    ///
    /// # Errors
    ///
    /// - `ApiError::InvalidCredentials` - unknown user or wrong password
    /// - `ApiError::AccountLocked` - brute-force lockout in effect
    /// - `ApiError::AccountDisabled` - user exists but is disabled
    pub async fn verify(
        &self,
        realm: &Realm,
        username: &str,
        password: &str,
        ip: Option<&str>,
    ) -> Result<User, ApiError> {
        let user = self.users.find_by_username(realm.id, username).await?;

        match user {
            Some(user) if user.federation_link.is_some() => {
                self.verify_federated(realm, user, password, ip).await
            }
            Some(user) if user.enabled && user.password_hash.is_some() => {
                self.verify_local(realm, user, password, ip).await
            }
            Some(user) if !user.enabled => {
                // Same work as a real verification before answering
                self.hasher.dummy_verify(password);
                warn!(user_id = %user.id, realm = %realm.name, "login attempt on disabled account");
                self.record_login_error(realm, Some(&user), ip, "account_disabled");
                Err(ApiError::AccountDisabled)
            }
            Some(user) => {
                // Enabled but no credential of any kind
                self.hasher.dummy_verify(password);
                self.record_login_error(realm, Some(&user), ip, "no_credential");
                Err(ApiError::InvalidCredentials)
            }
            None => self.verify_unknown(realm, username, password, ip).await,
        }
    }

    /// Local Argon2id path.
    async fn verify_local(
        &self,
        realm: &Realm,
        user: User,
        password: &str,
        ip: Option<&str>,
    ) -> Result<User, ApiError> {
        self.guard.check_locked(realm, &user).await?;

        let hash = user
            .password_hash
            .as_deref()
            .ok_or(ApiError::InvalidCredentials)?;

        if self.hasher.verify(password, hash)? {
            self.guard.reset_failures(realm, &user).await?;
            info!(user_id = %user.id, realm = %realm.name, "password verified");
            Ok(user)
        } else {
            self.guard.record_failure(realm, &user, ip).await?;
            self.record_login_error(realm, Some(&user), ip, "invalid_password");
            Err(ApiError::InvalidCredentials)
        }
    }

    /// Delegated verification for a linked user.
    async fn verify_federated(
        &self,
        realm: &Realm,
        user: User,
        password: &str,
        ip: Option<&str>,
    ) -> Result<User, ApiError> {
        self.guard.check_locked(realm, &user).await?;

        if !user.enabled {
            self.record_login_error(realm, Some(&user), ip, "account_disabled");
            return Err(ApiError::AccountDisabled);
        }

        let link = user
            .federation_link
            .as_deref()
            .ok_or(ApiError::InvalidCredentials)?;

        if self
            .federation
            .verify_credentials(realm, link, password)
            .await?
        {
            self.guard.reset_failures(realm, &user).await?;
            info!(user_id = %user.id, realm = %realm.name, "federated credentials verified");
            Ok(user)
        } else {
            self.guard.record_failure(realm, &user, ip).await?;
            self.record_login_error(realm, Some(&user), ip, "invalid_password");
            Err(ApiError::InvalidCredentials)
        }
    }

    /// Unknown username: federation bind when configured, dummy hash
    /// otherwise.
    async fn verify_unknown(
        &self,
        realm: &Realm,
        username: &str,
        password: &str,
        ip: Option<&str>,
    ) -> Result<User, ApiError> {
        if self.federation.is_configured(realm) {
            if let Some(identity) = self.federation.bind(realm, username, password).await? {
                let user = self
                    .users
                    .create(
                        NewUser {
                            realm_id: realm.id,
                            username: username.to_string(),
                            email: identity.email,
                            first_name: identity.first_name,
                            last_name: identity.last_name,
                            password_hash: None,
                            federation_link: Some(identity.external_id),
                            email_verified: false,
                        },
                        self.clock.now(),
                    )
                    .await?;

                info!(user_id = %user.id, realm = %realm.name, "federated user materialized");
                return Ok(user);
            }
        } else {
            // Keep the timing profile of a real verification
            self.hasher.dummy_verify(password);
        }

        warn!(realm = %realm.name, "login attempt for unknown username");
        self.record_login_error(realm, None, ip, "user_not_found");
        Err(ApiError::InvalidCredentials)
    }

    fn record_login_error(
        &self,
        realm: &Realm,
        user: Option<&User>,
        ip: Option<&str>,
        error: &str,
    ) {
        let mut event = NewEvent::login(realm.id, event_types::LOGIN_ERROR)
            .with_ip(ip.map(str::to_string))
            .with_error(error);
        if let Some(user) = user {
            event = event.with_user(user.id);
        }
        self.events.record(event);
    }
}
