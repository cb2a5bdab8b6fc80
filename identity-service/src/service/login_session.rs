//! # Login Session Store
//!
//! Browser SSO sessions. The cookie carries a 256-bit random value; the
//! database stores its SHA-256 hash. Validation hashes the presented value
//! and checks realm, expiry, and that the user is still enabled; any
//! mismatch reads as "no session".

use shared::clock::SharedClock;
use shared::crypto::random::{secure_token, sha256_hex};
use shared::errors::ApiError;
use tracing::info;

use crate::domain::{NewSsoSession, Realm, SsoSession, User};
use crate::repository::{SessionRepository, UserRepository};

/// Browser session service.
#[derive(Clone)]
pub struct LoginSessionStore {
    sessions: SessionRepository,
    users: UserRepository,
    clock: SharedClock,
}

impl LoginSessionStore {
    pub fn new(sessions: SessionRepository, users: UserRepository, clock: SharedClock) -> Self {
        Self {
            sessions,
            users,
            clock,
        }
    }

    /// Creates a session and returns the raw cookie value alongside the
    /// stored row. The raw value exists only in the response; the store
    /// keeps the hash.
    pub async fn create(
        &self,
        realm: &Realm,
        user: &User,
        ip: Option<String>,
        user_agent: Option<String>,
        remember_me: bool,
    ) -> Result<(String, SsoSession), ApiError> {
        let raw_token = secure_token();
        let now = self.clock.now();

        let session = self
            .sessions
            .create_session(NewSsoSession {
                realm_id: realm.id,
                user_id: user.id,
                token_hash: sha256_hex(&raw_token),
                ip_address: ip,
                user_agent,
                remember_me,
                auth_time: now,
                expires_at: now + realm.sso_session_lifespan(remember_me),
            })
            .await?;

        info!(
            user_id = %user.id,
            session_id = %session.id,
            realm = %realm.name,
            remember_me,
            "SSO session created"
        );

        Ok((raw_token, session))
    }

    /// Validates a cookie value.
    ///
    /// Returns `None` on hash mismatch, expiry, wrong realm, or a disabled
    /// user; the caller treats all of those identically (no session).
    pub async fn validate(
        &self,
        realm: &Realm,
        raw_token: &str,
    ) -> Result<Option<(SsoSession, User)>, ApiError> {
        let now = self.clock.now();
        let session = self
            .sessions
            .find_valid_session(realm.id, &sha256_hex(raw_token), now)
            .await?;

        let Some(session) = session else {
            return Ok(None);
        };

        let user = self.users.find_by_id(realm.id, session.user_id).await?;
        match user {
            Some(user) if user.enabled => Ok(Some((session, user))),
            _ => Ok(None),
        }
    }
}
