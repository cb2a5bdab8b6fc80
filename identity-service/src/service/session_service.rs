//! # Session and Refresh Lifecycle
//!
//! End-of-life handling for SSO sessions: single logout, logout
//! everywhere, and offline token management.
//!
//! ## Logout Semantics
//!
//! ```text
//! logout(session)
//!   ├── collect session participants (clients with tokens in the session)
//!   ├── revoke the session's non-offline refresh tokens
//!   │     (offline tokens survive; the session is only their origin)
//!   ├── delete the session row
//!   └── enqueue a signed logout_token POST per subscribed participant
//! ```
//!
//! Backchannel delivery is detachable: the user's logout response never
//! waits for it.

use shared::clock::SharedClock;
use shared::errors::ApiError;
use tracing::info;
use uuid::Uuid;

use crate::domain::event::event_types;
use crate::domain::{NewEvent, Realm, RefreshToken, SsoSession};
use crate::repository::{ClientRepository, SessionRepository};
use crate::service::backchannel::{BackchannelNotifier, LogoutNotification};
use crate::service::events_recorder::EventRecorder;
use crate::service::token_factory::TokenFactory;

/// Session lifecycle service.
#[derive(Clone)]
pub struct SessionLifecycle {
    sessions: SessionRepository,
    clients: ClientRepository,
    token_factory: TokenFactory,
    backchannel: BackchannelNotifier,
    events: EventRecorder,
    clock: SharedClock,
}

impl SessionLifecycle {
    pub fn new(
        sessions: SessionRepository,
        clients: ClientRepository,
        token_factory: TokenFactory,
        backchannel: BackchannelNotifier,
        events: EventRecorder,
        clock: SharedClock,
    ) -> Self {
        Self {
            sessions,
            clients,
            token_factory,
            backchannel,
            events,
            clock,
        }
    }

    /// Ends one SSO session.
    ///
    /// Non-offline refresh tokens are revoked, the session row is deleted
    /// (offline tokens keep living with a nulled origin pointer), and
    /// every participating client with a registered backchannel logout URI
    /// gets a signed `logout_token` POST.
    pub async fn logout_session(&self, realm: &Realm, session: &SsoSession) -> Result<(), ApiError> {
        // Participants must be collected before revocation deletes the
        // evidence
        let participant_pks = self.sessions.client_pks_for_session(session.id).await?;

        self.sessions.revoke_online_for_session(session.id).await?;
        self.sessions.delete_session(session.id).await?;

        info!(
            session_id = %session.id,
            user_id = %session.user_id,
            realm = %realm.name,
            "SSO session ended"
        );

        for client_pk in participant_pks {
            let Some(client) = self.clients.find_by_pk(client_pk).await? else {
                continue;
            };
            let Some(uri) = client.backchannel_logout_uri.clone() else {
                continue;
            };

            let logout_token = self
                .token_factory
                .issue_logout_token(realm, &client, session.user_id, Some(session.id))
                .await?;

            self.backchannel
                .enqueue(LogoutNotification {
                    realm_id: realm.id,
                    client_id: client.client_id.clone(),
                    uri,
                    logout_token,
                })
                .await;
        }

        self.events.record(
            NewEvent::login(realm.id, event_types::LOGOUT).with_user(session.user_id),
        );

        Ok(())
    }

    /// Ends every session of a user (password reset, admin action).
    /// Offline tokens survive here too; they are revoked individually.
    pub async fn logout_all_sessions(&self, realm: &Realm, user_id: Uuid) -> Result<u64, ApiError> {
        let sessions = self.sessions.sessions_for_user(realm.id, user_id).await?;
        let count = sessions.len() as u64;

        for session in sessions {
            self.logout_session(realm, &session).await?;
        }

        Ok(count)
    }

    /// Live sessions of a user.
    pub async fn list_sessions(
        &self,
        realm: &Realm,
        user_id: Uuid,
    ) -> Result<Vec<SsoSession>, ApiError> {
        self.sessions.sessions_for_user(realm.id, user_id).await
    }

    /// Live offline tokens of a user.
    pub async fn list_offline_tokens(
        &self,
        realm: &Realm,
        user_id: Uuid,
    ) -> Result<Vec<RefreshToken>, ApiError> {
        self.sessions
            .offline_tokens_for_user(realm.id, user_id, self.clock.now())
            .await
    }

    /// Revokes one offline token by id.
    pub async fn revoke_offline_token(&self, realm: &Realm, token_id: Uuid) -> Result<(), ApiError> {
        self.sessions.revoke_by_id(realm.id, token_id).await?;
        self.events
            .record(NewEvent::login(realm.id, event_types::TOKEN_REVOKED));
        Ok(())
    }
}
