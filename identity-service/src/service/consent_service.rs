//! # Consent Ledger
//!
//! Persistent per-(user, client) scope grants plus the transient consent
//! requests behind the approval page. Reading a transient request always
//! rotates its id: the old id dies with the read, so a cached or
//! re-submitted form cannot replay.

use chrono::Duration;
use shared::clock::SharedClock;
use shared::errors::ApiError;
use uuid::Uuid;

use crate::domain::{ConsentRequest, OAuthParams, Realm};
use crate::repository::ConsentRepository;

/// Consent request lifetime.
const CONSENT_REQUEST_TTL_MINUTES: i64 = 10;

/// Consent service.
#[derive(Clone)]
pub struct ConsentService {
    repository: ConsentRepository,
    clock: SharedClock,
}

impl ConsentService {
    pub fn new(repository: ConsentRepository, clock: SharedClock) -> Self {
        Self { repository, clock }
    }

    /// True iff every requested scope is already granted to the client.
    pub async fn has_consent(
        &self,
        user_id: Uuid,
        client_pk: Uuid,
        requested_scopes: &[String],
    ) -> Result<bool, ApiError> {
        match self.repository.find(user_id, client_pk).await? {
            Some(consent) => Ok(consent.covers(requested_scopes)),
            None => Ok(requested_scopes.is_empty()),
        }
    }

    /// Grants scopes, unioning with any previous grant.
    pub async fn grant_consent(
        &self,
        user_id: Uuid,
        client_pk: Uuid,
        scopes: &[String],
    ) -> Result<(), ApiError> {
        self.repository
            .grant(user_id, client_pk, scopes, self.clock.now())
            .await?;
        Ok(())
    }

    /// Revokes a client's grant entirely.
    pub async fn revoke_consent(&self, user_id: Uuid, client_pk: Uuid) -> Result<(), ApiError> {
        self.repository.revoke(user_id, client_pk).await
    }

    /// Creates a transient consent request and returns its opaque id.
    pub async fn create_request(
        &self,
        realm: &Realm,
        user_id: Uuid,
        client_pk: Uuid,
        scopes: &[String],
        params: &OAuthParams,
    ) -> Result<ConsentRequest, ApiError> {
        let expires_at = self.clock.now() + Duration::minutes(CONSENT_REQUEST_TTL_MINUTES);
        self.repository
            .create_request(
                realm.id,
                user_id,
                client_pk,
                scopes,
                &serde_json::to_value(params).unwrap_or_default(),
                expires_at,
            )
            .await
    }

    /// Takes a transient request and re-stores it under a fresh id.
    ///
    /// Returns the payload and its replacement. The presented id is dead
    /// either way.
    pub async fn read_and_rotate(
        &self,
        realm: &Realm,
        id: Uuid,
    ) -> Result<Option<(ConsentRequest, ConsentRequest)>, ApiError> {
        let Some(taken) = self
            .repository
            .take_request(realm.id, id, self.clock.now())
            .await?
        else {
            return Ok(None);
        };

        let expires_at = self.clock.now() + Duration::minutes(CONSENT_REQUEST_TTL_MINUTES);
        let replacement = self
            .repository
            .create_request(
                taken.realm_id,
                taken.user_id,
                taken.client_pk,
                &taken.scopes,
                &taken.oauth_params,
                expires_at,
            )
            .await?;

        Ok(Some((taken, replacement)))
    }

    /// Takes a transient request terminally (at the approval POST).
    pub async fn consume_request(
        &self,
        realm: &Realm,
        id: Uuid,
    ) -> Result<Option<ConsentRequest>, ApiError> {
        self.repository
            .take_request(realm.id, id, self.clock.now())
            .await
    }
}
