//! # Device Flow Service
//!
//! RFC 8628 device authorization: a constrained device posts to the device
//! endpoint, shows the user a short code, and polls the token endpoint
//! while the user approves from a browser. Poll handling itself lives in
//! the token endpoint service; this service owns issuance and the
//! user-facing verification step.

use chrono::Duration;
use shared::clock::SharedClock;
use shared::crypto::random::{random_from_alphabet, secure_token, sha256_hex};
use shared::errors::ApiError;
use tracing::info;

use crate::domain::client::grant_types;
use crate::domain::{DeviceCode, NewDeviceCode, Realm, User};
use crate::protocol::{DeviceAuthorizationResponse, OAuthError, OAuthErrorKind};
use crate::repository::client_repository::AssignedScope;
use crate::repository::{ClientRepository, DeviceRepository};
use crate::service::authorize_service::resolve_scopes;
use crate::service::oauth_service::{extract_client_credentials, ClientCredentials};

/// Device code lifetime.
const DEVICE_CODE_TTL_SECS: i64 = 600;

/// Minimum seconds between polls.
const DEVICE_POLL_INTERVAL_SECS: i64 = 5;

/// User code alphabet: uppercase consonant-heavy set without lookalikes.
const USER_CODE_ALPHABET: &[u8] = b"BCDFGHJKLMNPQRSTVWXZ";

/// Device flow service.
#[derive(Clone)]
pub struct DeviceService {
    clients: ClientRepository,
    devices: DeviceRepository,
    base_url: String,
    clock: SharedClock,
}

impl DeviceService {
    pub fn new(
        clients: ClientRepository,
        devices: DeviceRepository,
        base_url: String,
        clock: SharedClock,
    ) -> Self {
        Self {
            clients,
            devices,
            base_url,
            clock,
        }
    }

    /// Handles `POST /auth/device`: starts a device authorization.
    pub async fn start(
        &self,
        realm: &Realm,
        authorization_header: Option<&str>,
        client_id: Option<&str>,
        client_secret: Option<&str>,
        scope: Option<&str>,
    ) -> Result<DeviceAuthorizationResponse, OAuthError> {
        let creds: ClientCredentials =
            extract_client_credentials(authorization_header, client_id, client_secret)?;

        let client = self
            .clients
            .find_by_client_id(realm.id, &creds.client_id)
            .await
            .map_err(OAuthError::from)?
            .filter(|c| c.enabled)
            .ok_or_else(OAuthError::invalid_client)?;

        if client.is_confidential() {
            let secret = creds
                .client_secret
                .as_deref()
                .ok_or_else(OAuthError::invalid_client)?;
            if client.secret_hash.as_deref() != Some(sha256_hex(secret).as_str()) {
                return Err(OAuthError::invalid_client());
            }
        }

        if !client.allows_grant(grant_types::DEVICE_CODE) {
            return Err(OAuthError::new(OAuthErrorKind::UnauthorizedClient));
        }

        let assigned: Vec<AssignedScope> = self
            .clients
            .assigned_scopes(client.id)
            .await
            .map_err(OAuthError::from)?;
        let requested: Vec<String> = scope
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let scopes = resolve_scopes(&assigned, &requested);

        let raw_device_code = secure_token();
        let user_code = generate_user_code();
        let now = self.clock.now();

        self.devices
            .create(NewDeviceCode {
                realm_id: realm.id,
                device_code_hash: sha256_hex(&raw_device_code),
                user_code: user_code.clone(),
                client_pk: client.id,
                scopes,
                interval_secs: DEVICE_POLL_INTERVAL_SECS as i32,
                expires_at: now + Duration::seconds(DEVICE_CODE_TTL_SECS),
            })
            .await
            .map_err(OAuthError::from)?;

        info!(client_id = %client.client_id, realm = %realm.name, "device authorization started");

        let verification_uri = format!(
            "{}/realms/{}/device",
            self.base_url.trim_end_matches('/'),
            realm.name
        );

        Ok(DeviceAuthorizationResponse {
            device_code: raw_device_code,
            verification_uri_complete: format!("{}?user_code={}", verification_uri, user_code),
            verification_uri,
            user_code,
            expires_in: DEVICE_CODE_TTL_SECS,
            interval: DEVICE_POLL_INTERVAL_SECS,
        })
    }

    /// Looks up a pending grant by user code, for the verification page.
    pub async fn find_pending(
        &self,
        realm: &Realm,
        user_code: &str,
    ) -> Result<Option<DeviceCode>, ApiError> {
        self.devices
            .find_pending_by_user_code(realm.id, &normalize_user_code(user_code), self.clock.now())
            .await
    }

    /// Resolves a pending grant after the signed-in user decided.
    ///
    /// Returns `false` when the code was unknown, expired, or already
    /// decided.
    pub async fn resolve(
        &self,
        realm: &Realm,
        user: &User,
        user_code: &str,
        approved: bool,
    ) -> Result<bool, ApiError> {
        let Some(device) = self.find_pending(realm, user_code).await? else {
            return Ok(false);
        };

        let resolved = self
            .devices
            .resolve(device.id, approved, approved.then_some(user.id))
            .await?;

        if resolved {
            info!(
                user_id = %user.id,
                realm = %realm.name,
                approved,
                "device grant resolved"
            );
        }

        Ok(resolved)
    }
}

/// Generates a user code in `XXXX-XXXX` form.
fn generate_user_code() -> String {
    let left = random_from_alphabet(USER_CODE_ALPHABET, 4);
    let right = random_from_alphabet(USER_CODE_ALPHABET, 4);
    format!("{}-{}", left, right)
}

/// Normalizes user input: uppercase, re-hyphenated.
fn normalize_user_code(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if cleaned.len() == 8 {
        format!("{}-{}", &cleaned[..4], &cleaned[4..])
    } else {
        cleaned
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_code_shape() {
        let code = generate_user_code();
        assert_eq!(code.len(), 9);
        assert_eq!(&code[4..5], "-");
        for c in code.chars().filter(|c| *c != '-') {
            assert!(USER_CODE_ALPHABET.contains(&(c as u8)), "bad char {}", c);
        }
    }

    #[test]
    fn test_normalize_user_code_variants() {
        assert_eq!(normalize_user_code("BCDF-GHJK"), "BCDF-GHJK");
        assert_eq!(normalize_user_code("bcdfghjk"), "BCDF-GHJK");
        assert_eq!(normalize_user_code("bcdf ghjk"), "BCDF-GHJK");
        assert_eq!(normalize_user_code("b c d f-g h j k"), "BCDF-GHJK");
        // Wrong lengths pass through cleaned but unhyphenated
        assert_eq!(normalize_user_code("abc"), "ABC");
    }
}
