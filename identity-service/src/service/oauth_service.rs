//! # Token Endpoint Service
//!
//! The five grants of the token endpoint, plus introspection, revocation,
//! and userinfo. This is where the protocol's replay and rotation safety
//! lives:
//!
//! - authorization codes are consumed through a conditional UPDATE, so a
//!   replayed code answers `invalid_grant`
//! - refresh rotation claims the presented token through the same CAS
//!   shape; presenting a token that is already revoked is reuse, and reuse
//!   revokes every refresh token of the owning session and destroys the
//!   session itself
//! - device polls are paced in SQL and answer `slow_down` when hammered
//!
//! Client authentication accepts `client_secret_basic` and
//! `client_secret_post`; public clients authenticate by id and are held to
//! PKCE on the code grant.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use shared::clock::SharedClock;
use shared::crypto::pkce;
use shared::crypto::random::{secure_token, sha256_hex};
use shared::errors::ApiError;
use tracing::warn;
use uuid::Uuid;

use crate::domain::client::grant_types;
use crate::domain::event::event_types;
use crate::domain::{Client, NewEvent, NewRefreshToken, NewSsoSession, Realm, RefreshToken, User};
use crate::protocol::{IntrospectionResponse, OAuthError, OAuthErrorKind, TokenResponse};
use crate::repository::device_repository::DevicePoll;
use crate::repository::{
    ClientRepository, CodeRepository, DeviceRepository, SessionRepository, UserRepository,
};
use crate::service::credential_service::CredentialVerifier;
use crate::service::events_recorder::EventRecorder;
use crate::service::token_factory::TokenFactory;

/// Form body of a token endpoint request. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub device_code: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Form body of introspection and revocation requests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenActionRequest {
    pub token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Credentials presented by a client, from either auth method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Option<String>,
}

/// Token endpoint service.
#[derive(Clone)]
pub struct OAuthService {
    clients: ClientRepository,
    users: UserRepository,
    sessions: SessionRepository,
    codes: CodeRepository,
    devices: DeviceRepository,
    token_factory: TokenFactory,
    credentials: CredentialVerifier,
    events: EventRecorder,
    clock: SharedClock,
}

impl OAuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clients: ClientRepository,
        users: UserRepository,
        sessions: SessionRepository,
        codes: CodeRepository,
        devices: DeviceRepository,
        token_factory: TokenFactory,
        credentials: CredentialVerifier,
        events: EventRecorder,
        clock: SharedClock,
    ) -> Self {
        Self {
            clients,
            users,
            sessions,
            codes,
            devices,
            token_factory,
            credentials,
            events,
            clock,
        }
    }

    // =========================================================================
    // TOKEN ENDPOINT
    // =========================================================================

    /// Handles `POST /token` for all supported grants.
    pub async fn token(
        &self,
        realm: &Realm,
        authorization_header: Option<&str>,
        form: TokenRequest,
        ip: Option<&str>,
    ) -> Result<TokenResponse, OAuthError> {
        let creds = extract_client_credentials(
            authorization_header,
            form.client_id.as_deref(),
            form.client_secret.as_deref(),
        )?;
        let client = self.authenticate_client(realm, &creds).await?;

        let grant_type = form
            .grant_type
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("grant_type is required"))?;

        let known = matches!(
            grant_type,
            grant_types::AUTHORIZATION_CODE
                | grant_types::REFRESH_TOKEN
                | grant_types::CLIENT_CREDENTIALS
                | grant_types::PASSWORD
                | grant_types::DEVICE_CODE
        );
        if !known {
            return Err(OAuthError::new(OAuthErrorKind::UnsupportedGrantType));
        }

        if !client.allows_grant(grant_type) {
            return Err(OAuthError::new(OAuthErrorKind::UnauthorizedClient));
        }

        match grant_type {
            grant_types::AUTHORIZATION_CODE => {
                self.grant_authorization_code(realm, &client, &form).await
            }
            grant_types::REFRESH_TOKEN => self.grant_refresh_token(realm, &client, &form).await,
            grant_types::CLIENT_CREDENTIALS => {
                self.grant_client_credentials(realm, &client, &form).await
            }
            grant_types::PASSWORD => self.grant_password(realm, &client, &form, ip).await,
            grant_types::DEVICE_CODE => self.grant_device_code(realm, &client, &form).await,
            _ => Err(OAuthError::new(OAuthErrorKind::UnsupportedGrantType)),
        }
    }

    /// `authorization_code`: atomic consumption, PKCE, redirect binding.
    async fn grant_authorization_code(
        &self,
        realm: &Realm,
        client: &Client,
        form: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let raw_code = form
            .code
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("code is required"))?;
        let redirect_uri = form
            .redirect_uri
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("redirect_uri is required"))?;

        // Single-use: exactly one concurrent caller gets the row
        let code = self
            .codes
            .consume(realm.id, &sha256_hex(raw_code), self.clock.now())
            .await
            .map_err(OAuthError::from)?
            .ok_or_else(OAuthError::invalid_grant)?;

        if code.client_pk != client.id || code.redirect_uri != redirect_uri {
            return Err(OAuthError::invalid_grant());
        }

        // PKCE binding
        if let Some(challenge) = &code.code_challenge {
            let verifier = form
                .code_verifier
                .as_deref()
                .ok_or_else(OAuthError::invalid_grant)?;
            if !pkce::verify(verifier, challenge) {
                warn!(client_id = %client.client_id, "PKCE verification failed");
                return Err(OAuthError::invalid_grant());
            }
        } else if client.is_public() {
            return Err(OAuthError::invalid_grant());
        }

        let user = self
            .load_enabled_user(realm, code.user_id)
            .await?;

        let tokens = self
            .token_factory
            .issue_for_user(
                realm,
                client,
                &user,
                &code.scopes,
                code.session_id,
                code.auth_time,
                code.nonce.as_deref(),
            )
            .await
            .map_err(OAuthError::from)?;

        let refresh_token = self
            .maybe_issue_refresh_token(realm, client, &user, &code.scopes, code.session_id, None)
            .await?;

        self.events.record(
            NewEvent::login(realm.id, event_types::CODE_TO_TOKEN)
                .with_user(user.id)
                .with_client(&client.client_id),
        );

        Ok(TokenResponse {
            access_token: tokens.access_token,
            token_type: "Bearer".to_string(),
            expires_in: tokens.expires_in,
            refresh_token,
            id_token: tokens.id_token,
            scope: code.scopes.join(" "),
            session_state: code.session_id.map(|id| id.to_string()),
        })
    }

    /// `refresh_token`: rotation with reuse detection.
    async fn grant_refresh_token(
        &self,
        realm: &Realm,
        client: &Client,
        form: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let raw_token = form
            .refresh_token
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("refresh_token is required"))?;
        let token_hash = sha256_hex(raw_token);

        let presented = self
            .sessions
            .find_refresh_token(realm.id, &token_hash)
            .await
            .map_err(OAuthError::from)?
            .ok_or_else(OAuthError::invalid_grant)?;

        if presented.client_pk != client.id {
            return Err(OAuthError::invalid_grant());
        }

        if presented.revoked {
            // Reuse of a rotated-out token: burn the whole family
            self.handle_refresh_reuse(realm, client, &presented).await?;
            return Err(OAuthError::invalid_grant());
        }

        let now = self.clock.now();
        if presented.expires_at <= now {
            return Err(OAuthError::invalid_grant());
        }

        // Claim it. Losing the race means someone else rotated it between
        // our read and now, which is the same reuse situation.
        let claimed = self
            .sessions
            .claim_for_rotation(realm.id, &token_hash, now)
            .await
            .map_err(OAuthError::from)?;

        let Some(old) = claimed else {
            self.handle_refresh_reuse(realm, client, &presented).await?;
            return Err(OAuthError::invalid_grant());
        };

        // Same or narrowed scopes only
        let scopes = match form.scope.as_deref() {
            None => old.scopes.clone(),
            Some(requested) => {
                let requested: Vec<String> =
                    requested.split_whitespace().map(str::to_string).collect();
                if !requested.iter().all(|s| old.scopes.contains(s)) {
                    return Err(OAuthError::new(OAuthErrorKind::InvalidScope));
                }
                requested
            }
        };

        let user = self.load_enabled_user(realm, old.user_id).await?;

        let auth_time = match old.session_id {
            Some(session_id) => self
                .sessions
                .find_session_by_id(session_id)
                .await
                .map_err(OAuthError::from)?
                .map(|s| s.auth_time)
                .unwrap_or(now),
            None => now,
        };

        let tokens = self
            .token_factory
            .issue_for_user(realm, client, &user, &scopes, old.session_id, auth_time, None)
            .await
            .map_err(OAuthError::from)?;

        // Rotation: successor carries a strictly later created_at and a
        // parent pointer into the chain
        let new_raw = secure_token();
        self.sessions
            .create_refresh_token(
                NewRefreshToken {
                    realm_id: realm.id,
                    session_id: old.session_id,
                    client_pk: client.id,
                    user_id: old.user_id,
                    token_hash: sha256_hex(&new_raw),
                    scopes: scopes.clone(),
                    is_offline: old.is_offline,
                    parent_id: Some(old.id),
                    expires_at: now + realm.refresh_token_lifespan(old.is_offline),
                },
                now,
            )
            .await
            .map_err(OAuthError::from)?;

        self.events.record(
            NewEvent::login(realm.id, event_types::REFRESH_TOKEN)
                .with_user(user.id)
                .with_client(&client.client_id),
        );

        Ok(TokenResponse {
            access_token: tokens.access_token,
            token_type: "Bearer".to_string(),
            expires_in: tokens.expires_in,
            refresh_token: Some(new_raw),
            id_token: tokens.id_token,
            scope: scopes.join(" "),
            session_state: old.session_id.map(|id| id.to_string()),
        })
    }

    /// `client_credentials`: service account tokens, no refresh token.
    async fn grant_client_credentials(
        &self,
        realm: &Realm,
        client: &Client,
        form: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        if !client.is_confidential() {
            return Err(OAuthError::new(OAuthErrorKind::UnauthorizedClient));
        }

        let service_account_id = client
            .service_account_user_id
            .ok_or_else(|| OAuthError::new(OAuthErrorKind::UnauthorizedClient))?;
        let user = self.load_enabled_user(realm, service_account_id).await?;

        let scopes = self
            .resolve_scopes_for(client, form.scope.as_deref())
            .await?;

        let now = self.clock.now();
        let tokens = self
            .token_factory
            .issue_for_user(realm, client, &user, &scopes, None, now, None)
            .await
            .map_err(OAuthError::from)?;

        Ok(TokenResponse {
            access_token: tokens.access_token,
            token_type: "Bearer".to_string(),
            expires_in: tokens.expires_in,
            refresh_token: None,
            id_token: None,
            scope: scopes.join(" "),
            session_state: None,
        })
    }

    /// `password` (direct grant): full credential verification, then a
    /// server-side session to anchor the refresh token.
    async fn grant_password(
        &self,
        realm: &Realm,
        client: &Client,
        form: &TokenRequest,
        ip: Option<&str>,
    ) -> Result<TokenResponse, OAuthError> {
        let username = form
            .username
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("username is required"))?;
        let password = form
            .password
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("password is required"))?;

        let user = self
            .credentials
            .verify(realm, username, password, ip)
            .await
            .map_err(OAuthError::from)?;

        let scopes = self
            .resolve_scopes_for(client, form.scope.as_deref())
            .await?;

        let session = self.create_backing_session(realm, &user, ip).await?;

        let tokens = self
            .token_factory
            .issue_for_user(
                realm,
                client,
                &user,
                &scopes,
                Some(session_id(&session)),
                session.auth_time,
                None,
            )
            .await
            .map_err(OAuthError::from)?;

        let refresh_token = self
            .maybe_issue_refresh_token(
                realm,
                client,
                &user,
                &scopes,
                Some(session_id(&session)),
                None,
            )
            .await?;

        self.events.record(
            NewEvent::login(realm.id, event_types::LOGIN)
                .with_user(user.id)
                .with_client(&client.client_id)
                .with_ip(ip.map(str::to_string)),
        );

        Ok(TokenResponse {
            access_token: tokens.access_token,
            token_type: "Bearer".to_string(),
            expires_in: tokens.expires_in,
            refresh_token,
            id_token: tokens.id_token,
            scope: scopes.join(" "),
            session_state: Some(session_id(&session).to_string()),
        })
    }

    /// Device grant polling.
    async fn grant_device_code(
        &self,
        realm: &Realm,
        client: &Client,
        form: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let raw_device_code = form
            .device_code
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("device_code is required"))?;

        let poll = self
            .devices
            .poll(realm.id, &sha256_hex(raw_device_code), self.clock.now())
            .await
            .map_err(OAuthError::from)?;

        let device = match poll {
            DevicePoll::Unknown => return Err(OAuthError::invalid_grant()),
            DevicePoll::Expired => return Err(OAuthError::new(OAuthErrorKind::ExpiredToken)),
            DevicePoll::TooFast => return Err(OAuthError::new(OAuthErrorKind::SlowDown)),
            DevicePoll::State(device) => device,
        };

        if device.client_pk != client.id {
            return Err(OAuthError::invalid_grant());
        }

        match device.status.as_str() {
            "pending" => Err(OAuthError::new(OAuthErrorKind::AuthorizationPending)),
            "denied" => {
                self.devices
                    .delete(device.id)
                    .await
                    .map_err(OAuthError::from)?;
                Err(OAuthError::new(OAuthErrorKind::AccessDenied))
            }
            "approved" => {
                let user_id = device.user_id.ok_or_else(OAuthError::invalid_grant)?;
                let user = self.load_enabled_user(realm, user_id).await?;

                let session = self.create_backing_session(realm, &user, None).await?;

                let tokens = self
                    .token_factory
                    .issue_for_user(
                        realm,
                        client,
                        &user,
                        &device.scopes,
                        Some(session_id(&session)),
                        session.auth_time,
                        None,
                    )
                    .await
                    .map_err(OAuthError::from)?;

                let refresh_token = self
                    .maybe_issue_refresh_token(
                        realm,
                        client,
                        &user,
                        &device.scopes,
                        Some(session_id(&session)),
                        None,
                    )
                    .await?;

                // The grant is spent
                self.devices
                    .delete(device.id)
                    .await
                    .map_err(OAuthError::from)?;

                self.events.record(
                    NewEvent::login(realm.id, event_types::CODE_TO_TOKEN)
                        .with_user(user.id)
                        .with_client(&client.client_id),
                );

                Ok(TokenResponse {
                    access_token: tokens.access_token,
                    token_type: "Bearer".to_string(),
                    expires_in: tokens.expires_in,
                    refresh_token,
                    id_token: tokens.id_token,
                    scope: device.scopes.join(" "),
                    session_state: Some(session_id(&session).to_string()),
                })
            }
            _ => Err(OAuthError::new(OAuthErrorKind::ExpiredToken)),
        }
    }

    // =========================================================================
    // INTROSPECTION / REVOCATION / USERINFO
    // =========================================================================

    /// `POST /token/introspect` (RFC 7662). Requires client auth; invalid
    /// or unknown tokens answer `{"active": false}` rather than an error.
    pub async fn introspect(
        &self,
        realm: &Realm,
        authorization_header: Option<&str>,
        form: TokenActionRequest,
    ) -> Result<IntrospectionResponse, OAuthError> {
        let creds = extract_client_credentials(
            authorization_header,
            form.client_id.as_deref(),
            form.client_secret.as_deref(),
        )?;
        self.authenticate_client(realm, &creds).await?;

        let Some(token) = form.token.as_deref() else {
            return Err(OAuthError::invalid_request("token is required"));
        };

        // Refresh tokens are opaque: look up by hash first
        if let Some(refresh) = self
            .sessions
            .find_refresh_token(realm.id, &sha256_hex(token))
            .await
            .map_err(OAuthError::from)?
        {
            return Ok(self.introspect_refresh(realm, refresh).await);
        }

        // Otherwise treat it as an access JWT
        match self.token_factory.verify_access_token(realm, token).await {
            Ok(claims) => Ok(introspection_from_claims(&claims)),
            Err(_) => Ok(IntrospectionResponse::inactive()),
        }
    }

    async fn introspect_refresh(
        &self,
        realm: &Realm,
        token: RefreshToken,
    ) -> IntrospectionResponse {
        let now = self.clock.now();
        if token.revoked || token.expires_at <= now {
            return IntrospectionResponse::inactive();
        }

        let client_id = match self.clients.find_by_pk(token.client_pk).await {
            Ok(Some(client)) => Some(client.client_id),
            _ => None,
        };
        let username = match self.users.find_by_id(realm.id, token.user_id).await {
            Ok(Some(user)) => Some(user.username),
            _ => None,
        };

        IntrospectionResponse {
            active: true,
            sub: Some(token.user_id.to_string()),
            aud: client_id.clone().map(serde_json::Value::String),
            exp: Some(token.expires_at.timestamp()),
            iat: Some(token.created_at.timestamp()),
            scope: Some(token.scopes.join(" ")),
            client_id,
            username,
            token_type: Some("refresh_token".to_string()),
        }
    }

    /// `POST /revoke` (RFC 7009). Always succeeds from the caller's
    /// perspective; revoking an unknown token is a no-op.
    pub async fn revoke(
        &self,
        realm: &Realm,
        authorization_header: Option<&str>,
        form: TokenActionRequest,
    ) -> Result<(), OAuthError> {
        let creds = extract_client_credentials(
            authorization_header,
            form.client_id.as_deref(),
            form.client_secret.as_deref(),
        )?;
        let client = self.authenticate_client(realm, &creds).await?;

        let Some(token) = form.token.as_deref() else {
            return Ok(());
        };

        // Only the owning client can revoke a refresh token; mismatches
        // fall through to the silent no-op.
        if let Some(refresh) = self
            .sessions
            .find_refresh_token(realm.id, &sha256_hex(token))
            .await
            .map_err(OAuthError::from)?
        {
            if refresh.client_pk == client.id {
                self.sessions
                    .revoke_by_hash(realm.id, &refresh.token_hash)
                    .await
                    .map_err(OAuthError::from)?;
                self.events.record(
                    NewEvent::login(realm.id, event_types::TOKEN_REVOKED)
                        .with_user(refresh.user_id)
                        .with_client(&client.client_id),
                );
            }
        }
        // Access tokens are stateless JWTs; they age out on their own.

        Ok(())
    }

    /// `GET /userinfo`: claims for the bearer token's subject.
    pub async fn userinfo(
        &self,
        realm: &Realm,
        bearer_token: &str,
    ) -> Result<serde_json::Value, ApiError> {
        let claims = self
            .token_factory
            .verify_access_token(realm, bearer_token)
            .await?;

        let sub = claims
            .get("sub")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or(ApiError::InvalidToken)?;
        let azp = claims
            .get("azp")
            .and_then(|v| v.as_str())
            .ok_or(ApiError::InvalidToken)?;
        let scopes: Vec<String> = claims
            .get("scope")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let user = self
            .users
            .find_by_id(realm.id, sub)
            .await?
            .filter(|u| u.enabled)
            .ok_or(ApiError::InvalidToken)?;
        let client = self
            .clients
            .find_by_client_id(realm.id, azp)
            .await?
            .ok_or(ApiError::InvalidToken)?;

        let userinfo = self
            .token_factory
            .userinfo_claims(realm, &client, &user, &scopes)
            .await?;

        Ok(serde_json::Value::Object(userinfo))
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    /// Authenticates the calling client.
    async fn authenticate_client(
        &self,
        realm: &Realm,
        creds: &ClientCredentials,
    ) -> Result<Client, OAuthError> {
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
            let stored = client
                .secret_hash
                .as_deref()
                .ok_or_else(OAuthError::invalid_client)?;
            if sha256_hex(secret) != stored {
                warn!(client_id = %client.client_id, "client secret mismatch");
                return Err(OAuthError::invalid_client());
            }
        }

        Ok(client)
    }

    /// Reuse of a rotated-out refresh token: revoke the whole family and
    /// destroy the session.
    async fn handle_refresh_reuse(
        &self,
        realm: &Realm,
        client: &Client,
        token: &RefreshToken,
    ) -> Result<(), OAuthError> {
        warn!(
            client_id = %client.client_id,
            user_id = %token.user_id,
            session_id = ?token.session_id,
            "refresh token reuse detected"
        );

        if let Some(session_id) = token.session_id {
            self.sessions
                .revoke_all_for_session(session_id)
                .await
                .map_err(OAuthError::from)?;
            self.sessions
                .delete_session(session_id)
                .await
                .map_err(OAuthError::from)?;
        }

        self.events.record(
            NewEvent::login(realm.id, event_types::REFRESH_TOKEN_REUSE)
                .with_user(token.user_id)
                .with_client(&client.client_id)
                .with_error("refresh token reuse"),
        );

        Ok(())
    }

    /// Mints a refresh token when the client has the grant enabled.
    async fn maybe_issue_refresh_token(
        &self,
        realm: &Realm,
        client: &Client,
        user: &User,
        scopes: &[String],
        session: Option<Uuid>,
        parent: Option<Uuid>,
    ) -> Result<Option<String>, OAuthError> {
        if !client.allows_grant(grant_types::REFRESH_TOKEN) {
            return Ok(None);
        }

        let is_offline = scopes.iter().any(|s| s == "offline_access");
        let now = self.clock.now();
        let raw = secure_token();

        self.sessions
            .create_refresh_token(
                NewRefreshToken {
                    realm_id: realm.id,
                    session_id: session,
                    client_pk: client.id,
                    user_id: user.id,
                    token_hash: sha256_hex(&raw),
                    scopes: scopes.to_vec(),
                    is_offline,
                    parent_id: parent,
                    expires_at: now + realm.refresh_token_lifespan(is_offline),
                },
                now,
            )
            .await
            .map_err(OAuthError::from)?;

        Ok(Some(raw))
    }

    /// Server-side session backing a non-browser grant (password, device).
    async fn create_backing_session(
        &self,
        realm: &Realm,
        user: &User,
        ip: Option<&str>,
    ) -> Result<crate::domain::SsoSession, OAuthError> {
        let now = self.clock.now();
        self.sessions
            .create_session(NewSsoSession {
                realm_id: realm.id,
                user_id: user.id,
                token_hash: sha256_hex(&secure_token()),
                ip_address: ip.map(str::to_string),
                user_agent: None,
                remember_me: false,
                auth_time: now,
                expires_at: now + realm.sso_session_lifespan(false),
            })
            .await
            .map_err(OAuthError::from)
    }

    async fn resolve_scopes_for(
        &self,
        client: &Client,
        requested: Option<&str>,
    ) -> Result<Vec<String>, OAuthError> {
        let assigned = self
            .clients
            .assigned_scopes(client.id)
            .await
            .map_err(OAuthError::from)?;
        let requested: Vec<String> = requested
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_string)
            .collect();
        Ok(crate::service::authorize_service::resolve_scopes(
            &assigned, &requested,
        ))
    }

    async fn load_enabled_user(&self, realm: &Realm, user_id: Uuid) -> Result<User, OAuthError> {
        self.users
            .find_by_id(realm.id, user_id)
            .await
            .map_err(OAuthError::from)?
            .filter(|u| u.enabled)
            .ok_or_else(OAuthError::invalid_grant)
    }
}

fn session_id(session: &crate::domain::SsoSession) -> Uuid {
    session.id
}

// =============================================================================
// Client Authentication Parsing
// =============================================================================

/// Extracts client credentials from the Authorization header
/// (`client_secret_basic`) or the form body (`client_secret_post`).
pub fn extract_client_credentials(
    authorization_header: Option<&str>,
    form_client_id: Option<&str>,
    form_client_secret: Option<&str>,
) -> Result<ClientCredentials, OAuthError> {
    if let Some(header) = authorization_header {
        if let Some(encoded) = header.strip_prefix("Basic ") {
            return parse_basic_credentials(encoded);
        }
    }

    let client_id = form_client_id
        .filter(|id| !id.is_empty())
        .ok_or_else(OAuthError::invalid_client)?;

    Ok(ClientCredentials {
        client_id: client_id.to_string(),
        client_secret: form_client_secret
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    })
}

fn parse_basic_credentials(encoded: &str) -> Result<ClientCredentials, OAuthError> {
    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| OAuthError::invalid_client())?;
    let decoded = String::from_utf8(decoded).map_err(|_| OAuthError::invalid_client())?;

    let (client_id, secret) = decoded
        .split_once(':')
        .ok_or_else(OAuthError::invalid_client)?;

    if client_id.is_empty() {
        return Err(OAuthError::invalid_client());
    }

    Ok(ClientCredentials {
        client_id: client_id.to_string(),
        client_secret: if secret.is_empty() {
            None
        } else {
            Some(secret.to_string())
        },
    })
}

/// Introspection response from verified access-token claims.
fn introspection_from_claims(claims: &serde_json::Map<String, serde_json::Value>) -> IntrospectionResponse {
    IntrospectionResponse {
        active: true,
        sub: claims
            .get("sub")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        aud: claims.get("aud").cloned(),
        exp: claims.get("exp").and_then(|v| v.as_i64()),
        iat: claims.get("iat").and_then(|v| v.as_i64()),
        scope: claims
            .get("scope")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        client_id: claims
            .get("azp")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        username: claims
            .get("preferred_username")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        token_type: Some("Bearer".to_string()),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basic_auth_parsing() {
        // "app:s3cret"
        let header = format!("Basic {}", STANDARD.encode("app:s3cret"));
        let creds = extract_client_credentials(Some(&header), None, None).unwrap();
        assert_eq!(creds.client_id, "app");
        assert_eq!(creds.client_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_basic_auth_without_secret() {
        let header = format!("Basic {}", STANDARD.encode("public-app:"));
        let creds = extract_client_credentials(Some(&header), None, None).unwrap();
        assert_eq!(creds.client_id, "public-app");
        assert_eq!(creds.client_secret, None);
    }

    #[test]
    fn test_basic_auth_malformed() {
        assert!(extract_client_credentials(Some("Basic not-base64!!"), None, None).is_err());
        let no_colon = format!("Basic {}", STANDARD.encode("just-a-client"));
        assert!(extract_client_credentials(Some(&no_colon), None, None).is_err());
    }

    #[test]
    fn test_form_credentials_fallback() {
        let creds = extract_client_credentials(None, Some("app"), Some("s3cret")).unwrap();
        assert_eq!(creds.client_id, "app");
        assert_eq!(creds.client_secret.as_deref(), Some("s3cret"));

        let creds = extract_client_credentials(None, Some("app"), None).unwrap();
        assert_eq!(creds.client_secret, None);
    }

    #[test]
    fn test_missing_client_id_is_invalid_client() {
        let err = extract_client_credentials(None, None, None).unwrap_err();
        assert_eq!(err.kind, OAuthErrorKind::InvalidClient);

        let err = extract_client_credentials(None, Some(""), None).unwrap_err();
        assert_eq!(err.kind, OAuthErrorKind::InvalidClient);
    }

    #[test]
    fn test_header_wins_over_form() {
        let header = format!("Basic {}", STANDARD.encode("header-app:hs"));
        let creds =
            extract_client_credentials(Some(&header), Some("form-app"), Some("fs")).unwrap();
        assert_eq!(creds.client_id, "header-app");
    }

    #[test]
    fn test_introspection_from_claims() {
        let mut claims = serde_json::Map::new();
        claims.insert("sub".to_string(), json!("user-1"));
        claims.insert("aud".to_string(), json!("app"));
        claims.insert("azp".to_string(), json!("app"));
        claims.insert("exp".to_string(), json!(1_700_000_300));
        claims.insert("iat".to_string(), json!(1_700_000_000));
        claims.insert("scope".to_string(), json!("openid profile"));
        claims.insert("preferred_username".to_string(), json!("alice"));

        let response = introspection_from_claims(&claims);
        assert!(response.active);
        assert_eq!(response.sub.as_deref(), Some("user-1"));
        assert_eq!(response.client_id.as_deref(), Some("app"));
        assert_eq!(response.username.as_deref(), Some("alice"));
        assert_eq!(response.scope.as_deref(), Some("openid profile"));
        assert_eq!(response.exp, Some(1_700_000_300));
        assert_eq!(response.token_type.as_deref(), Some("Bearer"));
    }
}
