//! # Token Factory
//!
//! Assembles claims and signs every JWT the provider issues: access
//! tokens, ID tokens, and backchannel logout tokens. Signing uses the
//! realm's newest active RSA key; the `kid` header routes verification,
//! and `/certs` publishes all active keys as JWKS.
//!
//! ## Claim Assembly
//!
//! Base claims (`iss`, `sub`, `aud`, `exp`, `iat`, `auth_time`, `azp`,
//! `jti`, `scope`, `sid`) are always present. Everything else comes from
//! the protocol mappers bound to the resolved scopes: profile and email
//! claims, `realm_access.roles`, `resource_access.{clientId}.roles`,
//! extra audiences, and hardcoded claims. ID tokens additionally carry
//! `nonce` and `at_hash`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{json, Map, Value};
use shared::clock::SharedClock;
use shared::crypto::keys::{self, JwkSet};
use shared::crypto::random::sha256_bytes;
use shared::errors::ApiError;
use uuid::Uuid;

use crate::domain::client::{mapper_types, ProtocolMapper};
use crate::domain::{Client, Realm, RealmSigningKey, User};
use crate::repository::{ClientRepository, RoleRepository};
use crate::service::realm_cache::RealmCache;

/// Lifetime of a backchannel logout token.
const LOGOUT_TOKEN_LIFETIME_SECS: i64 = 120;

/// The OIDC backchannel logout event URI.
const BACKCHANNEL_LOGOUT_EVENT: &str = "http://schemas.openid.net/event/backchannel-logout";

/// Tokens minted for one grant.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub id_token: Option<String>,
    pub expires_in: i64,
}

/// JWT signing and verification service.
#[derive(Clone)]
pub struct TokenFactory {
    realm_cache: RealmCache,
    clients: ClientRepository,
    roles: RoleRepository,
    base_url: String,
    master_key: String,
    clock: SharedClock,
}

impl TokenFactory {
    pub fn new(
        realm_cache: RealmCache,
        clients: ClientRepository,
        roles: RoleRepository,
        base_url: String,
        master_key: String,
        clock: SharedClock,
    ) -> Self {
        Self {
            realm_cache,
            clients,
            roles,
            base_url,
            master_key,
            clock,
        }
    }

    /// The issuer string for a realm.
    pub fn issuer(&self, realm: &Realm) -> String {
        realm.issuer(&self.base_url)
    }

    // =========================================================================
    // ISSUANCE
    // =========================================================================

    /// Issues an access token (and an ID token when `openid` is in scope)
    /// for a user-bound grant.
    pub async fn issue_for_user(
        &self,
        realm: &Realm,
        client: &Client,
        user: &User,
        scopes: &[String],
        session_id: Option<Uuid>,
        auth_time: DateTime<Utc>,
        nonce: Option<&str>,
    ) -> Result<IssuedTokens, ApiError> {
        let now = self.clock.now();
        let expires_in = realm.access_token_lifespan_secs as i64;
        let (signing_key, encoding_key) = self.signing_key(realm).await?;

        let mapped = self.mapped_claims(realm, client, user, scopes).await?;

        // Access token
        let mut access = base_claims(
            &self.issuer(realm),
            &user.id.to_string(),
            &client.client_id,
            now,
            expires_in,
            auth_time,
            session_id,
            scopes,
        );
        access.insert("typ".to_string(), json!("Bearer"));
        access.insert(
            "preferred_username".to_string(),
            json!(user.username.clone()),
        );
        merge_claims(&mut access, &mapped);
        let access_token = sign(&signing_key.kid, &encoding_key, &access)?;

        // ID token, only for OIDC requests
        let id_token = if scopes.iter().any(|s| s == "openid") {
            let mut id = base_claims(
                &self.issuer(realm),
                &user.id.to_string(),
                &client.client_id,
                now,
                expires_in,
                auth_time,
                session_id,
                scopes,
            );
            id.insert(
                "preferred_username".to_string(),
                json!(user.username.clone()),
            );
            merge_claims(&mut id, &mapped);
            if let Some(nonce) = nonce {
                id.insert("nonce".to_string(), json!(nonce));
            }
            id.insert("at_hash".to_string(), json!(at_hash(&access_token)));
            Some(sign(&signing_key.kid, &encoding_key, &id)?)
        } else {
            None
        };

        Ok(IssuedTokens {
            access_token,
            id_token,
            expires_in,
        })
    }

    /// Signs a backchannel logout token for one client.
    ///
    /// `sid` is included when the client registered with
    /// `backchannel_logout_session_required`.
    pub async fn issue_logout_token(
        &self,
        realm: &Realm,
        client: &Client,
        user_id: Uuid,
        session_id: Option<Uuid>,
    ) -> Result<String, ApiError> {
        let now = self.clock.now();
        let (signing_key, encoding_key) = self.signing_key(realm).await?;

        let mut claims = Map::new();
        claims.insert("iss".to_string(), json!(self.issuer(realm)));
        claims.insert("aud".to_string(), json!(client.client_id.clone()));
        claims.insert("iat".to_string(), json!(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            json!((now + Duration::seconds(LOGOUT_TOKEN_LIFETIME_SECS)).timestamp()),
        );
        claims.insert("jti".to_string(), json!(Uuid::new_v4().to_string()));
        claims.insert("sub".to_string(), json!(user_id.to_string()));
        if client.backchannel_logout_session_required {
            if let Some(sid) = session_id {
                claims.insert("sid".to_string(), json!(sid.to_string()));
            }
        }
        claims.insert("events".to_string(), json!({ BACKCHANNEL_LOGOUT_EVENT: {} }));

        sign(&signing_key.kid, &encoding_key, &claims)
    }

    /// Userinfo claims for a verified bearer token's subject: `sub`,
    /// `preferred_username`, and whatever the mappers bound to the token's
    /// scopes contribute.
    pub async fn userinfo_claims(
        &self,
        realm: &Realm,
        client: &Client,
        user: &User,
        scopes: &[String],
    ) -> Result<Map<String, Value>, ApiError> {
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!(user.id.to_string()));
        claims.insert(
            "preferred_username".to_string(),
            json!(user.username.clone()),
        );

        let mapped = self.mapped_claims(realm, client, user, scopes).await?;
        merge_claims(&mut claims, &mapped);

        Ok(claims)
    }

    // =========================================================================
    // VERIFICATION
    // =========================================================================

    /// Verifies an access token against the realm's active keys.
    ///
    /// Checks signature (routed by `kid`), expiry, and issuer. Tokens
    /// signed by another realm's keys fail here, which is what keeps
    /// realms cryptographically isolated.
    pub async fn verify_access_token(
        &self,
        realm: &Realm,
        token: &str,
    ) -> Result<Map<String, Value>, ApiError> {
        let header = decode_header(token).map_err(|_| ApiError::InvalidToken)?;
        let kid = header.kid.ok_or(ApiError::InvalidToken)?;

        let keys = self.realm_cache.signing_keys(realm.id).await?;
        let key = keys
            .iter()
            .find(|k| k.kid == kid)
            .ok_or(ApiError::InvalidToken)?;

        let decoding_key = DecodingKey::from_rsa_pem(key.public_key_pem.as_bytes())
            .map_err(|_| ApiError::InvalidToken)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;
        validation.set_issuer(&[self.issuer(realm)]);
        validation.leeway = 0;

        let data = decode::<Map<String, Value>>(token, &decoding_key, &validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => ApiError::TokenExpired,
                _ => ApiError::InvalidToken,
            },
        )?;

        Ok(data.claims)
    }

    // =========================================================================
    // KEYS
    // =========================================================================

    /// The JWKS document for a realm: every active public key.
    pub async fn jwks(&self, realm: &Realm) -> Result<JwkSet, ApiError> {
        let stored = self.realm_cache.signing_keys(realm.id).await?;
        let mut jwks = Vec::with_capacity(stored.len());
        for key in stored.iter() {
            jwks.push(keys::jwk_from_public_pem(&key.kid, &key.public_key_pem)?);
        }
        Ok(JwkSet { keys: jwks })
    }

    /// The realm's newest active key, decrypted and ready to sign.
    async fn signing_key(&self, realm: &Realm) -> Result<(RealmSigningKey, EncodingKey), ApiError> {
        let keys = self.realm_cache.signing_keys(realm.id).await?;
        let newest = keys.first().ok_or_else(|| ApiError::Internal {
            message: format!("realm {} has no active signing key", realm.name),
        })?;

        let private_pem = keys::decrypt_private_key_pem(&newest.private_key_pem, &self.master_key)?;
        let encoding_key =
            EncodingKey::from_rsa_pem(private_pem.as_bytes()).map_err(|e| ApiError::Internal {
                message: format!("signing key unusable: {}", e),
            })?;

        Ok((newest.clone(), encoding_key))
    }

    // =========================================================================
    // MAPPERS
    // =========================================================================

    /// Claims contributed by the protocol mappers bound to the resolved
    /// scopes.
    async fn mapped_claims(
        &self,
        realm: &Realm,
        client: &Client,
        user: &User,
        scopes: &[String],
    ) -> Result<Map<String, Value>, ApiError> {
        let mappers = self
            .clients
            .mappers_for_scope_names(realm.id, scopes)
            .await?;

        let needs_realm_roles = mappers
            .iter()
            .any(|m| m.mapper_type == mapper_types::REALM_ROLES);
        let needs_client_roles = mappers
            .iter()
            .any(|m| m.mapper_type == mapper_types::CLIENT_ROLES);

        let realm_roles = if needs_realm_roles {
            self.roles.effective_realm_roles(user.id).await?
        } else {
            Vec::new()
        };
        let client_roles = if needs_client_roles {
            self.roles.effective_client_roles(user.id).await?
        } else {
            Vec::new()
        };

        let mut claims = Map::new();
        for mapper in &mappers {
            apply_mapper(&mut claims, mapper, user, client, &realm_roles, &client_roles);
        }

        Ok(claims)
    }
}

// =============================================================================
// Pure Claim Machinery
// =============================================================================

/// Standard claims shared by access and ID tokens.
#[allow(clippy::too_many_arguments)]
fn base_claims(
    issuer: &str,
    sub: &str,
    client_id: &str,
    now: DateTime<Utc>,
    expires_in: i64,
    auth_time: DateTime<Utc>,
    session_id: Option<Uuid>,
    scopes: &[String],
) -> Map<String, Value> {
    let mut claims = Map::new();
    claims.insert("iss".to_string(), json!(issuer));
    claims.insert("sub".to_string(), json!(sub));
    claims.insert("aud".to_string(), json!(client_id));
    claims.insert("exp".to_string(), json!((now.timestamp() + expires_in)));
    claims.insert("iat".to_string(), json!(now.timestamp()));
    claims.insert("auth_time".to_string(), json!(auth_time.timestamp()));
    claims.insert("azp".to_string(), json!(client_id));
    claims.insert("jti".to_string(), json!(Uuid::new_v4().to_string()));
    claims.insert("scope".to_string(), json!(scopes.join(" ")));
    if let Some(sid) = session_id {
        claims.insert("sid".to_string(), json!(sid.to_string()));
        claims.insert("session_state".to_string(), json!(sid.to_string()));
    }
    claims
}

/// Applies one protocol mapper to a claim set.
fn apply_mapper(
    claims: &mut Map<String, Value>,
    mapper: &ProtocolMapper,
    user: &User,
    client: &Client,
    realm_roles: &[String],
    client_roles: &[(String, String)],
) {
    match mapper.mapper_type.as_str() {
        mapper_types::USERNAME => {
            claims.insert(
                "preferred_username".to_string(),
                json!(user.username.clone()),
            );
        }
        mapper_types::EMAIL => {
            if let Some(email) = &user.email {
                claims.insert("email".to_string(), json!(email.clone()));
                claims.insert("email_verified".to_string(), json!(user.email_verified));
            }
        }
        mapper_types::PROFILE => {
            if let Some(first) = &user.first_name {
                claims.insert("given_name".to_string(), json!(first.clone()));
            }
            if let Some(last) = &user.last_name {
                claims.insert("family_name".to_string(), json!(last.clone()));
            }
            claims.insert("name".to_string(), json!(user.display_name()));
        }
        mapper_types::REALM_ROLES => {
            claims.insert("realm_access".to_string(), json!({ "roles": realm_roles }));
        }
        mapper_types::CLIENT_ROLES => {
            let mut by_client: Map<String, Value> = Map::new();
            for (client_id, role) in client_roles {
                let entry = by_client
                    .entry(client_id.clone())
                    .or_insert_with(|| json!({ "roles": [] }));
                if let Some(roles) = entry
                    .get_mut("roles")
                    .and_then(|r| r.as_array_mut())
                {
                    roles.push(json!(role));
                }
            }
            claims.insert("resource_access".to_string(), Value::Object(by_client));
        }
        mapper_types::AUDIENCE => {
            if let Some(extra) = mapper.config.get("value").and_then(|v| v.as_str()) {
                push_audience(claims, extra, &client.client_id);
            }
        }
        mapper_types::HARDCODED_CLAIM => {
            if let (Some(claim), Some(value)) =
                (mapper.config.get("claim").and_then(|c| c.as_str()), mapper.config.get("value"))
            {
                claims.insert(claim.to_string(), value.clone());
            }
        }
        other => {
            tracing::debug!(mapper_type = other, "unknown protocol mapper type skipped");
        }
    }
}

/// Adds an audience, converting the claim to an array when needed.
fn push_audience(claims: &mut Map<String, Value>, extra: &str, default_aud: &str) {
    let current = claims
        .get("aud")
        .cloned()
        .unwrap_or_else(|| json!(default_aud));

    let mut audiences: Vec<String> = match current {
        Value::String(s) => vec![s],
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => vec![default_aud.to_string()],
    };

    if !audiences.iter().any(|a| a == extra) {
        audiences.push(extra.to_string());
    }

    claims.insert("aud".to_string(), json!(audiences));
}

/// Later-merged claims win over base claims, matching mapper semantics.
fn merge_claims(target: &mut Map<String, Value>, mapped: &Map<String, Value>) {
    for (key, value) in mapped {
        target.insert(key.clone(), value.clone());
    }
}

/// `at_hash`: base64url of the left half of SHA-256 over the access token.
fn at_hash(access_token: &str) -> String {
    let digest = sha256_bytes(access_token.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..16])
}

/// Signs a claim set with the standard header shape
/// `{alg: RS256, kid, typ: JWT}`.
fn sign(kid: &str, key: &EncodingKey, claims: &Map<String, Value>) -> Result<String, ApiError> {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());

    encode(&header, claims, key).map_err(|e| ApiError::Internal {
        message: format!("JWT signing failed: {}", e),
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::client::client_types;
    use chrono::TimeZone;

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            realm_id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: Some("alice@example.com".to_string()),
            email_verified: true,
            first_name: Some("Alice".to_string()),
            last_name: Some("Smith".to_string()),
            enabled: true,
            password_hash: None,
            password_changed_at: None,
            federation_link: None,
            update_password_required: false,
            lockout_count: 0,
            permanently_locked: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_client() -> Client {
        Client {
            id: Uuid::new_v4(),
            realm_id: Uuid::new_v4(),
            client_id: "app".to_string(),
            client_type: client_types::PUBLIC.to_string(),
            secret_hash: None,
            redirect_uris: vec![],
            web_origins: vec![],
            grant_types: vec![],
            require_consent: false,
            backchannel_logout_uri: None,
            backchannel_logout_session_required: false,
            service_account_user_id: None,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn mapper(mapper_type: &str, config: Value) -> ProtocolMapper {
        ProtocolMapper {
            id: Uuid::new_v4(),
            scope_id: Uuid::new_v4(),
            name: mapper_type.to_string(),
            mapper_type: mapper_type.to_string(),
            config,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_base_claims_shape() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let auth_time = now - Duration::minutes(5);
        let sid = Uuid::new_v4();
        let claims = base_claims(
            "https://id.example.com/realms/acme",
            "user-1",
            "app",
            now,
            300,
            auth_time,
            Some(sid),
            &["openid".to_string(), "profile".to_string()],
        );

        assert_eq!(claims["iss"], json!("https://id.example.com/realms/acme"));
        assert_eq!(claims["sub"], json!("user-1"));
        assert_eq!(claims["aud"], json!("app"));
        assert_eq!(claims["azp"], json!("app"));
        assert_eq!(claims["exp"], json!(now.timestamp() + 300));
        assert_eq!(claims["iat"], json!(now.timestamp()));
        assert_eq!(claims["auth_time"], json!(auth_time.timestamp()));
        assert_eq!(claims["scope"], json!("openid profile"));
        assert_eq!(claims["sid"], json!(sid.to_string()));
        assert!(claims.contains_key("jti"));
    }

    #[test]
    fn test_email_mapper() {
        let mut claims = Map::new();
        apply_mapper(
            &mut claims,
            &mapper(mapper_types::EMAIL, json!({})),
            &test_user(),
            &test_client(),
            &[],
            &[],
        );
        assert_eq!(claims["email"], json!("alice@example.com"));
        assert_eq!(claims["email_verified"], json!(true));
    }

    #[test]
    fn test_profile_mapper() {
        let mut claims = Map::new();
        apply_mapper(
            &mut claims,
            &mapper(mapper_types::PROFILE, json!({})),
            &test_user(),
            &test_client(),
            &[],
            &[],
        );
        assert_eq!(claims["given_name"], json!("Alice"));
        assert_eq!(claims["family_name"], json!("Smith"));
        assert_eq!(claims["name"], json!("Alice Smith"));
    }

    #[test]
    fn test_realm_roles_mapper() {
        let mut claims = Map::new();
        apply_mapper(
            &mut claims,
            &mapper(mapper_types::REALM_ROLES, json!({})),
            &test_user(),
            &test_client(),
            &["admin".to_string(), "user".to_string()],
            &[],
        );
        assert_eq!(
            claims["realm_access"],
            json!({ "roles": ["admin", "user"] })
        );
    }

    #[test]
    fn test_client_roles_mapper_groups_by_client() {
        let mut claims = Map::new();
        apply_mapper(
            &mut claims,
            &mapper(mapper_types::CLIENT_ROLES, json!({})),
            &test_user(),
            &test_client(),
            &[],
            &[
                ("app".to_string(), "editor".to_string()),
                ("app".to_string(), "viewer".to_string()),
                ("billing".to_string(), "auditor".to_string()),
            ],
        );
        assert_eq!(
            claims["resource_access"],
            json!({
                "app": { "roles": ["editor", "viewer"] },
                "billing": { "roles": ["auditor"] },
            })
        );
    }

    #[test]
    fn test_audience_mapper_converts_to_array() {
        let mut claims = Map::new();
        claims.insert("aud".to_string(), json!("app"));

        apply_mapper(
            &mut claims,
            &mapper(mapper_types::AUDIENCE, json!({ "value": "api" })),
            &test_user(),
            &test_client(),
            &[],
            &[],
        );
        assert_eq!(claims["aud"], json!(["app", "api"]));

        // Adding the same audience again does not duplicate
        apply_mapper(
            &mut claims,
            &mapper(mapper_types::AUDIENCE, json!({ "value": "api" })),
            &test_user(),
            &test_client(),
            &[],
            &[],
        );
        assert_eq!(claims["aud"], json!(["app", "api"]));
    }

    #[test]
    fn test_hardcoded_claim_mapper() {
        let mut claims = Map::new();
        apply_mapper(
            &mut claims,
            &mapper(
                mapper_types::HARDCODED_CLAIM,
                json!({ "claim": "tenant", "value": "acme" }),
            ),
            &test_user(),
            &test_client(),
            &[],
            &[],
        );
        assert_eq!(claims["tenant"], json!("acme"));
    }

    #[test]
    fn test_at_hash_is_left_half_of_sha256() {
        let token = "dummy.access.token";
        let hash = at_hash(token);

        let digest = sha256_bytes(token.as_bytes());
        assert_eq!(hash, URL_SAFE_NO_PAD.encode(&digest[..16]));
        // 16 bytes -> 22 base64url chars, no padding
        assert_eq!(hash.len(), 22);
        assert!(!hash.contains('='));
    }
}
