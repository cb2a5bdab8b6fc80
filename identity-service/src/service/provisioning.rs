//! # Realm Provisioning
//!
//! Everything a realm needs before its first login: an active signing key
//! and the built-in client scopes with their protocol mappers. Runs at
//! realm creation and is idempotent, so re-running against an existing
//! realm repairs missing pieces without clobbering customizations.
//!
//! ## Built-in Scopes
//!
//! | Scope | Mappers |
//! |-------|---------|
//! | `openid` | (marker scope, no mappers) |
//! | `profile` | username, profile (given/family/full name) |
//! | `email` | email + email_verified |
//! | `roles` | realm roles, client roles |
//! | `offline_access` | (marker scope, switches refresh tokens offline) |

use serde_json::json;
use shared::crypto::keys;
use shared::errors::ApiError;
use tracing::info;

use crate::domain::client::mapper_types;
use crate::domain::Realm;
use crate::repository::{ClientRepository, KeyRepository};

/// Ensures the realm has an active signing key and the built-in scopes.
pub async fn provision_realm(
    realm: &Realm,
    clients: &ClientRepository,
    signing_keys: &KeyRepository,
    master_key: &str,
) -> Result<(), ApiError> {
    if signing_keys.active_keys(realm.id).await?.is_empty() {
        info!(realm = %realm.name, "generating initial signing key");
        let key = keys::generate_signing_key(master_key)?;
        signing_keys.insert(realm.id, &key).await?;
    }

    provision_builtin_scopes(realm, clients).await
}

/// Rotates the realm's signing key: a new active key starts signing, the
/// old keys stay active (still verifying and published in JWKS) until
/// every token signed with them has expired, then get deactivated.
pub async fn rotate_signing_key(
    realm: &Realm,
    signing_keys: &KeyRepository,
    master_key: &str,
) -> Result<String, ApiError> {
    let key = keys::generate_signing_key(master_key)?;
    let stored = signing_keys.insert(realm.id, &key).await?;

    info!(realm = %realm.name, kid = %stored.kid, "signing key rotated");

    Ok(stored.kid)
}

/// Rotates a confidential client's secret.
///
/// The plaintext is returned exactly once; only its hash is stored.
pub async fn rotate_client_secret(
    clients: &ClientRepository,
    client_pk: uuid::Uuid,
) -> Result<String, ApiError> {
    let secret = shared::crypto::random::secure_token();
    clients
        .update_secret_hash(client_pk, &shared::crypto::random::sha256_hex(&secret))
        .await?;

    Ok(secret)
}

/// Creates the built-in scopes and their mappers where missing.
pub async fn provision_builtin_scopes(
    realm: &Realm,
    clients: &ClientRepository,
) -> Result<(), ApiError> {
    // openid: marks a request as OIDC; the ID token itself carries the
    // standard claims
    clients
        .ensure_scope(realm.id, "openid", Some("OpenID Connect marker scope"), true)
        .await?;

    let profile = clients
        .ensure_scope(realm.id, "profile", Some("User profile claims"), true)
        .await?;
    let email = clients
        .ensure_scope(realm.id, "email", Some("Email address claims"), true)
        .await?;
    let roles = clients
        .ensure_scope(realm.id, "roles", Some("Role claims"), true)
        .await?;
    clients
        .ensure_scope(
            realm.id,
            "offline_access",
            Some("Refresh tokens that survive logout"),
            true,
        )
        .await?;

    // Mappers are only seeded onto freshly created scopes; a scope that
    // already carries mappers keeps them as-is
    let profile_mappers = clients
        .mappers_for_scope_names(realm.id, &["profile".to_string()])
        .await?;
    if profile_mappers.is_empty() {
        clients
            .add_mapper(profile.id, "username", mapper_types::USERNAME, &json!({}))
            .await?;
        clients
            .add_mapper(profile.id, "full name", mapper_types::PROFILE, &json!({}))
            .await?;
    }

    let email_mappers = clients
        .mappers_for_scope_names(realm.id, &["email".to_string()])
        .await?;
    if email_mappers.is_empty() {
        clients
            .add_mapper(email.id, "email", mapper_types::EMAIL, &json!({}))
            .await?;
    }

    let role_mappers = clients
        .mappers_for_scope_names(realm.id, &["roles".to_string()])
        .await?;
    if role_mappers.is_empty() {
        clients
            .add_mapper(roles.id, "realm roles", mapper_types::REALM_ROLES, &json!({}))
            .await?;
        clients
            .add_mapper(roles.id, "client roles", mapper_types::CLIENT_ROLES, &json!({}))
            .await?;
    }

    Ok(())
}
