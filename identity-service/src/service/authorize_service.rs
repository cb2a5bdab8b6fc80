//! # Authorization Endpoint Service
//!
//! Validation of authorization requests and issuance of single-use codes.
//!
//! Validation failures split into two classes, per RFC 6749 §4.1.2.1:
//!
//! - **Fatal**: unknown client or unregistered `redirect_uri`. The user
//!   agent is never redirected to an unvalidated URI; an error page is
//!   rendered instead.
//! - **Redirectable**: everything else (bad response type, missing PKCE,
//!   malformed scope). The error goes back to the client's redirect URI
//!   with `state` preserved.

use chrono::{DateTime, Duration, Utc};
use shared::clock::SharedClock;
use shared::crypto::random::{secure_token, sha256_hex};
use shared::errors::ApiError;
use uuid::Uuid;

use crate::domain::client::grant_types;
use crate::domain::{Client, NewAuthorizationCode, OAuthParams, Realm};
use crate::repository::client_repository::AssignedScope;
use crate::repository::{ClientRepository, CodeRepository};

/// Authorization code lifetime. Well under the 10-minute protocol cap.
const CODE_LIFETIME_SECS: i64 = 60;

/// A validated authorization request, ready for the login state machine.
#[derive(Debug, Clone)]
pub struct ValidatedAuthRequest {
    pub client: Client,
    /// Resolved scopes: client defaults plus requested optional scopes
    pub scopes: Vec<String>,
}

/// How an authorization request failed.
#[derive(Debug)]
pub enum AuthorizeError {
    /// Do not redirect; render an error page
    Fatal(ApiError),
    /// Redirect back to the validated redirect URI with an OAuth error
    Redirect {
        redirect_uri: String,
        error: &'static str,
        description: Option<String>,
        state: Option<String>,
    },
}

impl From<ApiError> for AuthorizeError {
    fn from(error: ApiError) -> Self {
        Self::Fatal(error)
    }
}

/// Authorization endpoint service.
#[derive(Clone)]
pub struct AuthorizeService {
    clients: ClientRepository,
    codes: CodeRepository,
    clock: SharedClock,
}

impl AuthorizeService {
    pub fn new(clients: ClientRepository, codes: CodeRepository, clock: SharedClock) -> Self {
        Self {
            clients,
            codes,
            clock,
        }
    }

    /// Validates an authorization request.
    ///
    /// Client and redirect URI are checked before anything else; only
    /// after both pass is any error allowed to travel to the redirect URI.
    pub async fn validate_request(
        &self,
        realm: &Realm,
        params: &OAuthParams,
    ) -> Result<ValidatedAuthRequest, AuthorizeError> {
        let client = self
            .clients
            .find_by_client_id(realm.id, &params.client_id)
            .await?
            .filter(|c| c.enabled)
            .ok_or_else(|| {
                AuthorizeError::Fatal(ApiError::NotFound {
                    resource: format!("client:{}", params.client_id),
                })
            })?;

        // Byte-exact match against the registered list
        if !client.redirect_uri_allowed(&params.redirect_uri) {
            return Err(AuthorizeError::Fatal(ApiError::BadRequest {
                message: "redirect_uri is not registered for this client".to_string(),
            }));
        }

        let redirect = |error: &'static str, description: &str| AuthorizeError::Redirect {
            redirect_uri: params.redirect_uri.clone(),
            error,
            description: Some(description.to_string()),
            state: params.state.clone(),
        };

        if params.response_type.as_deref() != Some("code") {
            return Err(redirect(
                "unsupported_response_type",
                "only response_type=code is supported",
            ));
        }

        if !client.allows_grant(grant_types::AUTHORIZATION_CODE) {
            return Err(redirect(
                "unauthorized_client",
                "client may not use the authorization code grant",
            ));
        }

        // PKCE: S256 only; mandatory for public clients
        match (&params.code_challenge, &params.code_challenge_method) {
            (Some(_), Some(method)) if method != "S256" => {
                return Err(redirect(
                    "invalid_request",
                    "code_challenge_method must be S256",
                ));
            }
            (Some(_), None) => {
                return Err(redirect(
                    "invalid_request",
                    "code_challenge_method is required with code_challenge",
                ));
            }
            (None, _) if client.is_public() => {
                return Err(redirect(
                    "invalid_request",
                    "public clients must use PKCE",
                ));
            }
            _ => {}
        }

        let assigned = self.clients.assigned_scopes(client.id).await?;
        let scopes = resolve_scopes(&assigned, &params.requested_scopes());

        Ok(ValidatedAuthRequest { client, scopes })
    }

    /// Issues a single-use authorization code bound to the authenticated
    /// session, returning the raw code for the redirect.
    pub async fn issue_code(
        &self,
        realm: &Realm,
        request: &ValidatedAuthRequest,
        user_id: Uuid,
        session_id: Option<Uuid>,
        auth_time: DateTime<Utc>,
        params: &OAuthParams,
    ) -> Result<String, ApiError> {
        let raw_code = secure_token();

        self.codes
            .create(NewAuthorizationCode {
                realm_id: realm.id,
                code_hash: sha256_hex(&raw_code),
                client_pk: request.client.id,
                user_id,
                session_id,
                redirect_uri: params.redirect_uri.clone(),
                scopes: request.scopes.clone(),
                nonce: params.nonce.clone(),
                code_challenge: params.code_challenge.clone(),
                code_challenge_method: params.code_challenge_method.clone(),
                auth_time,
                expires_at: self.clock.now() + Duration::seconds(CODE_LIFETIME_SECS),
            })
            .await?;

        Ok(raw_code)
    }
}

// =============================================================================
// Pure Helpers
// =============================================================================

/// Scope resolution: the client's default scopes, plus requested scopes
/// that appear among its optional scopes. Unknown requested scopes are
/// silently dropped.
pub fn resolve_scopes(assigned: &[AssignedScope], requested: &[String]) -> Vec<String> {
    let mut scopes: Vec<String> = assigned
        .iter()
        .filter(|a| a.assignment == "default")
        .map(|a| a.scope.name.clone())
        .collect();

    for name in requested {
        let is_optional = assigned
            .iter()
            .any(|a| a.assignment == "optional" && &a.scope.name == name);
        if is_optional && !scopes.contains(name) {
            scopes.push(name.clone());
        }
    }

    scopes
}

/// Success redirect: `{redirect_uri}?code=...&state=...`.
pub fn redirect_with_code(redirect_uri: &str, code: &str, state: Option<&str>) -> String {
    let mut pairs = vec![("code", code)];
    if let Some(state) = state {
        pairs.push(("state", state));
    }
    append_query(redirect_uri, &pairs)
}

/// Error redirect: `{redirect_uri}?error=...&error_description=...&state=...`.
pub fn redirect_with_error(
    redirect_uri: &str,
    error: &str,
    description: Option<&str>,
    state: Option<&str>,
) -> String {
    let mut pairs = vec![("error", error)];
    if let Some(description) = description {
        pairs.push(("error_description", description));
    }
    if let Some(state) = state {
        pairs.push(("state", state));
    }
    append_query(redirect_uri, &pairs)
}

fn append_query(uri: &str, pairs: &[(&str, &str)]) -> String {
    let query = serde_urlencoded::to_string(pairs).unwrap_or_default();
    if uri.contains('?') {
        format!("{}&{}", uri, query)
    } else {
        format!("{}?{}", uri, query)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::client::ClientScope;

    fn assigned(name: &str, assignment: &str) -> AssignedScope {
        AssignedScope {
            scope: ClientScope {
                id: Uuid::new_v4(),
                realm_id: Uuid::new_v4(),
                name: name.to_string(),
                description: None,
                built_in: true,
                created_at: Utc::now(),
            },
            assignment: assignment.to_string(),
        }
    }

    #[test]
    fn test_defaults_always_included() {
        let scopes = resolve_scopes(
            &[assigned("openid", "default"), assigned("profile", "default")],
            &[],
        );
        assert_eq!(scopes, vec!["openid", "profile"]);
    }

    #[test]
    fn test_optional_included_only_when_requested() {
        let assigned_scopes = vec![
            assigned("openid", "default"),
            assigned("email", "optional"),
            assigned("offline_access", "optional"),
        ];

        let scopes = resolve_scopes(&assigned_scopes, &[]);
        assert_eq!(scopes, vec!["openid"]);

        let scopes = resolve_scopes(&assigned_scopes, &["email".to_string()]);
        assert_eq!(scopes, vec!["openid", "email"]);

        let scopes = resolve_scopes(
            &assigned_scopes,
            &["offline_access".to_string(), "email".to_string()],
        );
        assert_eq!(scopes, vec!["openid", "offline_access", "email"]);
    }

    #[test]
    fn test_unknown_scopes_silently_dropped() {
        let assigned_scopes = vec![assigned("openid", "default")];
        let scopes = resolve_scopes(&assigned_scopes, &["made-up".to_string()]);
        assert_eq!(scopes, vec!["openid"]);
    }

    #[test]
    fn test_requesting_a_default_does_not_duplicate() {
        let assigned_scopes = vec![assigned("openid", "default")];
        let scopes = resolve_scopes(&assigned_scopes, &["openid".to_string()]);
        assert_eq!(scopes, vec!["openid"]);
    }

    #[test]
    fn test_redirect_with_code_and_state() {
        let url = redirect_with_code("https://app.example/cb", "abc123", Some("xyz"));
        assert_eq!(url, "https://app.example/cb?code=abc123&state=xyz");
    }

    #[test]
    fn test_redirect_appends_to_existing_query() {
        let url = redirect_with_code("https://app.example/cb?tenant=1", "abc", None);
        assert_eq!(url, "https://app.example/cb?tenant=1&code=abc");
    }

    #[test]
    fn test_redirect_with_error_escapes_description() {
        let url = redirect_with_error(
            "https://app.example/cb",
            "invalid_request",
            Some("public clients must use PKCE"),
            Some("s t"),
        );
        assert!(url.starts_with("https://app.example/cb?error=invalid_request"));
        assert!(url.contains("error_description=public+clients+must+use+PKCE"));
        assert!(url.contains("state=s+t"));
    }
}
