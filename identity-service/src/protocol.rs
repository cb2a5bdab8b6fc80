//! # OAuth / OIDC Wire Vocabulary
//!
//! The protocol-visible error type and the response shapes shared by the
//! token, introspection, revocation, device, and discovery endpoints.
//!
//! Internal errors never leak here: every [`shared::errors::ApiError`] maps
//! to the nearest RFC 6749 error code, with transient storage trouble
//! surfacing as `temporarily_unavailable` (503).

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use shared::errors::ApiError;
use thiserror::Error;

// =============================================================================
// Protocol Errors
// =============================================================================

/// RFC 6749 / RFC 8628 error codes, as they appear in the `error` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthErrorKind {
    InvalidRequest,
    InvalidGrant,
    InvalidClient,
    UnauthorizedClient,
    UnsupportedGrantType,
    UnsupportedResponseType,
    InvalidScope,
    AccessDenied,
    AuthorizationPending,
    SlowDown,
    ExpiredToken,
    ServerError,
    TemporarilyUnavailable,
}

impl OAuthErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidClient => "invalid_client",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::InvalidScope => "invalid_scope",
            Self::AccessDenied => "access_denied",
            Self::AuthorizationPending => "authorization_pending",
            Self::SlowDown => "slow_down",
            Self::ExpiredToken => "expired_token",
            Self::ServerError => "server_error",
            Self::TemporarilyUnavailable => "temporarily_unavailable",
        }
    }
}

/// Error returned by protocol endpoints as
/// `{"error": ..., "error_description": ...}`.
#[derive(Debug, Clone, Error)]
#[error("{kind:?}")]
pub struct OAuthError {
    pub kind: OAuthErrorKind,
    pub description: Option<String>,
}

impl OAuthError {
    pub fn new(kind: OAuthErrorKind) -> Self {
        Self {
            kind,
            description: None,
        }
    }

    pub fn with_description(kind: OAuthErrorKind, description: &str) -> Self {
        Self {
            kind,
            description: Some(description.to_string()),
        }
    }

    pub fn invalid_request(description: &str) -> Self {
        Self::with_description(OAuthErrorKind::InvalidRequest, description)
    }

    pub fn invalid_grant() -> Self {
        Self::new(OAuthErrorKind::InvalidGrant)
    }

    pub fn invalid_client() -> Self {
        Self::new(OAuthErrorKind::InvalidClient)
    }

    /// HTTP status for this error.
    ///
    /// `invalid_client` answers 401 (RFC 6749 §5.2), storage trouble 503,
    /// server faults 500, everything else 400.
    pub fn status_code(&self) -> StatusCode {
        match self.kind {
            OAuthErrorKind::InvalidClient => StatusCode::UNAUTHORIZED,
            OAuthErrorKind::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            OAuthErrorKind::TemporarilyUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Maps internal failures to protocol errors without leaking messages.
impl From<ApiError> for OAuthError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::InvalidCredentials
            | ApiError::AccountLocked { .. }
            | ApiError::AccountDisabled
            | ApiError::TokenExpired
            | ApiError::InvalidToken => Self::new(OAuthErrorKind::InvalidGrant),
            ApiError::MissingAuth => Self::new(OAuthErrorKind::InvalidClient),
            ApiError::Forbidden { .. } => Self::new(OAuthErrorKind::AccessDenied),
            ApiError::NotFound { .. } => Self::new(OAuthErrorKind::InvalidRequest),
            ApiError::ValidationError(_)
            | ApiError::BadRequest { .. }
            | ApiError::PolicyViolation { .. }
            | ApiError::Conflict { .. } => Self::new(OAuthErrorKind::InvalidRequest),
            ApiError::RateLimited { .. } => Self::new(OAuthErrorKind::SlowDown),
            ApiError::Database(_) => Self::new(OAuthErrorKind::TemporarilyUnavailable),
            ApiError::Internal { .. } | ApiError::ServiceUnavailable { .. } => {
                Self::new(OAuthErrorKind::ServerError)
            }
        }
    }
}

/// Serialized error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct OAuthErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ResponseError for OAuthError {
    fn status_code(&self) -> StatusCode {
        self.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        if matches!(
            self.kind,
            OAuthErrorKind::ServerError | OAuthErrorKind::TemporarilyUnavailable
        ) {
            tracing::error!(error = self.kind.as_str(), "token endpoint failure");
        }

        let mut builder = HttpResponse::build(self.status_code());
        if self.kind == OAuthErrorKind::InvalidClient {
            builder.insert_header(("WWW-Authenticate", "Basic realm=\"token endpoint\""));
        }
        builder.json(OAuthErrorBody {
            error: self.kind.as_str().to_string(),
            error_description: self.description.clone(),
        })
    }
}

// =============================================================================
// Response Shapes
// =============================================================================

/// Successful token endpoint response (RFC 6749 §5.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_state: Option<String>,
}

/// Introspection response (RFC 7662). Inactive tokens serialize to just
/// `{"active": false}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl IntrospectionResponse {
    pub fn inactive() -> Self {
        Self::default()
    }
}

/// Device authorization response (RFC 8628 §3.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthorizationResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: String,
    pub expires_in: i64,
    pub interval: i64,
}

/// OpenID Connect Discovery 1.0 document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub introspection_endpoint: String,
    pub revocation_endpoint: String,
    pub end_session_endpoint: String,
    pub device_authorization_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub backchannel_logout_supported: bool,
    pub backchannel_logout_session_supported: bool,
}

impl DiscoveryDocument {
    /// Builds the discovery document for a realm issuer.
    pub fn for_issuer(issuer: &str) -> Self {
        let oidc = format!("{}/protocol/openid-connect", issuer);
        Self {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{}/auth", oidc),
            token_endpoint: format!("{}/token", oidc),
            userinfo_endpoint: format!("{}/userinfo", oidc),
            jwks_uri: format!("{}/certs", oidc),
            introspection_endpoint: format!("{}/token/introspect", oidc),
            revocation_endpoint: format!("{}/revoke", oidc),
            end_session_endpoint: format!("{}/logout", oidc),
            device_authorization_endpoint: format!("{}/auth/device", oidc),
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
                "client_credentials".to_string(),
                "password".to_string(),
                "urn:ietf:params:oauth:grant-type:device_code".to_string(),
            ],
            subject_types_supported: vec!["public".to_string()],
            id_token_signing_alg_values_supported: vec!["RS256".to_string()],
            scopes_supported: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
                "roles".to_string(),
                "offline_access".to_string(),
            ],
            token_endpoint_auth_methods_supported: vec![
                "client_secret_post".to_string(),
                "client_secret_basic".to_string(),
            ],
            code_challenge_methods_supported: vec!["S256".to_string()],
            backchannel_logout_supported: true,
            backchannel_logout_session_supported: true,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_wire_names() {
        assert_eq!(OAuthErrorKind::InvalidGrant.as_str(), "invalid_grant");
        assert_eq!(
            OAuthErrorKind::AuthorizationPending.as_str(),
            "authorization_pending"
        );
        assert_eq!(OAuthErrorKind::SlowDown.as_str(), "slow_down");
        assert_eq!(
            OAuthErrorKind::TemporarilyUnavailable.as_str(),
            "temporarily_unavailable"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            OAuthError::invalid_client().status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            OAuthError::invalid_grant().status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            OAuthError::new(OAuthErrorKind::TemporarilyUnavailable).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            OAuthError::new(OAuthErrorKind::ServerError).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_errors_map_without_leaking() {
        let oauth: OAuthError = ApiError::Database(sqlx::Error::PoolTimedOut).into();
        assert_eq!(oauth.kind, OAuthErrorKind::TemporarilyUnavailable);
        assert!(oauth.description.is_none());

        let oauth: OAuthError = ApiError::Internal {
            message: "secret detail".to_string(),
        }
        .into();
        assert_eq!(oauth.kind, OAuthErrorKind::ServerError);
        assert!(oauth.description.is_none());

        let oauth: OAuthError = ApiError::InvalidCredentials.into();
        assert_eq!(oauth.kind, OAuthErrorKind::InvalidGrant);
    }

    #[test]
    fn test_inactive_introspection_serializes_minimal() {
        let json = serde_json::to_value(IntrospectionResponse::inactive()).unwrap();
        assert_eq!(json, serde_json::json!({ "active": false }));
    }

    #[test]
    fn test_discovery_document_endpoints() {
        let doc = DiscoveryDocument::for_issuer("https://id.example.com/realms/acme");
        assert_eq!(doc.issuer, "https://id.example.com/realms/acme");
        assert_eq!(
            doc.authorization_endpoint,
            "https://id.example.com/realms/acme/protocol/openid-connect/auth"
        );
        assert_eq!(
            doc.jwks_uri,
            "https://id.example.com/realms/acme/protocol/openid-connect/certs"
        );
        assert_eq!(doc.response_types_supported, vec!["code"]);
        assert_eq!(doc.code_challenge_methods_supported, vec!["S256"]);
        assert!(doc.backchannel_logout_supported);
        assert!(doc
            .grant_types_supported
            .contains(&"urn:ietf:params:oauth:grant-type:device_code".to_string()));
        assert!(doc.scopes_supported.contains(&"offline_access".to_string()));
    }
}
