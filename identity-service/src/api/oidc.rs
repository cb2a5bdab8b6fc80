//! # Protocol Handlers
//!
//! The OAuth/OIDC endpoints under
//! `/realms/{realm}/protocol/openid-connect/*` plus discovery. Handlers
//! here speak the RFC wire shapes; internal errors are mapped through
//! [`OAuthError`](crate::protocol::OAuthError) and never leak.

use actix_web::{web, HttpRequest, HttpResponse};
use shared::errors::ApiError;
use tracing::debug;

use crate::api::cookies::{self, SESSION_COOKIE};
use crate::api::pages;
use crate::domain::OAuthParams;
use crate::protocol::{DiscoveryDocument, OAuthError};
use crate::service::authorize_service::{redirect_with_code, redirect_with_error, AuthorizeError};
use crate::service::oauth_service::{TokenActionRequest, TokenRequest};
use crate::AppState;

/// Form body accepted by the device authorization endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct DeviceAuthForm {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
}

fn authorization_header(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
}

fn peer_ip(req: &HttpRequest) -> Option<String> {
    req.connection_info().peer_addr().map(String::from)
}

// =============================================================================
// DISCOVERY AND KEYS
// =============================================================================

/// `GET /realms/{realm}/.well-known/openid-configuration`
pub async fn discovery(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;
    let issuer = realm.issuer(&state.base_url);
    Ok(HttpResponse::Ok().json(DiscoveryDocument::for_issuer(&issuer)))
}

/// `GET /realms/{realm}/protocol/openid-connect/certs`
pub async fn certs(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;
    let jwks = state.token_factory.jwks(&realm).await?;
    Ok(HttpResponse::Ok().json(jwks))
}

// =============================================================================
// AUTHORIZATION ENDPOINT
// =============================================================================

/// `GET /realms/{realm}/protocol/openid-connect/auth`
///
/// With a valid SSO session this continues straight to consent or code
/// issuance; otherwise it bounces to the login page with every OAuth
/// parameter preserved. The login flow redirects back here after each
/// completed step, making this the single continuation point of the state
/// machine.
pub async fn authorize(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<OAuthParams>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;
    let params = query.into_inner();

    let validated = match state.authorize.validate_request(&realm, &params).await {
        Ok(validated) => validated,
        Err(AuthorizeError::Fatal(error)) => {
            // Never redirect to an unvalidated URI
            debug!(error = %error, "authorization request rejected");
            return Ok(HttpResponse::BadRequest()
                .content_type("text/html; charset=utf-8")
                .body(pages::message_page(
                    "Invalid request",
                    "The application made an invalid authorization request.",
                )));
        }
        Err(AuthorizeError::Redirect {
            redirect_uri,
            error,
            description,
            state: oauth_state,
        }) => {
            let location = redirect_with_error(
                &redirect_uri,
                error,
                description.as_deref(),
                oauth_state.as_deref(),
            );
            return Ok(HttpResponse::Found()
                .insert_header(("Location", location))
                .finish());
        }
    };

    // Valid SSO session?
    let session = match req.cookie(SESSION_COOKIE) {
        Some(cookie) => state.login_sessions.validate(&realm, cookie.value()).await?,
        None => None,
    };

    let Some((session, user)) = session else {
        let location = format!("/realms/{}/login?{}", realm.name, params.to_query());
        return Ok(HttpResponse::Found()
            .insert_header(("Location", location))
            .finish());
    };

    // Consent gate
    if validated.client.require_consent
        && !state
            .consent
            .has_consent(user.id, validated.client.id, &validated.scopes)
            .await?
    {
        let request = state
            .consent
            .create_request(&realm, user.id, validated.client.id, &validated.scopes, &params)
            .await?;
        let location = format!("/realms/{}/consent?request={}", realm.name, request.id);
        return Ok(HttpResponse::Found()
            .insert_header(("Location", location))
            .finish());
    }

    // Issue the code
    let code = state
        .authorize
        .issue_code(
            &realm,
            &validated,
            user.id,
            Some(session.id),
            session.auth_time,
            &params,
        )
        .await?;

    let location = redirect_with_code(&params.redirect_uri, &code, params.state.as_deref());
    Ok(HttpResponse::Found()
        .insert_header(("Location", location))
        .finish())
}

// =============================================================================
// TOKEN ENDPOINT
// =============================================================================

/// `POST /realms/{realm}/protocol/openid-connect/token`
pub async fn token(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Form<TokenRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, OAuthError> {
    let realm = state
        .realm(&path)
        .await
        .map_err(OAuthError::from)?;

    let response = state
        .oauth
        .token(
            &realm,
            authorization_header(&req),
            form.into_inner(),
            peer_ip(&req).as_deref(),
        )
        .await?;

    Ok(HttpResponse::Ok()
        .insert_header(("Cache-Control", "no-store"))
        .insert_header(("Pragma", "no-cache"))
        .json(response))
}

/// `POST /realms/{realm}/protocol/openid-connect/token/introspect`
pub async fn introspect(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Form<TokenActionRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, OAuthError> {
    let realm = state.realm(&path).await.map_err(OAuthError::from)?;

    let response = state
        .oauth
        .introspect(&realm, authorization_header(&req), form.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

/// `POST /realms/{realm}/protocol/openid-connect/revoke`
pub async fn revoke(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Form<TokenActionRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, OAuthError> {
    let realm = state.realm(&path).await.map_err(OAuthError::from)?;

    state
        .oauth
        .revoke(&realm, authorization_header(&req), form.into_inner())
        .await?;

    Ok(HttpResponse::Ok().finish())
}

// =============================================================================
// USERINFO
// =============================================================================

/// `GET /realms/{realm}/protocol/openid-connect/userinfo`
pub async fn userinfo(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;

    let bearer = authorization_header(&req)
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(ApiError::MissingAuth)?;

    let claims = state.oauth.userinfo(&realm, bearer).await?;
    Ok(HttpResponse::Ok().json(claims))
}

// =============================================================================
// END SESSION
// =============================================================================

/// `GET`/`POST /realms/{realm}/protocol/openid-connect/logout`
///
/// Destroys the SSO session, revokes its non-offline refresh tokens, and
/// queues backchannel logout notifications. Safe to call without a
/// session; the cookie is cleared either way.
pub async fn logout(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;

    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        if let Some((session, _user)) = state.login_sessions.validate(&realm, cookie.value()).await?
        {
            state.lifecycle.logout_session(&realm, &session).await?;
        }
    }

    Ok(HttpResponse::Ok()
        .cookie(cookies::clear_cookie(&realm.name, SESSION_COOKIE))
        .content_type("text/html; charset=utf-8")
        .body(pages::message_page("Signed out", "You have been signed out.")))
}

// =============================================================================
// DEVICE AUTHORIZATION
// =============================================================================

/// `POST /realms/{realm}/protocol/openid-connect/auth/device`
pub async fn device_authorize(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Form<DeviceAuthForm>,
    req: HttpRequest,
) -> Result<HttpResponse, OAuthError> {
    let realm = state.realm(&path).await.map_err(OAuthError::from)?;
    let form = form.into_inner();

    let response = state
        .devices
        .start(
            &realm,
            authorization_header(&req),
            form.client_id.as_deref(),
            form.client_secret.as_deref(),
            form.scope.as_deref(),
        )
        .await?;

    Ok(HttpResponse::Ok()
        .insert_header(("Cache-Control", "no-store"))
        .json(response))
}
