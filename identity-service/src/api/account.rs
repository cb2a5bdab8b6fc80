//! # Account Handlers
//!
//! Bearer-authenticated endpoints for self-service MFA enrolment. The
//! bearer token is an access token issued by this provider for the same
//! realm; cross-realm tokens fail signature validation.

use actix_web::{web, HttpRequest, HttpResponse};
use shared::errors::ApiError;
use shared::validation::validate_request;
use uuid::Uuid;

use crate::api::dto::{RecoveryCodesResponse, TotpConfirmRequest, TotpSetupResponse};
use crate::domain::{Realm, User};
use crate::AppState;

/// Resolves the bearer access token to the realm user it belongs to.
async fn bearer_user(
    state: &web::Data<AppState>,
    realm: &Realm,
    req: &HttpRequest,
) -> Result<User, ApiError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(ApiError::MissingAuth)?;

    let claims = state
        .token_factory
        .verify_access_token(realm, token)
        .await?;

    let user_id = claims
        .get("sub")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or(ApiError::InvalidToken)?;

    state
        .users
        .find_by_id(realm.id, user_id)
        .await?
        .filter(|u| u.enabled)
        .ok_or(ApiError::InvalidToken)
}

/// `POST /realms/{realm}/account/totp`
///
/// Starts TOTP enrolment and returns the `otpauth://` URI for the
/// authenticator app.
pub async fn totp_setup(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;
    let user = bearer_user(&state, &realm, &req).await?;

    let otpauth_url = state.mfa.begin_enrolment(&realm, &user).await?;

    Ok(HttpResponse::Ok().json(TotpSetupResponse { otpauth_url }))
}

/// `PUT /realms/{realm}/account/totp`
///
/// Confirms enrolment with a code from the app. The response carries the
/// recovery codes exactly once.
pub async fn totp_confirm(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<TotpConfirmRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;
    let user = bearer_user(&state, &realm, &req).await?;
    let body = body.into_inner();
    validate_request(&body)?;

    let recovery_codes = state
        .mfa
        .confirm_enrolment(&realm, &user, &body.code)
        .await?;

    state.events.record(
        crate::domain::NewEvent::login(
            realm.id,
            crate::domain::event::event_types::MFA_ENROLLED,
        )
        .with_user(user.id),
    );

    Ok(HttpResponse::Ok().json(RecoveryCodesResponse { recovery_codes }))
}
