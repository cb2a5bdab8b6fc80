//! # Browser Flow Handlers
//!
//! The interactive login state machine:
//!
//! ```text
//! GET /auth ──► GET /login ──► POST /login ──┬── (TOTP) ──► /login/otp ──┐
//!                                            │                          │
//!                                            └── session cookie ◄───────┘
//!                                                      │
//!                                  GET /auth (again) ──┼── consent? ──► /consent
//!                                                      │                  │
//!                                                      └──── code ◄───────┘
//! ```
//!
//! Every redirect back into `/auth` carries the original OAuth query
//! string, so the flow resumes exactly where it started after each step
//! and after every recoverable error.

use actix_web::{web, HttpRequest, HttpResponse};
use shared::errors::ApiError;
use shared::validation::validate_request;
use tracing::warn;


use crate::api::cookies::{self, MFA_COOKIE, SESSION_COOKIE};
use crate::api::dto::{
    ConsentForm, ConsentQuery, DeviceVerifyForm, ForgotPasswordRequest, LoginForm, MessageResponse,
    OtpForm, RegisterRequest, RegisterResponse, ResetPasswordForm, TokenQuery, UserCodeQuery,
};
use crate::api::pages;
use crate::domain::{OAuthParams, Realm, User};
use crate::service::account_service::Registration;
use crate::service::authorize_service::redirect_with_error;
use crate::AppState;

fn peer_ip(req: &HttpRequest) -> Option<String> {
    req.connection_info().peer_addr().map(String::from)
}

fn user_agent(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("User-Agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

fn found(location: String) -> HttpResponse {
    HttpResponse::Found()
        .insert_header(("Location", location))
        .finish()
}

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

fn realm_display(realm: &Realm) -> &str {
    if realm.display_name.is_empty() {
        &realm.name
    } else {
        &realm.display_name
    }
}

/// Where the browser goes after a full authentication: back into the
/// authorization endpoint for OAuth logins, or a plain confirmation for
/// bare sign-ins.
fn continue_url(realm: &Realm, params: &OAuthParams) -> Option<String> {
    params.is_present().then(|| {
        format!(
            "/realms/{}/protocol/openid-connect/auth?{}",
            realm.name,
            params.to_query()
        )
    })
}

fn login_url(realm: &Realm, params: &OAuthParams) -> String {
    let query = params.to_query();
    if query.is_empty() {
        format!("/realms/{}/login", realm.name)
    } else {
        format!("/realms/{}/login?{}", realm.name, query)
    }
}

// =============================================================================
// CREDENTIALS
// =============================================================================

/// `GET /realms/{realm}/login`
pub async fn login_page(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<OAuthParams>,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;
    let params = query.into_inner();

    Ok(html(pages::login_page(
        realm_display(&realm),
        &login_url(&realm, &params),
        None,
    )))
}

/// `POST /realms/{realm}/login`
///
/// Credentials, then password expiry, then the MFA fork. Failures
/// re-display the form with the OAuth parameters still in the action URL.
pub async fn login_submit(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<OAuthParams>,
    form: web::Form<LoginForm>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;
    let params = query.into_inner();
    let form = form.into_inner();
    let ip = peer_ip(&req);

    let user = match state
        .credentials
        .verify(&realm, &form.username, &form.password, ip.as_deref())
        .await
    {
        Ok(user) => user,
        Err(error) => {
            let message = login_error_message(&error);
            return Ok(HttpResponse::Unauthorized()
                .content_type("text/html; charset=utf-8")
                .body(pages::login_page(
                    realm_display(&realm),
                    &login_url(&realm, &params),
                    Some(message),
                )));
        }
    };

    // Expired password: force a change before any session exists
    if state.policy.is_expired(&realm, &user, state.clock.now()) || user.update_password_required {
        let token = state.accounts.start_forced_change(&realm, &user).await?;
        return Ok(found(format!(
            "/realms/{}/reset-password?token={}",
            realm.name, token
        )));
    }

    // MFA fork: enrolled users verify, unenrolled users in an MFA-required
    // realm enrol inside the flow
    let has_totp = state.mfa.has_enabled_totp(user.id).await?;
    if has_totp || realm.mfa_required {
        if !has_totp {
            // In-login enrolment: the OTP page shows the fresh secret
            state.mfa.begin_enrolment(&realm, &user).await?;
        }

        let issued = state
            .mfa
            .create_challenge(&realm, &user, &params, form.remember_me())
            .await?;

        let otp_location = format!(
            "/realms/{}/login/otp{}",
            realm.name,
            match params.to_query().as_str() {
                "" => String::new(),
                query => format!("?{}", query),
            }
        );

        return Ok(HttpResponse::Found()
            .insert_header(("Location", otp_location))
            .cookie(cookies::mfa_cookie(
                &realm.name,
                issued.raw_token,
                state.secure_cookies,
            ))
            .finish());
    }

    // Fully authenticated: session cookie, then back into /auth
    establish_session(&state, &realm, &user, ip, user_agent(&req), form.remember_me(), &params)
        .await
}

fn login_error_message(error: &ApiError) -> &'static str {
    match error {
        ApiError::AccountLocked { .. } => {
            "Account temporarily locked. Try again later."
        }
        ApiError::AccountDisabled => "This account is disabled.",
        _ => "Invalid username or password.",
    }
}

/// Creates the SSO session, sets the cookie, and continues the flow.
async fn establish_session(
    state: &web::Data<AppState>,
    realm: &Realm,
    user: &User,
    ip: Option<String>,
    user_agent: Option<String>,
    remember_me: bool,
    params: &OAuthParams,
) -> Result<HttpResponse, ApiError> {
    let (raw_token, _session) = state
        .login_sessions
        .create(realm, user, ip, user_agent, remember_me)
        .await?;

    state.events.record(
        crate::domain::NewEvent::login(realm.id, crate::domain::event::event_types::LOGIN)
            .with_user(user.id),
    );

    let cookie = cookies::session_cookie(&realm.name, raw_token, remember_me, state.secure_cookies);

    match continue_url(realm, params) {
        Some(location) => Ok(HttpResponse::Found()
            .insert_header(("Location", location))
            .cookie(cookie)
            .finish()),
        None => Ok(HttpResponse::Ok()
            .cookie(cookie)
            .content_type("text/html; charset=utf-8")
            .body(pages::message_page("Signed in", "You are signed in."))),
    }
}

// =============================================================================
// TOTP CHALLENGE
// =============================================================================

/// `GET /realms/{realm}/login/otp`
pub async fn otp_page(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<OAuthParams>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;
    let params = query.into_inner();

    let Some(cookie) = req.cookie(MFA_COOKIE) else {
        return Ok(found(login_url(&realm, &params)));
    };

    let Some(challenge) = state.mfa.peek_challenge(&realm, cookie.value()).await? else {
        // Expired or exhausted: restart the login
        return Ok(HttpResponse::Found()
            .insert_header(("Location", login_url(&realm, &params)))
            .cookie(cookies::clear_cookie(&realm.name, MFA_COOKIE))
            .finish());
    };

    // In-login enrolment shows the pending secret's otpauth URI
    let setup_uri = match state.mfa.has_enabled_totp(challenge.user_id).await? {
        true => None,
        false => {
            let user = state
                .users
                .find_by_id(realm.id, challenge.user_id)
                .await?
                .ok_or(ApiError::InvalidToken)?;
            Some(state.mfa.begin_enrolment(&realm, &user).await?)
        }
    };

    let action = format!(
        "/realms/{}/login/otp{}",
        realm.name,
        match params.to_query().as_str() {
            "" => String::new(),
            query => format!("?{}", query),
        }
    );

    Ok(html(pages::otp_page(
        realm_display(&realm),
        &action,
        setup_uri.as_deref(),
        None,
    )))
}

/// `POST /realms/{realm}/login/otp`
///
/// Spends one attempt, verifies TOTP (falling back to a recovery code),
/// and only clears the challenge cookie after a successful verification.
/// A dead challenge sends the browser back to the login form.
pub async fn otp_submit(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<OAuthParams>,
    form: web::Form<OtpForm>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;
    let params = query.into_inner();
    let form = form.into_inner();

    let Some(cookie) = req.cookie(MFA_COOKIE) else {
        return Ok(found(login_url(&realm, &params)));
    };

    let Some(challenge) = state.mfa.register_attempt(&realm, cookie.value()).await? else {
        warn!(realm = %realm.name, "MFA challenge expired or out of attempts");
        return Ok(HttpResponse::SeeOther()
            .insert_header(("Location", login_url(&realm, &params)))
            .cookie(cookies::clear_cookie(&realm.name, MFA_COOKIE))
            .finish());
    };

    let user = state
        .users
        .find_by_id(realm.id, challenge.user_id)
        .await?
        .filter(|u| u.enabled)
        .ok_or(ApiError::InvalidToken)?;

    // Enrolment-in-login: a pending credential is confirmed by this code
    if !state.mfa.has_enabled_totp(user.id).await? {
        match state.mfa.confirm_enrolment(&realm, &user, &form.code).await {
            Ok(recovery_codes) => {
                state.mfa.complete_challenge(&challenge).await?;
                state.events.record(
                    crate::domain::NewEvent::login(
                        realm.id,
                        crate::domain::event::event_types::MFA_ENROLLED,
                    )
                    .with_user(user.id),
                );

                let (raw_token, _session) = state
                    .login_sessions
                    .create(&realm, &user, peer_ip(&req), user_agent(&req), challenge.remember_me)
                    .await?;

                let continue_to = continue_url(&realm, &params)
                    .unwrap_or_else(|| format!("/realms/{}/login", realm.name));

                return Ok(HttpResponse::Ok()
                    .cookie(cookies::session_cookie(
                        &realm.name,
                        raw_token,
                        challenge.remember_me,
                        state.secure_cookies,
                    ))
                    .cookie(cookies::clear_cookie(&realm.name, MFA_COOKIE))
                    .content_type("text/html; charset=utf-8")
                    .body(pages::recovery_codes_page(
                        realm_display(&realm),
                        &recovery_codes,
                        &continue_to,
                    )));
            }
            Err(ApiError::BadRequest { .. }) | Err(ApiError::NotFound { .. }) => {
                return otp_retry(&realm, &params, "That code was not correct.");
            }
            Err(other) => return Err(other),
        }
    }

    // Normal verification: TOTP first, recovery code as fallback
    let verified = state.mfa.verify_totp(&realm, &user, &form.code).await?
        || state.mfa.verify_recovery_code(&user, &form.code).await?;

    if !verified {
        state.events.record(
            crate::domain::NewEvent::login(
                realm.id,
                crate::domain::event::event_types::MFA_FAILURE,
            )
            .with_user(user.id),
        );
        return otp_retry(&realm, &params, "That code was not correct.");
    }

    // Success: challenge dies, cookie cleared, session established
    state.mfa.complete_challenge(&challenge).await?;

    let (raw_token, _session) = state
        .login_sessions
        .create(&realm, &user, peer_ip(&req), user_agent(&req), challenge.remember_me)
        .await?;

    state.events.record(
        crate::domain::NewEvent::login(realm.id, crate::domain::event::event_types::LOGIN)
            .with_user(user.id),
    );

    let location = continue_url(&realm, &params)
        .unwrap_or_else(|| format!("/realms/{}/login", realm.name));

    Ok(HttpResponse::Found()
        .insert_header(("Location", location))
        .cookie(cookies::session_cookie(
            &realm.name,
            raw_token,
            challenge.remember_me,
            state.secure_cookies,
        ))
        .cookie(cookies::clear_cookie(&realm.name, MFA_COOKIE))
        .finish())
}

fn otp_retry(
    realm: &Realm,
    params: &OAuthParams,
    message: &str,
) -> Result<HttpResponse, ApiError> {
    let action = format!(
        "/realms/{}/login/otp{}",
        realm.name,
        match params.to_query().as_str() {
            "" => String::new(),
            query => format!("?{}", query),
        }
    );

    Ok(HttpResponse::Unauthorized()
        .content_type("text/html; charset=utf-8")
        .body(pages::otp_page(
            realm_display(realm),
            &action,
            None,
            Some(message),
        )))
}

// =============================================================================
// CONSENT
// =============================================================================

/// `GET /realms/{realm}/consent?request={id}`
///
/// Reading a consent request rotates its id; the rendered form carries
/// the replacement, so the URL that was just consumed can never be
/// re-submitted.
pub async fn consent_page(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ConsentQuery>,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;

    let Some((request, replacement)) = state.consent.read_and_rotate(&realm, query.request).await?
    else {
        return Ok(found(format!("/realms/{}/login", realm.name)));
    };

    let client_name = state
        .oauth_client_display(&request)
        .await
        .unwrap_or_else(|| "An application".to_string());

    Ok(html(pages::consent_page(
        realm_display(&realm),
        &client_name,
        &request.scopes,
        &replacement.id.to_string(),
        &format!("/realms/{}/consent", realm.name),
    )))
}

/// `POST /realms/{realm}/consent`
pub async fn consent_submit(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Form<ConsentForm>,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;
    let form = form.into_inner();

    let Some(request) = state.consent.consume_request(&realm, form.request).await? else {
        return Ok(found(format!("/realms/{}/login", realm.name)));
    };

    let params: OAuthParams =
        serde_json::from_value(request.oauth_params.clone()).unwrap_or_default();

    if form.decision != "approve" {
        // Denial goes back to the client with access_denied
        let location = redirect_with_error(
            &params.redirect_uri,
            "access_denied",
            Some("the user denied the request"),
            params.state.as_deref(),
        );
        return Ok(found(location));
    }

    state
        .consent
        .grant_consent(request.user_id, request.client_pk, &request.scopes)
        .await?;

    // Back through /auth: consent now on file, the code gets issued there
    let location = continue_url(&realm, &params)
        .unwrap_or_else(|| format!("/realms/{}/login", realm.name));
    Ok(found(location))
}

// =============================================================================
// DEVICE VERIFICATION
// =============================================================================

/// `GET /realms/{realm}/device`
pub async fn device_page(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<UserCodeQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;

    let signed_in = match req.cookie(SESSION_COOKIE) {
        Some(cookie) => state
            .login_sessions
            .validate(&realm, cookie.value())
            .await?
            .is_some(),
        None => false,
    };

    if !signed_in {
        return Ok(html(pages::message_page(
            "Sign in required",
            &format!(
                "Sign in at /realms/{}/login first, then return to this page to activate your device.",
                realm.name
            ),
        )));
    }

    Ok(html(pages::device_page(
        realm_display(&realm),
        &format!("/realms/{}/device/verify", realm.name),
        query.user_code.as_deref(),
        None,
    )))
}

/// `POST /realms/{realm}/device/verify`
pub async fn device_verify(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Form<DeviceVerifyForm>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;
    let form = form.into_inner();

    let session = match req.cookie(SESSION_COOKIE) {
        Some(cookie) => state.login_sessions.validate(&realm, cookie.value()).await?,
        None => None,
    };
    let Some((_session, user)) = session else {
        return Err(ApiError::MissingAuth);
    };

    let approved = form.decision == "approve";
    let resolved = state
        .devices
        .resolve(&realm, &user, &form.user_code, approved)
        .await?;

    if !resolved {
        return Ok(html(pages::device_page(
            realm_display(&realm),
            &format!("/realms/{}/device/verify", realm.name),
            None,
            Some("That code was not recognized. Check the code on your device and try again."),
        )));
    }

    let message = if approved {
        "Device approved. You can return to your device."
    } else {
        "Device denied."
    };
    Ok(html(pages::message_page("Device activation", message)))
}

// =============================================================================
// REGISTRATION AND ACCOUNT RECOVERY
// =============================================================================

/// `POST /realms/{realm}/register` (JSON)
pub async fn register(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<RegisterRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;
    let body = body.into_inner();
    validate_request(&body)?;

    let user = state
        .accounts
        .register(
            &realm,
            Registration {
                username: body.username,
                email: body.email,
                password: body.password,
                first_name: body.first_name,
                last_name: body.last_name,
            },
            peer_ip(&req).as_deref(),
        )
        .await?;

    Ok(HttpResponse::Created().json(RegisterResponse {
        email_verification_required: realm.require_email_verification,
        user: user.into(),
    }))
}

/// `GET /realms/{realm}/verify-email?token=...`
pub async fn verify_email(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<TokenQuery>,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;

    match state.accounts.verify_email(&realm, &query.token).await {
        Ok(()) => Ok(html(pages::message_page(
            "Email verified",
            "Your email address has been verified. You can close this page.",
        ))),
        Err(ApiError::InvalidToken) => Ok(HttpResponse::BadRequest()
            .content_type("text/html; charset=utf-8")
            .body(pages::message_page(
                "Verification failed",
                "This verification link is invalid or has already been used.",
            ))),
        Err(other) => Err(other),
    }
}

/// `POST /realms/{realm}/forgot-password` (JSON)
///
/// Always answers the same way; whether the address exists is not
/// disclosed.
pub async fn forgot_password(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ForgotPasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;
    let body = body.into_inner();
    validate_request(&body)?;

    state.accounts.forgot_password(&realm, &body.email).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "If that email address is registered, a reset link has been sent.".to_string(),
    }))
}

/// `GET /realms/{realm}/reset-password?token=...`
pub async fn reset_password_page(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<TokenQuery>,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;

    Ok(html(pages::reset_password_page(
        realm_display(&realm),
        &format!("/realms/{}/reset-password", realm.name),
        &query.token,
        None,
    )))
}

/// `POST /realms/{realm}/reset-password` (form)
pub async fn reset_password_submit(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Form<ResetPasswordForm>,
) -> Result<HttpResponse, ApiError> {
    let realm = state.realm(&path).await?;
    let form = form.into_inner();

    match state
        .accounts
        .reset_password(&realm, &form.token, &form.new_password)
        .await
    {
        Ok(()) => Ok(html(pages::message_page(
            "Password changed",
            "Your password has been changed. Sign in with your new password.",
        ))),
        Err(ApiError::PolicyViolation { errors }) => Ok(HttpResponse::BadRequest()
            .content_type("text/html; charset=utf-8")
            .body(pages::reset_password_page(
                realm_display(&realm),
                &format!("/realms/{}/reset-password", realm.name),
                &form.token,
                Some(&errors.join(" ")),
            ))),
        Err(ApiError::InvalidToken) => Ok(HttpResponse::BadRequest()
            .content_type("text/html; charset=utf-8")
            .body(pages::message_page(
                "Reset failed",
                "This reset link is invalid or has already been used.",
            ))),
        Err(other) => Err(other),
    }
}

// =============================================================================
// Helpers on AppState
// =============================================================================

impl AppState {
    /// Display name of the client behind a consent request.
    async fn oauth_client_display(
        &self,
        request: &crate::domain::ConsentRequest,
    ) -> Option<String> {
        self.clients
            .find_by_pk(request.client_pk)
            .await
            .ok()
            .flatten()
            .map(|c| c.client_id)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_error_messages_are_user_safe() {
        assert_eq!(
            login_error_message(&ApiError::InvalidCredentials),
            "Invalid username or password."
        );
        // Lockout wording does not reveal the remaining duration
        assert_eq!(
            login_error_message(&ApiError::AccountLocked { until: None }),
            "Account temporarily locked. Try again later."
        );
        // Unexpected internals fall back to the generic message
        assert_eq!(
            login_error_message(&ApiError::Internal {
                message: "secret".to_string()
            }),
            "Invalid username or password."
        );
    }
}
