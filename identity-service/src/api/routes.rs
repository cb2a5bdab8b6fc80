//! # Route Configuration
//!
//! ```text
//! /
//! ├── health                                           GET  → health_check
//! │
//! └── realms/{realm}/
//!     ├── .well-known/openid-configuration             GET  → discovery
//!     │
//!     ├── protocol/openid-connect/
//!     │   ├── certs                                    GET  → JWKS
//!     │   ├── auth                                     GET  → authorization endpoint
//!     │   ├── auth/device                              POST → device authorization
//!     │   ├── token                                    POST → token endpoint (5 grants)
//!     │   ├── token/introspect                         POST → introspection
//!     │   ├── revoke                                   POST → revocation
//!     │   ├── userinfo                                 GET  → userinfo
//!     │   └── logout                                   GET/POST → end session
//!     │
//!     ├── login                                        GET/POST → credentials form
//!     ├── login/otp                                    GET/POST → TOTP challenge
//!     ├── consent                                      GET/POST → consent form
//!     ├── device                                       GET  → user-code entry
//!     ├── device/verify                                POST → approve/deny device
//!     ├── register                                     POST → self-registration (JSON)
//!     ├── verify-email                                 GET  → email verification landing
//!     ├── forgot-password                              POST → reset initiation (JSON)
//!     ├── reset-password                               GET/POST → reset form
//!     └── account/totp                                 POST/PUT → MFA enrolment (bearer)
//! ```

use actix_web::{web, HttpResponse};
use chrono::Utc;

use super::dto::HealthResponse;
use super::{account, login, oidc};

/// `GET /health` for load balancers and monitoring.
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        service: "identity-service".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Configures all routes. Called from `main.rs` during app
/// initialization.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check)).service(
        web::scope("/realms/{realm}")
            // ─────────────────────────────────────────────────────────
            // Discovery
            // ─────────────────────────────────────────────────────────
            .route(
                "/.well-known/openid-configuration",
                web::get().to(oidc::discovery),
            )
            // ─────────────────────────────────────────────────────────
            // OAuth / OIDC protocol endpoints
            // ─────────────────────────────────────────────────────────
            .service(
                web::scope("/protocol/openid-connect")
                    .route("/certs", web::get().to(oidc::certs))
                    .route("/auth", web::get().to(oidc::authorize))
                    .route("/auth/device", web::post().to(oidc::device_authorize))
                    .route("/token", web::post().to(oidc::token))
                    .route("/token/introspect", web::post().to(oidc::introspect))
                    .route("/revoke", web::post().to(oidc::revoke))
                    .route("/userinfo", web::get().to(oidc::userinfo))
                    .route("/logout", web::get().to(oidc::logout))
                    .route("/logout", web::post().to(oidc::logout)),
            )
            // ─────────────────────────────────────────────────────────
            // Browser login flow
            // ─────────────────────────────────────────────────────────
            .route("/login", web::get().to(login::login_page))
            .route("/login", web::post().to(login::login_submit))
            .route("/login/otp", web::get().to(login::otp_page))
            .route("/login/otp", web::post().to(login::otp_submit))
            .route("/consent", web::get().to(login::consent_page))
            .route("/consent", web::post().to(login::consent_submit))
            .route("/device", web::get().to(login::device_page))
            .route("/device/verify", web::post().to(login::device_verify))
            // ─────────────────────────────────────────────────────────
            // Registration and recovery
            // ─────────────────────────────────────────────────────────
            .route("/register", web::post().to(login::register))
            .route("/verify-email", web::get().to(login::verify_email))
            .route("/forgot-password", web::post().to(login::forgot_password))
            .route("/reset-password", web::get().to(login::reset_password_page))
            .route(
                "/reset-password",
                web::post().to(login::reset_password_submit),
            )
            // ─────────────────────────────────────────────────────────
            // Account self-service (bearer)
            // ─────────────────────────────────────────────────────────
            .route("/account/totp", web::post().to(account::totp_setup))
            .route("/account/totp", web::put().to(account::totp_confirm)),
    );
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn test_health_check_reports_healthy() {
        let response = health_check().await;
        assert_eq!(response.status(), actix_web::http::StatusCode::OK);
    }
}
