//! # Cookie Construction
//!
//! The two cookies the provider sets, both HttpOnly and SameSite=Lax,
//! scoped to the realm path, `Secure` outside development:
//!
//! | Cookie | Holds | Max-Age |
//! |--------|-------|---------|
//! | `AUTHME_SESSION` | raw SSO session token | session, or 30 days with remember-me |
//! | `AUTHME_MFA_CHALLENGE` | raw MFA challenge token | 5 minutes |

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};

/// Browser SSO session cookie name.
pub const SESSION_COOKIE: &str = "AUTHME_SESSION";

/// MFA challenge cookie name.
pub const MFA_COOKIE: &str = "AUTHME_MFA_CHALLENGE";

fn realm_path(realm_name: &str) -> String {
    format!("/realms/{}", realm_name)
}

/// Builds the session cookie.
pub fn session_cookie(
    realm_name: &str,
    raw_token: String,
    remember_me: bool,
    secure: bool,
) -> Cookie<'static> {
    let mut builder = Cookie::build(SESSION_COOKIE, raw_token)
        .path(realm_path(realm_name))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure);

    if remember_me {
        builder = builder.max_age(CookieDuration::days(30));
    }

    builder.finish()
}

/// Builds the MFA challenge cookie.
pub fn mfa_cookie(realm_name: &str, raw_token: String, secure: bool) -> Cookie<'static> {
    Cookie::build(MFA_COOKIE, raw_token)
        .path(realm_path(realm_name))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(CookieDuration::minutes(5))
        .finish()
}

/// An expired cookie that clears `name` on the realm path.
pub fn clear_cookie(realm_name: &str, name: &'static str) -> Cookie<'static> {
    Cookie::build(name, "")
        .path(realm_path(realm_name))
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::ZERO)
        .finish()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("acme", "raw-token".to_string(), false, true);
        assert_eq!(cookie.name(), "AUTHME_SESSION");
        assert_eq!(cookie.value(), "raw-token");
        assert_eq!(cookie.path(), Some("/realms/acme"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.secure(), Some(true));
        // Session cookie: no Max-Age unless remember-me
        assert_eq!(cookie.max_age(), None);
    }

    #[test]
    fn test_remember_me_extends_to_30_days() {
        let cookie = session_cookie("acme", "raw".to_string(), true, false);
        assert_eq!(cookie.max_age(), Some(CookieDuration::days(30)));
    }

    #[test]
    fn test_mfa_cookie_lives_five_minutes() {
        let cookie = mfa_cookie("acme", "raw".to_string(), false);
        assert_eq!(cookie.name(), "AUTHME_MFA_CHALLENGE");
        assert_eq!(cookie.max_age(), Some(CookieDuration::minutes(5)));
        assert_eq!(cookie.path(), Some("/realms/acme"));
    }

    #[test]
    fn test_clear_cookie_expires_immediately() {
        let cookie = clear_cookie("acme", SESSION_COOKIE);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(CookieDuration::ZERO));
    }
}
