//! # Login Flow Pages
//!
//! Minimal server-rendered HTML for the interactive flow: credentials,
//! TOTP, consent, device verification, password reset, and terminal
//! message pages. Theme rendering is an external concern; these pages are
//! the unthemed fallback and carry no assets.
//!
//! Every dynamic value passes through [`escape_html`]. OAuth parameters
//! are preserved by pointing each form's `action` at the current URL,
//! query string included.

/// Escapes text for safe interpolation into HTML.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn shell(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n<title>{}</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        escape_html(title),
        body
    )
}

/// Credentials form. `action_url` carries the preserved OAuth query
/// string; `error` re-displays the form after a failed attempt.
pub fn login_page(realm_display: &str, action_url: &str, error: Option<&str>) -> String {
    let error_html = match error {
        Some(message) => format!("<p role=\"alert\">{}</p>\n", escape_html(message)),
        None => String::new(),
    };

    shell(
        &format!("Sign in to {}", realm_display),
        &format!(
            "<h1>Sign in to {}</h1>\n{}<form method=\"post\" action=\"{}\">\n<label>Username <input type=\"text\" name=\"username\" autofocus autocomplete=\"username\"></label><br>\n<label>Password <input type=\"password\" name=\"password\" autocomplete=\"current-password\"></label><br>\n<label><input type=\"checkbox\" name=\"remember_me\" value=\"on\"> Remember me</label><br>\n<button type=\"submit\">Sign in</button>\n</form>\n",
            escape_html(realm_display),
            error_html,
            escape_html(action_url),
        ),
    )
}

/// TOTP form. Shown for verification and (with `setup_uri`) for in-login
/// enrolment.
pub fn otp_page(
    realm_display: &str,
    action_url: &str,
    setup_uri: Option<&str>,
    error: Option<&str>,
) -> String {
    let error_html = match error {
        Some(message) => format!("<p role=\"alert\">{}</p>\n", escape_html(message)),
        None => String::new(),
    };

    let setup_html = match setup_uri {
        Some(uri) => format!(
            "<p>Scan this URI with your authenticator app, then enter the code it shows:</p>\n<pre>{}</pre>\n",
            escape_html(uri)
        ),
        None => "<p>Enter the code from your authenticator app, or a recovery code.</p>\n"
            .to_string(),
    };

    shell(
        &format!("Two-factor authentication - {}", realm_display),
        &format!(
            "<h1>Two-factor authentication</h1>\n{}{}<form method=\"post\" action=\"{}\">\n<label>Code <input type=\"text\" name=\"code\" autofocus autocomplete=\"one-time-code\"></label><br>\n<button type=\"submit\">Verify</button>\n</form>\n",
            setup_html,
            error_html,
            escape_html(action_url),
        ),
    )
}

/// Consent form listing the requested scopes.
pub fn consent_page(
    realm_display: &str,
    client_name: &str,
    scopes: &[String],
    request_id: &str,
    action_url: &str,
) -> String {
    let scope_items: String = scopes
        .iter()
        .map(|s| format!("<li>{}</li>\n", escape_html(s)))
        .collect();

    shell(
        &format!("Grant access - {}", realm_display),
        &format!(
            "<h1>Grant access</h1>\n<p><strong>{}</strong> wants to access your account with:</p>\n<ul>\n{}</ul>\n<form method=\"post\" action=\"{}\">\n<input type=\"hidden\" name=\"request\" value=\"{}\">\n<button type=\"submit\" name=\"decision\" value=\"approve\">Allow</button>\n<button type=\"submit\" name=\"decision\" value=\"deny\">Deny</button>\n</form>\n",
            escape_html(client_name),
            scope_items,
            escape_html(action_url),
            escape_html(request_id),
        ),
    )
}

/// Device verification: user-code entry plus approve/deny.
pub fn device_page(
    realm_display: &str,
    action_url: &str,
    prefilled_code: Option<&str>,
    message: Option<&str>,
) -> String {
    let message_html = match message {
        Some(m) => format!("<p role=\"alert\">{}</p>\n", escape_html(m)),
        None => String::new(),
    };

    shell(
        &format!("Device activation - {}", realm_display),
        &format!(
            "<h1>Device activation</h1>\n{}<p>Enter the code displayed on your device:</p>\n<form method=\"post\" action=\"{}\">\n<label>Code <input type=\"text\" name=\"user_code\" value=\"{}\" autofocus></label><br>\n<button type=\"submit\" name=\"decision\" value=\"approve\">Approve</button>\n<button type=\"submit\" name=\"decision\" value=\"deny\">Deny</button>\n</form>\n",
            message_html,
            escape_html(action_url),
            escape_html(prefilled_code.unwrap_or("")),
        ),
    )
}

/// Password reset form reached from an emailed link.
pub fn reset_password_page(
    realm_display: &str,
    action_url: &str,
    token: &str,
    error: Option<&str>,
) -> String {
    let error_html = match error {
        Some(message) => format!("<p role=\"alert\">{}</p>\n", escape_html(message)),
        None => String::new(),
    };

    shell(
        &format!("Choose a new password - {}", realm_display),
        &format!(
            "<h1>Choose a new password</h1>\n{}<form method=\"post\" action=\"{}\">\n<input type=\"hidden\" name=\"token\" value=\"{}\">\n<label>New password <input type=\"password\" name=\"new_password\" autofocus autocomplete=\"new-password\"></label><br>\n<button type=\"submit\">Set password</button>\n</form>\n",
            error_html,
            escape_html(action_url),
            escape_html(token),
        ),
    )
}

/// Recovery codes shown once after TOTP enrolment inside the login flow,
/// with a link to continue the interrupted authorization.
pub fn recovery_codes_page(realm_display: &str, codes: &[String], continue_url: &str) -> String {
    let code_items: String = codes
        .iter()
        .map(|c| format!("<li><code>{}</code></li>\n", escape_html(c)))
        .collect();

    shell(
        &format!("Recovery codes - {}", realm_display),
        &format!(
            "<h1>Save your recovery codes</h1>\n<p>Each code works once if you lose your authenticator. They will not be shown again.</p>\n<ul>\n{}</ul>\n<p><a href=\"{}\">Continue</a></p>\n",
            code_items,
            escape_html(continue_url),
        ),
    )
}

/// Terminal message page (logout confirmation, email verified, errors).
pub fn message_page(title: &str, message: &str) -> String {
    shell(
        title,
        &format!(
            "<h1>{}</h1>\n<p>{}</p>\n",
            escape_html(title),
            escape_html(message)
        ),
    )
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<script>alert('x')</script>"),
            "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"
        );
        assert_eq!(escape_html("a&b\"c"), "a&amp;b&quot;c");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_login_page_escapes_injected_values() {
        let page = login_page("<evil>", "/realms/acme/login?state=\"x\"", None);
        assert!(!page.contains("<evil>"));
        assert!(page.contains("&lt;evil&gt;"));
        assert!(!page.contains("state=\"x\""));
    }

    #[test]
    fn test_login_page_shows_error_once_present() {
        let without = login_page("Acme", "/realms/acme/login", None);
        assert!(!without.contains("role=\"alert\""));

        let with = login_page("Acme", "/realms/acme/login", Some("Invalid credentials"));
        assert!(with.contains("role=\"alert\""));
        assert!(with.contains("Invalid credentials"));
    }

    #[test]
    fn test_consent_page_lists_scopes() {
        let page = consent_page(
            "Acme",
            "My App",
            &["openid".to_string(), "profile".to_string()],
            "req-1",
            "/realms/acme/consent",
        );
        assert!(page.contains("<li>openid</li>"));
        assert!(page.contains("<li>profile</li>"));
        assert!(page.contains("value=\"req-1\""));
        assert!(page.contains("value=\"approve\""));
        assert!(page.contains("value=\"deny\""));
    }

    #[test]
    fn test_recovery_codes_rendered_in_code_tags() {
        let page = recovery_codes_page(
            "Acme",
            &["AAAA111111".to_string()],
            "/realms/acme/protocol/openid-connect/auth?x=1",
        );
        assert!(page.contains("<code>AAAA111111</code>"));
        assert!(page.contains("Continue"));
    }
}
