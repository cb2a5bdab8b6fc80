//! # Password Policy
//!
//! Realm-configurable password rules: complexity (length + character
//! classes), reuse history, and maximum age. Complexity and expiry are
//! pure functions over the realm settings; history checks verify the
//! candidate against the last `n` stored hashes.

use chrono::{DateTime, Duration, Utc};
use shared::crypto::password::PasswordHasher;
use shared::errors::ApiError;
use std::sync::Arc;

use crate::domain::{Realm, User};
use crate::repository::UserRepository;

/// Password policy service.
#[derive(Clone)]
pub struct PasswordPolicyService {
    users: UserRepository,
    hasher: Arc<PasswordHasher>,
}

impl PasswordPolicyService {
    pub fn new(users: UserRepository, hasher: Arc<PasswordHasher>) -> Self {
        Self { users, hasher }
    }

    /// Validates a candidate password against the realm's complexity
    /// rules. Returns every violated rule, not just the first.
    pub fn validate(&self, realm: &Realm, password: &str) -> Result<(), Vec<String>> {
        validate_complexity(realm, password)
    }

    /// Whether the user's password has aged out under the realm policy.
    pub fn is_expired(&self, realm: &Realm, user: &User, now: DateTime<Utc>) -> bool {
        password_is_expired(realm, user, now)
    }

    /// True iff `new_password` matches any of the user's last `n` stored
    /// hashes. `n = 0` disables the check.
    pub async fn violates_history(
        &self,
        realm: &Realm,
        user_id: uuid::Uuid,
        new_password: &str,
    ) -> Result<bool, ApiError> {
        if realm.password_history_count <= 0 {
            return Ok(false);
        }

        let hashes = self
            .users
            .recent_password_hashes(user_id, realm.password_history_count as i64)
            .await?;

        for hash in &hashes {
            if self.hasher.verify(new_password, hash)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Appends a hash to the history and prunes to the realm's retention.
    pub async fn record_history(
        &self,
        realm: &Realm,
        user_id: uuid::Uuid,
        password_hash: &str,
    ) -> Result<(), ApiError> {
        if realm.password_history_count <= 0 {
            return Ok(());
        }

        self.users
            .add_password_history(
                realm.id,
                user_id,
                password_hash,
                realm.password_history_count as i64,
            )
            .await
    }
}

/// Complexity check as a standalone function.
pub fn validate_complexity(realm: &Realm, password: &str) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if password.chars().count() < realm.password_min_length as usize {
        errors.push(format!(
            "Password must be at least {} characters long",
            realm.password_min_length
        ));
    }

    if realm.password_require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
        errors.push("Password must contain at least one uppercase letter".to_string());
    }

    if realm.password_require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
        errors.push("Password must contain at least one lowercase letter".to_string());
    }

    if realm.password_require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one digit".to_string());
    }

    if realm.password_require_special && !password.chars().any(|c| !c.is_alphanumeric()) {
        errors.push("Password must contain at least one special character".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Max-age check as a standalone function.
///
/// A user without `password_changed_at` (federated, or forced change
/// pending) is never treated as expired here.
pub fn password_is_expired(realm: &Realm, user: &User, now: DateTime<Utc>) -> bool {
    if realm.password_max_age_days <= 0 {
        return false;
    }

    match user.password_changed_at {
        Some(changed_at) => now > changed_at + Duration::days(realm.password_max_age_days as i64),
        None => false,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn realm_with_password_policy() -> Realm {
        Realm {
            id: Uuid::new_v4(),
            name: "acme".to_string(),
            display_name: String::new(),
            enabled: true,
            access_token_lifespan_secs: 300,
            refresh_token_lifespan_secs: 2_592_000,
            offline_token_lifespan_secs: 5_184_000,
            sso_session_lifespan_secs: 36_000,
            password_min_length: 10,
            password_require_uppercase: true,
            password_require_lowercase: true,
            password_require_digit: true,
            password_require_special: true,
            password_history_count: 3,
            password_max_age_days: 90,
            brute_force_enabled: false,
            max_login_failures: 5,
            lockout_duration_secs: 300,
            failure_reset_secs: 900,
            permanent_lockout_after: 0,
            mfa_required: false,
            registration_allowed: true,
            require_email_verification: false,
            events_enabled: true,
            events_expiration_secs: 2_592_000,
            smtp_from: None,
            smtp_host: None,
            smtp_port: None,
            login_theme: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn user_with_password_changed_at(changed_at: Option<DateTime<Utc>>) -> User {
        User {
            id: Uuid::new_v4(),
            realm_id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: None,
            email_verified: false,
            first_name: None,
            last_name: None,
            enabled: true,
            password_hash: Some("$argon2id$...".to_string()),
            password_changed_at: changed_at,
            federation_link: None,
            update_password_required: false,
            lockout_count: 0,
            permanently_locked: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_password_passes_all_rules() {
        let realm = realm_with_password_policy();
        assert!(validate_complexity(&realm, "Str0ng&Password!").is_ok());
    }

    #[test]
    fn test_each_rule_reports_its_own_error() {
        let realm = realm_with_password_policy();

        let errors = validate_complexity(&realm, "short").unwrap_err();
        assert!(errors.iter().any(|e| e.contains("at least 10 characters")));

        let errors = validate_complexity(&realm, "nouppercase1!x").unwrap_err();
        assert!(errors.iter().any(|e| e.contains("uppercase")));

        let errors = validate_complexity(&realm, "NOLOWERCASE1!X").unwrap_err();
        assert!(errors.iter().any(|e| e.contains("lowercase")));

        let errors = validate_complexity(&realm, "NoDigitsHere!!").unwrap_err();
        assert!(errors.iter().any(|e| e.contains("digit")));

        let errors = validate_complexity(&realm, "NoSpecials1234").unwrap_err();
        assert!(errors.iter().any(|e| e.contains("special")));
    }

    #[test]
    fn test_weak_password_collects_multiple_errors() {
        let realm = realm_with_password_policy();
        let errors = validate_complexity(&realm, "abc").unwrap_err();
        assert!(errors.len() >= 3);
    }

    #[test]
    fn test_relaxed_policy_accepts_simple_passwords() {
        let mut realm = realm_with_password_policy();
        realm.password_min_length = 4;
        realm.password_require_uppercase = false;
        realm.password_require_lowercase = false;
        realm.password_require_digit = false;
        realm.password_require_special = false;

        assert!(validate_complexity(&realm, "abcd").is_ok());
    }

    #[test]
    fn test_expiry_only_after_max_age() {
        let realm = realm_with_password_policy();
        let changed = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let user = user_with_password_changed_at(Some(changed));

        assert!(!password_is_expired(
            &realm,
            &user,
            changed + Duration::days(89)
        ));
        assert!(password_is_expired(
            &realm,
            &user,
            changed + Duration::days(91)
        ));
    }

    #[test]
    fn test_expiry_disabled_when_max_age_zero() {
        let mut realm = realm_with_password_policy();
        realm.password_max_age_days = 0;
        let changed = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let user = user_with_password_changed_at(Some(changed));

        assert!(!password_is_expired(&realm, &user, Utc::now()));
    }

    #[test]
    fn test_no_changed_at_never_expires() {
        let realm = realm_with_password_policy();
        let user = user_with_password_changed_at(None);
        assert!(!password_is_expired(&realm, &user, Utc::now()));
    }
}
