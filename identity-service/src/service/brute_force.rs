//! # Brute-Force Guard
//!
//! Per-(realm, user) failure counting with temporary and permanent
//! lockouts. The lock decision is a pure function over the failure state;
//! the counting itself is serialized per user in the repository so
//! concurrent bad attempts cannot undercount.
//!
//! ## Lockout Model
//!
//! ```text
//! failures within failure_reset window >= max_login_failures
//!     AND now < last_failure + lockout_duration        -> locked (temporary)
//!
//! completed lockouts >= permanent_lockout_after (> 0)  -> locked (permanent)
//! ```

use chrono::{DateTime, Duration, Utc};
use shared::clock::SharedClock;
use shared::errors::ApiError;
use tracing::{info, warn};

use crate::domain::event::event_types;
use crate::domain::{NewEvent, Realm, User};
use crate::repository::guard_repository::{FailureState, GuardRepository};
use crate::service::events_recorder::EventRecorder;

/// Brute-force protection service.
#[derive(Clone)]
pub struct BruteForceGuard {
    repository: GuardRepository,
    events: EventRecorder,
    clock: SharedClock,
}

impl BruteForceGuard {
    pub fn new(repository: GuardRepository, events: EventRecorder, clock: SharedClock) -> Self {
        Self {
            repository,
            events,
            clock,
        }
    }

    /// Rejects the attempt when the account is locked.
    ///
    /// # Errors
    ///
    /// - `ApiError::AccountLocked { until: None }` for permanent lockouts
    /// - `ApiError::AccountLocked { until: Some(..) }` for temporary ones
    pub async fn check_locked(&self, realm: &Realm, user: &User) -> Result<(), ApiError> {
        if !realm.brute_force_enabled {
            return Ok(());
        }

        if user.permanently_locked {
            return Err(ApiError::AccountLocked { until: None });
        }

        let now = self.clock.now();
        let window_start = now - Duration::seconds(realm.failure_reset_secs as i64);
        let state = self
            .repository
            .failure_state(realm.id, user.id, window_start)
            .await?;

        if let Some(until) = lockout_until(realm, &state) {
            if now < until {
                return Err(ApiError::AccountLocked { until: Some(until) });
            }
        }

        Ok(())
    }

    /// Records a failed attempt.
    pub async fn record_failure(
        &self,
        realm: &Realm,
        user: &User,
        ip: Option<&str>,
    ) -> Result<(), ApiError> {
        if !realm.brute_force_enabled {
            return Ok(());
        }

        let now = self.clock.now();
        let window_start = now - Duration::seconds(realm.failure_reset_secs as i64);

        let state = self
            .repository
            .record_failure(
                realm.id,
                user.id,
                ip,
                now,
                window_start,
                realm.max_login_failures as i64,
                realm.permanent_lockout_after,
            )
            .await?;

        if state.recent_failures >= realm.max_login_failures as i64 {
            warn!(
                user_id = %user.id,
                realm = %realm.name,
                failures = state.recent_failures,
                permanent = state.permanently_locked,
                "account locked after repeated failures"
            );
            self.events.record(
                NewEvent::login(realm.id, event_types::ACCOUNT_LOCKED)
                    .with_user(user.id)
                    .with_ip(ip.map(str::to_string)),
            );
        }

        Ok(())
    }

    /// Clears the failure counter after a successful login.
    pub async fn reset_failures(&self, realm: &Realm, user: &User) -> Result<(), ApiError> {
        if !realm.brute_force_enabled {
            return Ok(());
        }

        let removed = self.repository.reset_failures(realm.id, user.id).await?;
        if removed > 0 {
            info!(user_id = %user.id, removed, "login failures reset");
        }

        Ok(())
    }

    /// Admin unlock: clears failures and the permanent flag.
    pub async fn unlock(&self, realm: &Realm, user: &User) -> Result<(), ApiError> {
        self.repository.unlock(realm.id, user.id).await
    }
}

/// Derives the end of a temporary lockout from the failure state.
///
/// Returns `None` when the user is under the failure limit.
pub fn lockout_until(realm: &Realm, state: &FailureState) -> Option<DateTime<Utc>> {
    if state.recent_failures < realm.max_login_failures as i64 {
        return None;
    }

    state
        .last_failure_at
        .map(|last| last + Duration::seconds(realm.lockout_duration_secs as i64))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn realm_with_policy(max_failures: i32, lockout_secs: i32) -> Realm {
        Realm {
            id: Uuid::new_v4(),
            name: "acme".to_string(),
            display_name: String::new(),
            enabled: true,
            access_token_lifespan_secs: 300,
            refresh_token_lifespan_secs: 2_592_000,
            offline_token_lifespan_secs: 5_184_000,
            sso_session_lifespan_secs: 36_000,
            password_min_length: 8,
            password_require_uppercase: false,
            password_require_lowercase: false,
            password_require_digit: false,
            password_require_special: false,
            password_history_count: 0,
            password_max_age_days: 0,
            brute_force_enabled: true,
            max_login_failures: max_failures,
            lockout_duration_secs: lockout_secs,
            failure_reset_secs: 900,
            permanent_lockout_after: 0,
            mfa_required: false,
            registration_allowed: false,
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

    #[test]
    fn test_under_limit_is_not_locked() {
        let realm = realm_with_policy(3, 60);
        let state = FailureState {
            recent_failures: 2,
            last_failure_at: Some(Utc::now()),
            lockout_count: 0,
            permanently_locked: false,
        };
        assert_eq!(lockout_until(&realm, &state), None);
    }

    #[test]
    fn test_at_limit_locks_for_duration() {
        let realm = realm_with_policy(3, 60);
        let last = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let state = FailureState {
            recent_failures: 3,
            last_failure_at: Some(last),
            lockout_count: 1,
            permanently_locked: false,
        };

        let until = lockout_until(&realm, &state).unwrap();
        assert_eq!(until, last + Duration::seconds(60));
    }

    #[test]
    fn test_lock_expires_after_duration() {
        let realm = realm_with_policy(3, 60);
        let last = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let state = FailureState {
            recent_failures: 3,
            last_failure_at: Some(last),
            lockout_count: 1,
            permanently_locked: false,
        };

        let until = lockout_until(&realm, &state).unwrap();
        let one_minute_later = last + Duration::seconds(61);
        // The caller compares now < until; a minute later the lock is over
        assert!(one_minute_later >= until);
    }

    #[test]
    fn test_over_limit_still_locked() {
        let realm = realm_with_policy(3, 60);
        let last = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let state = FailureState {
            recent_failures: 7,
            last_failure_at: Some(last),
            lockout_count: 1,
            permanently_locked: false,
        };
        assert!(lockout_until(&realm, &state).is_some());
    }
}
