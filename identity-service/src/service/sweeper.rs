//! # Expiry Sweeper
//!
//! Periodic cleanup of everything that ages out: authorization codes,
//! device codes, consent requests, MFA challenges, verification tokens,
//! sessions, refresh tokens, stale login failures, and events past their
//! realm's retention.
//!
//! Correctness never depends on the sweep; every read path checks expiry
//! itself. The sweep only keeps table sizes bounded.

use chrono::Duration;
use shared::clock::SharedClock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::repository::{
    CodeRepository, ConsentRepository, DeviceRepository, EventRepository, GuardRepository,
    MfaRepository, SessionRepository, VerificationRepository,
};

/// How often the sweep runs.
const SWEEP_INTERVAL_SECS: u64 = 60;

/// Login failures older than this are useless for any plausible window.
const FAILURE_RETENTION_DAYS: i64 = 30;

/// Repositories the sweeper visits.
#[derive(Clone)]
pub struct SweeperDeps {
    pub codes: CodeRepository,
    pub devices: DeviceRepository,
    pub consents: ConsentRepository,
    pub mfa: MfaRepository,
    pub verifications: VerificationRepository,
    pub sessions: SessionRepository,
    pub guard: GuardRepository,
    pub events: EventRepository,
}

/// Spawns the periodic sweep task.
pub fn spawn(deps: SweeperDeps, clock: SharedClock) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            sweep_once(&deps, &clock).await;
        }
    })
}

/// One full sweep pass. Failures are logged and skipped; the next pass
/// retries.
pub async fn sweep_once(deps: &SweeperDeps, clock: &SharedClock) {
    let now = clock.now();
    let mut removed: u64 = 0;

    match deps.codes.sweep_expired(now).await {
        Ok(n) => removed += n,
        Err(e) => warn!(error = %e, "authorization code sweep failed"),
    }
    match deps.devices.sweep_expired(now).await {
        Ok(n) => removed += n,
        Err(e) => warn!(error = %e, "device code sweep failed"),
    }
    match deps.consents.sweep_expired(now).await {
        Ok(n) => removed += n,
        Err(e) => warn!(error = %e, "consent request sweep failed"),
    }
    match deps.mfa.sweep_expired(now).await {
        Ok(n) => removed += n,
        Err(e) => warn!(error = %e, "mfa challenge sweep failed"),
    }
    match deps.verifications.sweep_expired(now).await {
        Ok(n) => removed += n,
        Err(e) => warn!(error = %e, "verification token sweep failed"),
    }
    match deps.sessions.sweep_expired(now).await {
        Ok(n) => removed += n,
        Err(e) => warn!(error = %e, "session sweep failed"),
    }
    match deps
        .guard
        .sweep_older_than(now - Duration::days(FAILURE_RETENTION_DAYS))
        .await
    {
        Ok(n) => removed += n,
        Err(e) => warn!(error = %e, "login failure sweep failed"),
    }
    match deps.events.sweep_expired(now).await {
        Ok(n) => removed += n,
        Err(e) => warn!(error = %e, "event sweep failed"),
    }

    if removed > 0 {
        debug!(removed, "expiry sweep removed rows");
    }
}
