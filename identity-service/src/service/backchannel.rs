//! # Backchannel Logout Delivery
//!
//! Server-to-server notifications that a session ended (OpenID Connect
//! Back-Channel Logout 1.0). Delivery is detachable work: the logout
//! response never waits for it. Unlike audit events, notifications are not
//! dropped on queue pressure; `enqueue` applies backpressure instead.
//!
//! Each notification is an HTTP POST of `logout_token=<signed JWT>` as a
//! form body, retried with exponential backoff up to the configured attempt
//! count, then abandoned and recorded as an event.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::event::event_types;
use crate::domain::NewEvent;
use crate::service::events_recorder::EventRecorder;

/// Queue capacity. Full queue means `enqueue` waits, not drops.
const QUEUE_CAPACITY: usize = 256;

/// Base delay for the retry backoff (doubles per attempt).
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// One logout notification to deliver.
#[derive(Debug, Clone)]
pub struct LogoutNotification {
    pub realm_id: Uuid,
    /// Public client identifier, for the failure event
    pub client_id: String,
    /// The client's registered backchannel logout URI
    pub uri: String,
    /// Signed logout token JWT
    pub logout_token: String,
}

/// Handle for enqueueing notifications.
#[derive(Clone)]
pub struct BackchannelNotifier {
    tx: Option<mpsc::Sender<LogoutNotification>>,
}

impl BackchannelNotifier {
    /// Spawns the delivery worker.
    ///
    /// `timeout` bounds each POST; `max_attempts` is the total number of
    /// tries per notification.
    pub fn spawn(
        timeout: Duration,
        max_attempts: u32,
        events: EventRecorder,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<LogoutNotification>(QUEUE_CAPACITY);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        let handle = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                deliver(&client, &notification, max_attempts, &events).await;
            }
            debug!("backchannel delivery worker stopped");
        });

        (Self { tx: Some(tx) }, handle)
    }

    /// A notifier that discards everything. For tests.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Enqueues a notification. Waits for queue space rather than dropping;
    /// logout notifications outrank audit events.
    pub async fn enqueue(&self, notification: LogoutNotification) {
        let Some(tx) = &self.tx else { return };

        if tx.send(notification).await.is_err() {
            warn!("backchannel delivery worker is gone, notification lost");
        }
    }
}

/// Delivers one notification with retries, recording an event on final
/// failure.
async fn deliver(
    client: &reqwest::Client,
    notification: &LogoutNotification,
    max_attempts: u32,
    events: &EventRecorder,
) {
    let mut delay = RETRY_BASE_DELAY;

    for attempt in 1..=max_attempts.max(1) {
        let result = client
            .post(&notification.uri)
            .form(&[("logout_token", notification.logout_token.as_str())])
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(
                    client_id = %notification.client_id,
                    uri = %notification.uri,
                    attempt,
                    "backchannel logout delivered"
                );
                return;
            }
            Ok(response) => {
                warn!(
                    client_id = %notification.client_id,
                    status = %response.status(),
                    attempt,
                    "backchannel logout rejected"
                );
            }
            Err(e) => {
                warn!(
                    client_id = %notification.client_id,
                    error = %e,
                    attempt,
                    "backchannel logout request failed"
                );
            }
        }

        if attempt < max_attempts {
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }

    events.record(
        NewEvent::login(notification.realm_id, event_types::BACKCHANNEL_LOGOUT_FAILED)
            .with_client(&notification.client_id)
            .with_error("delivery failed after retries"),
    );
}
