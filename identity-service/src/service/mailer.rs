//! # Mailer Contract and Dispatcher
//!
//! The core never talks SMTP. It emits send-email requests (destination,
//! subject, body) through the [`Mailer`] trait; delivery and template
//! rendering live in an external collaborator. The [`MailDispatcher`]
//! decouples request handling from that collaborator: enqueue returns
//! immediately, and a delivery failure can never fail the enclosing
//! request.

use async_trait::async_trait;
use shared::errors::ApiError;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Queue capacity before email requests are dropped with a warning.
const QUEUE_CAPACITY: usize = 512;

/// A send-email request, the full contract with the delivery collaborator.
#[derive(Debug, Clone)]
pub struct EmailRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivery collaborator contract.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, request: EmailRequest) -> Result<(), ApiError>;
}

/// Default collaborator: logs the request and reports success. Stands in
/// wherever no relay is wired up (development, tests).
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, request: EmailRequest) -> Result<(), ApiError> {
        info!(to = %request.to, subject = %request.subject, "email request (log only)");
        Ok(())
    }
}

/// Fire-and-forget front of the mailer.
#[derive(Clone)]
pub struct MailDispatcher {
    tx: Option<mpsc::Sender<EmailRequest>>,
}

impl MailDispatcher {
    /// Spawns the delivery worker around a mailer implementation.
    pub fn spawn(mailer: Arc<dyn Mailer>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<EmailRequest>(QUEUE_CAPACITY);

        let handle = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let to = request.to.clone();
                if let Err(e) = mailer.send(request).await {
                    // Never propagates: email failure must not fail the
                    // request that queued it.
                    warn!(to = %to, error = %e, "email delivery failed");
                }
            }
            debug!("mail dispatcher stopped");
        });

        (Self { tx: Some(tx) }, handle)
    }

    /// A dispatcher that discards everything. For tests.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Enqueues an email request without blocking.
    pub fn enqueue(&self, request: EmailRequest) {
        let Some(tx) = &self.tx else { return };

        if let Err(mpsc::error::TrySendError::Full(request)) = tx.try_send(request) {
            warn!(to = %request.to, "mail queue full, dropping email request");
        }
    }
}
