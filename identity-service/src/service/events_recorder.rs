//! # Events Recorder
//!
//! Fire-and-forget audit trail. `record` pushes onto a bounded queue and
//! returns immediately; a background task drains the queue into the events
//! table. When the queue is full the event is dropped and counted: audit
//! events are the lowest-priority detachable work and must never hold up a
//! user-visible response.

use shared::clock::SharedClock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::NewEvent;
use crate::repository::EventRepository;

/// Queue capacity before events start being dropped.
const QUEUE_CAPACITY: usize = 1024;

/// Handle for enqueueing events. Cheap to clone; all clones feed the same
/// background writer.
#[derive(Clone)]
pub struct EventRecorder {
    tx: Option<mpsc::Sender<NewEvent>>,
    dropped: Arc<AtomicU64>,
}

impl EventRecorder {
    /// Spawns the background writer and returns the recorder handle.
    pub fn spawn(repository: EventRepository, clock: SharedClock) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<NewEvent>(QUEUE_CAPACITY);

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let now = clock.now();
                if let Err(e) = repository.append(&event, now).await {
                    // Event loss is acceptable; request handling never was
                    // waiting on this write.
                    warn!(error = %e, event_type = %event.event_type, "failed to persist event");
                }
            }
            debug!("event writer stopped");
        });

        (
            Self {
                tx: Some(tx),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            handle,
        )
    }

    /// A recorder that discards everything. For tests and disabled realms.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enqueues an event without blocking. Drops on overflow.
    pub fn record(&self, event: NewEvent) {
        let Some(tx) = &self.tx else { return };

        if let Err(mpsc::error::TrySendError::Full(event)) = tx.try_send(event) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                event_type = %event.event_type,
                total_dropped = dropped,
                "event queue full, dropping event"
            );
        }
    }

    /// Number of events dropped due to queue overflow.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::event_types;
    use uuid::Uuid;

    #[test]
    fn test_disabled_recorder_swallows_events() {
        let recorder = EventRecorder::disabled();
        recorder.record(NewEvent::login(Uuid::new_v4(), event_types::LOGIN));
        assert_eq!(recorder.dropped_count(), 0);
    }
}
