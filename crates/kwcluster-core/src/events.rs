//! Event bus for job lifecycle notifications.
//!
//! Terminal job transitions are fanned out over a single broadcast channel.
//! Downstream consumers (SSE, telemetry) subscribe independently; a lagging
//! or absent subscriber never blocks the pipeline.

use tokio::sync::broadcast;

use crate::models::JobEvent;
use crate::traits::JobNotifier;

/// Broadcast hub for [`JobEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    ///
    /// Recommended: 256 for production, 32 for tests.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers. Dropped silently when nobody listens.
    pub fn emit(&self, event: JobEvent) {
        tracing::debug!(
            job_id = %event.job_id,
            status = %event.status,
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(event);
    }

    /// Subscribe to receive events. Each subscriber gets its own independent stream.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

impl JobNotifier for EventBus {
    fn notify(&self, event: JobEvent) {
        self.emit(event);
    }
}
