/// Outbound event sinks.
///
/// The registry hands every event to an `EventPublisher` and moves on.
/// Publishing must never block or fail the caller; a slow or absent
/// observer only loses events on its own side.

use tokio::sync::broadcast;
use tracing::trace;

use mosaic_types::TransferEvent;

/// Default capacity of the broadcast channel.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Sink for transfer events. Implementations must not block.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: TransferEvent);
}

/// Fans events out to any number of subscribers over a tokio broadcast channel.
///
/// A subscriber that falls more than `capacity` events behind skips ahead
/// (`RecvError::Lagged`) instead of holding back the publisher.
pub struct BroadcastPublisher {
    tx: broadcast::Sender<TransferEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to all events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: TransferEvent) {
        trace!(kind = event.kind(), transfer_id = ?event.transfer_id(), "Publishing event");
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }
}

/// Publisher that discards all events.
pub struct NullPublisher;

impl EventPublisher for NullPublisher {
    fn publish(&self, _event: TransferEvent) {}
}
