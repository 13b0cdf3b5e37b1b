//! Lifecycle events and the emitter member providers publish them on.

use tokio::sync::broadcast;

/// Channel capacity for event emitters. Events are tiny and consumers only
/// track the latest status, so a small buffer is enough.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// A provider lifecycle event.
///
/// Member providers emit these on their own [`EventEmitter`]; the multi
/// provider re-emits them on its aggregate emitter whenever the aggregate
/// status changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// The provider is ready to resolve flags.
    Ready,
    /// The provider's cached flag data may be out of date.
    Stale,
    /// The provider entered an error state it may recover from.
    Error {
        /// Optional human-readable detail.
        message: Option<String>,
    },
    /// The provider entered an unrecoverable error state.
    Fatal {
        /// Optional human-readable detail.
        message: Option<String>,
    },
}

/// Broadcast-based event emitter.
///
/// Emitting with no subscribers is a no-op, so providers can emit
/// unconditionally.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<ProviderEvent>,
}

impl EventEmitter {
    /// Create a new emitter with no subscribers.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
