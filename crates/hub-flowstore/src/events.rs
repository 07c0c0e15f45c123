//! Reactive event streams emitted by the Flow Store (§4.3, §6 "GUI
//! collaborator interface").

use hub_core::Flow;
use tokio::sync::broadcast;

/// The three non-replay, bounded-buffer event streams a GUI
/// collaborator subscribes to. Each is independent; a lagging
/// subscriber silently drops its oldest unread events rather than
/// blocking the producer (`tokio::sync::broadcast`'s native overflow
/// behaviour).
pub struct FlowEvents {
    /// Emitted when a never-before-seen flow id is added.
    pub added: broadcast::Receiver<Flow>,
    /// Emitted when an add() replaces an existing flow id.
    pub updated: broadcast::Receiver<Flow>,
    /// Emitted when the store is cleared.
    pub cleared: broadcast::Receiver<()>,
}

/// Producer-side handles, held by the [`crate::FlowStore`] itself.
pub(crate) struct FlowEventSenders {
    pub added: broadcast::Sender<Flow>,
    pub updated: broadcast::Sender<Flow>,
    pub cleared: broadcast::Sender<()>,
}

impl FlowEventSenders {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            added: broadcast::channel(capacity).0,
            updated: broadcast::channel(capacity).0,
            cleared: broadcast::channel(capacity).0,
        }
    }

    pub(crate) fn subscribe(&self) -> FlowEvents {
        FlowEvents {
            added: self.added.subscribe(),
            updated: self.updated.subscribe(),
            cleared: self.cleared.subscribe(),
        }
    }
}
