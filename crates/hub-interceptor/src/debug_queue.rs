//! Debug Queue: pending-request queue with correlated asynchronous
//! completion (§3 "Pending Debug Request", §4.5, §5).

use std::time::{Duration, Instant};

use hub_core::{Flow, ModifiedResponse};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};

struct PendingEntry {
    flow: Flow,
    arrived_at: Instant,
    /// `None` once resolved or cancelled; taking it is what makes
    /// resolve idempotent (§8 "exactly one of resolve/timeout").
    completion: Option<oneshot::Sender<ModifiedResponse>>,
}

/// Per-project queue of flows suspended awaiting a human decision.
///
/// At most one outstanding entry per flow id. Arrivals are published
/// in arrival order on a `watch` channel for a GUI collaborator to
/// observe; `resolve` is idempotent on repeat.
pub struct DebugQueue {
    pending: Mutex<IndexMap<String, PendingEntry>>,
    snapshot_tx: watch::Sender<Vec<Flow>>,
}

impl Default for DebugQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugQueue {
    /// Construct an empty debug queue.
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(Vec::new());
        Self {
            pending: Mutex::new(IndexMap::new()),
            snapshot_tx,
        }
    }

    /// Suspend `flow`, returning a receiver that completes when a
    /// human calls [`Self::resolve`] for its id, or when the caller
    /// times it out and calls [`Self::evict`].
    pub fn enqueue(&self, flow: Flow) -> oneshot::Receiver<ModifiedResponse> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            pending.insert(
                flow.flow_id.clone(),
                PendingEntry {
                    flow,
                    arrived_at: Instant::now(),
                    completion: Some(tx),
                },
            );
        }
        self.publish_snapshot();
        rx
    }

    /// Resolve a pending entry with a human-supplied response.
    /// Idempotent: a flow id with no outstanding entry, or one already
    /// resolved/evicted, is a silent no-op and returns `false`.
    pub fn resolve(&self, flow_id: &str, response: ModifiedResponse) -> bool {
        let sent = {
            let mut pending = self.pending.lock();
            match pending.get_mut(flow_id).and_then(|entry| entry.completion.take()) {
                Some(tx) => {
                    pending.shift_remove(flow_id);
                    let _ = tx.send(response);
                    true
                }
                None => false,
            }
        };
        if sent {
            self.publish_snapshot();
        }
        sent
    }

    /// Remove a pending entry without resolving it, used when its
    /// timeout has elapsed (the caller is then responsible for
    /// replying with the original-sentinel).
    pub fn evict(&self, flow_id: &str) {
        let removed = {
            let mut pending = self.pending.lock();
            pending.shift_remove(flow_id).is_some()
        };
        if removed {
            self.publish_snapshot();
        }
    }

    /// Cancel every outstanding entry by completing it with the
    /// original-sentinel, used on project unregistration or Ingress
    /// shutdown (§5 "Cancellation and timeouts").
    pub fn cancel_all(&self) {
        let mut pending = self.pending.lock();
        for (_, mut entry) in pending.drain(..) {
            if let Some(tx) = entry.completion.take() {
                let _ = tx.send(ModifiedResponse::original());
            }
        }
        drop(pending);
        self.publish_snapshot();
    }

    /// How long a pending entry has been waiting.
    pub fn age_of(&self, flow_id: &str) -> Option<Duration> {
        self.pending.lock().get(flow_id).map(|e| e.arrived_at.elapsed())
    }

    /// Current number of outstanding entries.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// True when no entries are outstanding.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Subscribe to the current pending-flow snapshot, republished on
    /// every enqueue/resolve/evict (§6 `observe_pending`).
    pub fn observe_pending(&self) -> watch::Receiver<Vec<Flow>> {
        self.snapshot_tx.subscribe()
    }

    fn publish_snapshot(&self) {
        let snapshot: Vec<Flow> = self.pending.lock().values().map(|e| e.flow.clone()).collect();
        let _ = self.snapshot_tx.send(snapshot);
    }
}
