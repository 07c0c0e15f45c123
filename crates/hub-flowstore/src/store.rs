//! Bounded in-memory Flow Store with memory-budget eviction (§4.3).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use hub_core::Flow;
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::config::FlowStoreConfig;
use crate::events::{FlowEventSenders, FlowEvents};

struct Entry {
    flow: Flow,
    inserted_at: Instant,
}

/// Holds the N most recent flows for one project, under a soft memory
/// budget, de-duplicated by flow id.
pub struct FlowStore {
    config: FlowStoreConfig,
    entries: RwLock<IndexMap<String, Entry>>,
    paused_count: AtomicUsize,
    events: FlowEventSenders,
}

impl FlowStore {
    /// Construct an empty flow store.
    pub fn new(config: FlowStoreConfig) -> Self {
        Self {
            events: FlowEventSenders::new(config.event_buffer),
            config,
            entries: RwLock::new(IndexMap::new()),
            paused_count: AtomicUsize::new(0),
        }
    }

    /// Insert-or-replace a flow by id (§4.3 `add`). The flow is
    /// visible to subsequent reads before the corresponding event is
    /// emitted, and the event is emitted outside the write lock to
    /// avoid re-entrancy from a subscriber.
    pub fn add(&self, flow: Flow) {
        let id = flow.flow_id.clone();
        let is_update;
        {
            let mut entries = self.entries.write();
            is_update = entries.contains_key(&id);

            if is_update {
                if let Some(previous) = entries.get(&id) {
                    if previous.flow.flags.paused && !flow.flags.paused {
                        self.paused_count.fetch_sub(1, Ordering::SeqCst);
                    } else if !previous.flow.flags.paused && flow.flags.paused {
                        self.paused_count.fetch_add(1, Ordering::SeqCst);
                    }
                }
            } else if flow.flags.paused {
                self.paused_count.fetch_add(1, Ordering::SeqCst);
            }

            entries.insert(
                id,
                Entry {
                    flow: flow.clone(),
                    inserted_at: Instant::now(),
                },
            );

            self.enforce_hard_count(&mut entries);
            self.enforce_soft_budget(&mut entries);
        }

        if is_update {
            let _ = self.events.updated.send(flow);
        } else {
            let _ = self.events.added.send(flow);
        }
    }

    /// Drop all flows and reset counters (§4.3 `clear`).
    pub fn clear(&self) {
        {
            let mut entries = self.entries.write();
            entries.clear();
        }
        self.paused_count.store(0, Ordering::SeqCst);
        let _ = self.events.cleared.send(());
    }

    /// Snapshot of all flows, in insertion order.
    pub fn all(&self) -> Vec<Flow> {
        self.entries.read().values().map(|e| e.flow.clone()).collect()
    }

    /// Number of flows currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if the store holds no flows.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of currently paused flows.
    pub fn paused_count(&self) -> usize {
        self.paused_count.load(Ordering::SeqCst)
    }

    /// Subscribe to the store's reactive event streams.
    pub fn observe(&self) -> FlowEvents {
        self.events.subscribe()
    }

    /// Evict oldest-first until the hard count is respected.
    fn enforce_hard_count(&self, entries: &mut IndexMap<String, Entry>) {
        while entries.len() > self.config.hard_count {
            self.evict_oldest(entries);
        }
    }

    /// Evict flows older than the age threshold, oldest first, until
    /// the estimated byte budget is respected. Runs after hard-count
    /// enforcement, on the same `add` (§4.3).
    fn enforce_soft_budget(&self, entries: &mut IndexMap<String, Entry>) {
        if self.estimated_bytes(entries) <= self.config.soft_budget_bytes {
            return;
        }

        loop {
            let oldest_is_stale = entries
                .values()
                .next()
                .is_some_and(|e| e.inserted_at.elapsed() >= self.config.age_threshold);

            if !oldest_is_stale {
                break;
            }
            self.evict_oldest(entries);

            if self.estimated_bytes(entries) <= self.config.soft_budget_bytes {
                break;
            }
        }
    }

    fn evict_oldest(&self, entries: &mut IndexMap<String, Entry>) {
        match entries.shift_remove_index(0) {
            Some((id, removed)) => {
                tracing::debug!(flow_id = %id, "evicting oldest flow to respect store limits");
                if removed.flow.flags.paused {
                    self.paused_count.fetch_sub(1, Ordering::SeqCst);
                }
            }
            None => tracing::warn!("asked to evict from an empty flow store"),
        }
    }

    fn estimated_bytes(&self, entries: &IndexMap<String, Entry>) -> usize {
        entries.values().map(|e| e.flow.estimated_bytes()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::{FlowFlags, FlowRequest};
    use std::time::Duration;

    fn flow(id: &str, paused: bool) -> Flow {
        Flow {
            flow_id: id.to_string(),
            request: FlowRequest {
                method: "GET".into(),
                url: "https://x/y".into(),
                headers: Default::default(),
                body: String::new(),
            },
            response: None,
            timestamp: 0.0,
            duration: 0.0,
            flags: FlowFlags {
                paused,
                ..Default::default()
            },
        }
    }

    #[test]
    fn add_preserves_insertion_order_and_updates_in_place() {
        let store = FlowStore::new(FlowStoreConfig::default());
        store.add(flow("f1", false));
        store.add(flow("f2", false));
        store.add(flow("f1", false));
        let ids: Vec<_> = store.all().iter().map(|f| f.flow_id.clone()).collect();
        assert_eq!(ids, vec!["f1", "f2"]);
    }

    #[test]
    fn hard_count_evicts_oldest_first() {
        let config = FlowStoreConfig {
            hard_count: 2,
            ..FlowStoreConfig::default()
        };
        let store = FlowStore::new(config);
        store.add(flow("f1", false));
        store.add(flow("f2", false));
        store.add(flow("f3", false));
        let ids: Vec<_> = store.all().iter().map(|f| f.flow_id.clone()).collect();
        assert_eq!(ids, vec!["f2", "f3"]);
    }

    #[test]
    fn paused_count_tracks_adds_updates_and_eviction() {
        let config = FlowStoreConfig {
            hard_count: 1,
            ..FlowStoreConfig::default()
        };
        let store = FlowStore::new(config);
        store.add(flow("f1", true));
        assert_eq!(store.paused_count(), 1);
        store.add(flow("f2", true));
        // f1 evicted by hard_count=1.
        assert_eq!(store.paused_count(), 1);
        store.add(flow("f2", false));
        assert_eq!(store.paused_count(), 0);
    }

    #[test]
    fn clear_resets_counts_and_contents() {
        let store = FlowStore::new(FlowStoreConfig::default());
        store.add(flow("f1", true));
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.paused_count(), 0);
    }

    #[test]
    fn soft_budget_does_not_evict_fresh_flows() {
        let config = FlowStoreConfig {
            hard_count: 1000,
            soft_budget_bytes: 1,
            age_threshold: Duration::from_secs(3600),
            event_buffer: 16,
        };
        let store = FlowStore::new(config);
        store.add(flow("f1", false));
        // Over budget but not yet stale: nothing evicted.
        assert_eq!(store.len(), 1);
    }
}
