//! Flow Store retention limits (§4.3).

use std::time::Duration;

/// Bounded-retention configuration for a [`crate::FlowStore`].
#[derive(Debug, Clone, Copy)]
pub struct FlowStoreConfig {
    /// Hard cap on the number of flows kept (design default 200).
    pub hard_count: usize,
    /// Soft memory budget in bytes (design default 50 MiB).
    pub soft_budget_bytes: usize,
    /// Age threshold for memory-budget eviction (design default 1h).
    pub age_threshold: Duration,
    /// Capacity of each broadcast event channel.
    pub event_buffer: usize,
}

impl Default for FlowStoreConfig {
    fn default() -> Self {
        Self {
            hard_count: 200,
            soft_budget_bytes: 50 * 1024 * 1024,
            age_threshold: Duration::from_secs(3600),
            event_buffer: 256,
        }
    }
}
