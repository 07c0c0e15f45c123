//! Ingress-wide counters, exposed for observability (ADDED: not part
//! of the spec's core contract, but ambient per the §5 resource
//! model's suspension points; grounded on the request-counting atomics
//! pattern used by mock-serving agents in the reference pack).

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of [`IngressStats`] at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngressStatsSnapshot {
    /// Connections accepted by the listener.
    pub accepted: u64,
    /// Connections that answered a PING.
    pub pings: u64,
    /// Connections that carried a flow successfully routed (matched
    /// or unmatched — routing misses still count as "routed").
    pub flows_routed: u64,
    /// Connections whose line failed to parse as PING or Flow JSON.
    pub parse_errors: u64,
}

/// Atomics backing [`IngressStatsSnapshot`].
#[derive(Debug, Default)]
pub struct IngressStats {
    accepted: AtomicU64,
    pings: AtomicU64,
    flows_routed: AtomicU64,
    parse_errors: AtomicU64,
}

impl IngressStats {
    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ping(&self) {
        self.pings.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flow_routed(&self) {
        self.flows_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a consistent-enough snapshot for reporting.
    pub fn snapshot(&self) -> IngressStatsSnapshot {
        IngressStatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            pings: self.pings.load(Ordering::Relaxed),
            flows_routed: self.flows_routed.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
        }
    }
}
