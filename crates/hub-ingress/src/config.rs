//! Ingress Server configuration (§4.1, §6).

use std::time::Duration;

/// Tuning knobs for [`crate::IngressServer`].
#[derive(Debug, Clone, Copy)]
pub struct IngressConfig {
    /// TCP port to listen on (design default 9876).
    pub port: u16,
    /// Fixed worker-pool size (design default 50).
    pub worker_count: usize,
    /// Bounded channel capacity between acceptor and workers, the
    /// source of backpressure (design default 500).
    pub channel_capacity: usize,
    /// Grace period `stop()` waits for in-flight workers to drain
    /// before forcing shutdown (design default ~1s).
    pub shutdown_grace: Duration,
    /// Per-connection read timeout. The spec leaves this unspecified
    /// beyond "a small multiple of the Debug timeout" (§5); default
    /// here is four times the default 30s Debug-await timeout.
    pub read_timeout: Duration,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            port: 9876,
            worker_count: 50,
            channel_capacity: 500,
            shutdown_grace: Duration::from_secs(1),
            read_timeout: Duration::from_secs(120),
        }
    }
}
