//! Host-wide ingress: the fixed TCP port agents connect to, the
//! bounded worker pool that bounds concurrency, and the
//! line-delimited JSON wire protocol agents speak (§4.1, §6, §7).

mod config;
mod server;
mod stats;
mod wire;

pub use config::IngressConfig;
pub use server::{IngressServer, StartError};
pub use stats::{IngressStats, IngressStatsSnapshot};
pub use wire::{encode_modified_response, parse_line, Request};
