//! # hub-interceptor
//!
//! The per-project policy state machine (§4.5) and its suspend/resume
//! Debug Queue (§3 "Pending Debug Request").

mod debug_queue;
mod interceptor;

pub use debug_queue::DebugQueue;
pub use interceptor::{ProjectInterceptor, DEFAULT_DEBUG_TIMEOUT};
