//! The per-project policy [`Mode`] (§3, §4.5).

use serde::{Deserialize, Serialize};

/// Controls the Project Interceptor's per-flow behaviour. Transitions
/// between modes are unconstrained and carry no history: a mode
/// change, made via `set_mode`, takes effect on the next flow the
/// interceptor handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Record the flow; never consult the mock engine; always reply
    /// with the original-sentinel.
    Record,
    /// Record the flow paused; suspend on the Debug Queue until a
    /// human resolves it.
    Debug,
    /// Record the flow; consult the mock engine; reply with the
    /// matched rule's response or the original-sentinel on a miss.
    Mock,
    /// Record the flow paused with the mock-synthesised response (if
    /// any) substituted; suspend on the Debug Queue regardless of
    /// whether the mock engine matched.
    MockDebug,
}

impl Mode {
    /// Whether this mode consults the mock engine at all.
    pub const fn consults_mock_engine(self) -> bool {
        matches!(self, Self::Mock | Self::MockDebug)
    }

    /// Whether this mode suspends the flow on the Debug Queue.
    pub const fn suspends_on_debug_queue(self) -> bool {
        matches!(self, Self::Debug | Self::MockDebug)
    }
}
