//! Project Interceptor: per-project policy pipeline (§4.5).

use std::sync::Arc;
use std::time::Duration;

use hub_core::mock::{synthesize_response, MatchOutcome, RuleStore};
use hub_core::registry::FlowHandler;
use hub_core::{Flow, Mode, ModifiedResponse};
use hub_flowstore::FlowStore;
use tokio::sync::watch;

use crate::debug_queue::DebugQueue;

/// Default Debug-await timeout, per the §9 resolution of the source's
/// ambiguity between a 5-minute wait and a 30s recommendation: this
/// spec's default is the shorter value, configurable by callers.
pub const DEFAULT_DEBUG_TIMEOUT: Duration = Duration::from_secs(30);

/// Implements the per-project pipeline described in §4.5's mode
/// table: record, optionally consult the Mock Engine, optionally
/// suspend on the Debug Queue, and return the response the Ingress
/// worker sends back to the agent.
pub struct ProjectInterceptor {
    project_id: String,
    flow_store: Arc<FlowStore>,
    rule_store: Arc<RuleStore>,
    debug_queue: Arc<DebugQueue>,
    debug_timeout: Duration,
}

impl ProjectInterceptor {
    /// Construct an interceptor for one project, wired to its own
    /// Flow Store and Rule Store (which outlive the interceptor).
    pub fn new(project_id: impl Into<String>, flow_store: Arc<FlowStore>, rule_store: Arc<RuleStore>) -> Self {
        Self {
            project_id: project_id.into(),
            flow_store,
            rule_store,
            debug_queue: Arc::new(DebugQueue::new()),
            debug_timeout: DEFAULT_DEBUG_TIMEOUT,
        }
    }

    /// Override the Debug-await timeout (default 30s).
    pub fn with_debug_timeout(mut self, timeout: Duration) -> Self {
        self.debug_timeout = timeout;
        self
    }

    /// This project's Flow Store.
    pub fn flow_store(&self) -> &Arc<FlowStore> {
        &self.flow_store
    }

    /// This project's Rule Store.
    pub fn rule_store(&self) -> &Arc<RuleStore> {
        &self.rule_store
    }

    /// Observe the current Debug Queue contents (§6 `observe_pending`).
    pub fn observe_pending(&self) -> watch::Receiver<Vec<Flow>> {
        self.debug_queue.observe_pending()
    }

    /// Resolve a pending Debug Request. Idempotent on repeat calls for
    /// the same flow id (§8).
    pub fn resolve(&self, flow_id: &str, response: ModifiedResponse) -> bool {
        self.debug_queue.resolve(flow_id, response)
    }

    /// Cancel every outstanding Debug Request, used when this project
    /// is unregistered or the Ingress shuts down (§5).
    pub fn cancel_pending(&self) {
        self.debug_queue.cancel_all();
    }

    fn mock_lookup(&self, flow: &Flow) -> MatchOutcome {
        let query_pairs = flow.request.query_pairs();
        self.rule_store.match_request(
            &flow.request.method,
            &flow.request.host(),
            &flow.request.path(),
            &query_pairs,
        )
    }

    async fn await_debug(&self, mut flow: Flow, baseline: ModifiedResponse) -> ModifiedResponse {
        let flow_id = flow.flow_id.clone();
        let rx = self.debug_queue.enqueue(flow.clone());

        let resolved = match tokio::time::timeout(self.debug_timeout, rx).await {
            Ok(Ok(resolved)) => resolved,
            Ok(Err(_)) => {
                tracing::warn!(
                    project_id = %self.project_id, flow_id = %flow_id,
                    "debug completion channel closed without a resolution, replying original"
                );
                self.debug_queue.evict(&flow_id);
                ModifiedResponse::original()
            }
            Err(_elapsed) => {
                tracing::warn!(
                    project_id = %self.project_id, flow_id = %flow_id,
                    timeout_secs = self.debug_timeout.as_secs(),
                    "debug await timed out, replying original"
                );
                self.debug_queue.evict(&flow_id);
                ModifiedResponse::original()
            }
        };

        flow.flags.paused = false;
        if resolved != baseline {
            flow.flags.modified = true;
            flow.response = resolved.apply_to(flow.response.as_ref());
        }
        self.flow_store.add(flow);
        resolved
    }
}

#[async_trait::async_trait]
impl FlowHandler for ProjectInterceptor {
    async fn handle(&self, mut flow: Flow, mode: Mode) -> ModifiedResponse {
        match mode {
            Mode::Record => {
                self.flow_store.add(flow);
                ModifiedResponse::original()
            }

            Mode::Debug => {
                flow.flags.paused = true;
                self.flow_store.add(flow.clone());
                self.await_debug(flow, ModifiedResponse::original()).await
            }

            Mode::Mock => match self.mock_lookup(&flow) {
                MatchOutcome::Hit(rule) => {
                    flow.flags.mock_applied = true;
                    flow.flags.mock_rule_name = Some(rule.name.clone());
                    flow.flags.mock_rule_id = Some(rule.id.clone());
                    let response = synthesize_response(&rule);
                    self.flow_store.add(flow);
                    response
                }
                MatchOutcome::Miss => {
                    self.flow_store.add(flow);
                    ModifiedResponse::original()
                }
            },

            Mode::MockDebug => {
                let baseline = match self.mock_lookup(&flow) {
                    MatchOutcome::Hit(rule) => {
                        flow.flags.mock_applied = true;
                        flow.flags.mock_rule_name = Some(rule.name.clone());
                        flow.flags.mock_rule_id = Some(rule.id.clone());
                        synthesize_response(&rule)
                    }
                    MatchOutcome::Miss => ModifiedResponse::original(),
                };
                flow.flags.paused = true;
                self.flow_store.add(flow.clone());
                self.await_debug(flow, baseline).await
            }
        }
    }

    fn cancel_pending(&self) {
        self.debug_queue.cancel_all();
    }
}
