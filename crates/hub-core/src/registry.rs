//! Project Registry and Router (§3 "Project Registration", §4.2).

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::flow::{Flow, ModifiedResponse};
use crate::mode::Mode;

/// Per-project endpoint the Router dispatches a [`Flow`] to.
///
/// Implemented by the Project Interceptor (`hub-interceptor`); kept as
/// a trait here so `hub-core` has no dependency on the interceptor
/// crate (the registry only needs to call into it).
#[async_trait::async_trait]
pub trait FlowHandler: Send + Sync {
    /// Handle one flow end-to-end for this project and produce the
    /// response to return to the agent. `mode` is the registration's
    /// mode *as read at call time*: mode changes are not synchronised
    /// with in-flight flows (§4.5), so the caller (the Router) reads
    /// it fresh for every flow rather than the handler caching it.
    async fn handle(&self, flow: Flow, mode: Mode) -> ModifiedResponse;

    /// Cancel any outstanding Debug Requests this handler is holding.
    /// Called on unregistration and on Ingress shutdown (§5). Handlers
    /// with no suspend/resume state (like tests' no-op handlers) can
    /// rely on the default no-op.
    fn cancel_pending(&self) {}
}

/// Entry in the Router (§3 "Project Registration").
pub struct ProjectRegistration {
    /// Opaque, stable project id.
    pub project_id: String,
    /// Human-readable name.
    pub name: String,
    /// Current mode (mutated in place via [`Router::set_mode`]).
    pub mode: RwLock<Mode>,
    /// Package-name filter; `None` means "catch-all".
    pub package_filter: RwLock<Option<String>>,
    /// The handler that processes flows routed to this project.
    pub handler: Arc<dyn FlowHandler>,
}

impl ProjectRegistration {
    /// Current mode.
    pub fn mode(&self) -> Mode {
        *self.mode.read()
    }

    /// Current package filter, if any.
    pub fn package_filter(&self) -> Option<String> {
        self.package_filter.read().clone()
    }
}

/// Host-wide routing table mapping flows to their owning project
/// (§4.2). Registration order is preserved for tie-breaking.
pub struct Router {
    inner: RwLock<RouterInner>,
}

struct RouterInner {
    /// Insertion-ordered project registrations, keyed by project id.
    projects: IndexMap<String, Arc<ProjectRegistration>>,
    /// Most-recently-active project id, for the final routing fallback.
    most_recently_active: Option<String>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Construct an empty router.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RouterInner {
                projects: IndexMap::new(),
                most_recently_active: None,
            }),
        }
    }

    /// Add or replace a Project Registration, marking it as the most
    /// recently active (§4.1 `register`).
    pub fn register(
        &self,
        project_id: impl Into<String>,
        name: impl Into<String>,
        mode: Mode,
        handler: Arc<dyn FlowHandler>,
        package_filter: Option<String>,
    ) {
        let project_id = project_id.into();
        let registration = Arc::new(ProjectRegistration {
            project_id: project_id.clone(),
            name: name.into(),
            mode: RwLock::new(mode),
            package_filter: RwLock::new(package_filter),
            handler,
        });

        let mut inner = self.inner.write();
        inner.projects.insert(project_id.clone(), registration);
        inner.most_recently_active = Some(project_id);
    }

    /// Remove a Project Registration. Returns it if one existed so the
    /// caller (the Ingress, or the interceptor owner) can evict its
    /// in-flight Debug requests.
    pub fn unregister(&self, project_id: &str) -> Option<Arc<ProjectRegistration>> {
        let mut inner = self.inner.write();
        let removed = inner.projects.shift_remove(project_id);
        if inner.most_recently_active.as_deref() == Some(project_id) {
            inner.most_recently_active = inner.projects.keys().last().cloned();
        }
        removed
    }

    /// Atomically mutate an existing registration's mode.
    pub fn set_mode(&self, project_id: &str, mode: Mode) -> bool {
        let inner = self.inner.read();
        match inner.projects.get(project_id) {
            Some(registration) => {
                *registration.mode.write() = mode;
                true
            }
            None => false,
        }
    }

    /// Atomically mutate an existing registration's package filter.
    pub fn set_filter(&self, project_id: &str, filter: Option<String>) -> bool {
        let inner = self.inner.read();
        match inner.projects.get(project_id) {
            Some(registration) => {
                *registration.package_filter.write() = filter;
                true
            }
            None => false,
        }
    }

    /// Mark a project as most-recently-active without otherwise
    /// mutating its registration (called after it successfully
    /// handles a flow).
    pub fn touch(&self, project_id: &str) {
        let mut inner = self.inner.write();
        if inner.projects.contains_key(project_id) {
            inner.most_recently_active = Some(project_id.to_string());
        }
    }

    /// Resolve the registration that should receive `flow`, following
    /// the ordered lookup in §4.2. Returns `None` for "unhandled —
    /// reply original-sentinel".
    pub fn route(
        &self,
        project_id: Option<&str>,
        package_name: Option<&str>,
    ) -> Option<Arc<ProjectRegistration>> {
        let inner = self.inner.read();

        // 1. Explicit project id.
        if let Some(id) = project_id {
            if let Some(registration) = inner.projects.get(id) {
                return Some(Arc::clone(registration));
            }
        }

        // 2. Package-name filter match, first in insertion order.
        if let Some(package) = package_name {
            if let Some(registration) = inner
                .projects
                .values()
                .find(|r| r.package_filter().as_deref() == Some(package))
            {
                return Some(Arc::clone(registration));
            }
        }

        // 3. Strict-filter mode: if every registration has a non-null
        // filter and none matched, the flow is unhandled regardless of
        // what would otherwise be fallbacks 4-6.
        let any_catch_all = inner.projects.values().any(|r| r.package_filter().is_none());
        if !any_catch_all && !inner.projects.is_empty() {
            return None;
        }

        // 4/5. Single or first catch-all registration.
        if let Some(registration) = inner.projects.values().find(|r| r.package_filter().is_none()) {
            return Some(Arc::clone(registration));
        }

        // 6. Most-recently-active, if step 3 did not disqualify (there
        // were no registrations at all to disqualify on, or no
        // catch-all existed but that's impossible to reach here given
        // step 3's guard — kept for the empty-registry case).
        inner
            .most_recently_active
            .as_ref()
            .and_then(|id| inner.projects.get(id))
            .map(Arc::clone)
    }

    /// Resolve and dispatch a flow in one step: the §4.2 lookup,
    /// falling back to the original-sentinel when unhandled, then
    /// invoking the resolved project's handler with its current mode
    /// and marking it most-recently-active.
    pub async fn route_and_handle(
        &self,
        flow: Flow,
        project_id: Option<&str>,
        package_name: Option<&str>,
    ) -> ModifiedResponse {
        let Some(registration) = self.route(project_id, package_name) else {
            tracing::debug!(
                ?project_id, ?package_name, "routing miss: no project matched, replying original"
            );
            return ModifiedResponse::original();
        };

        self.touch(&registration.project_id);
        let mode = registration.mode();
        registration.handler.handle(flow, mode).await
    }

    /// Snapshot of all registrations, in insertion order.
    pub fn all(&self) -> Vec<Arc<ProjectRegistration>> {
        self.inner.read().projects.values().cloned().collect()
    }

    /// Number of registered projects.
    pub fn len(&self) -> usize {
        self.inner.read().projects.len()
    }

    /// Whether no project is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.read().projects.is_empty()
    }
}
