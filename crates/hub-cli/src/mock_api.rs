//! The rule-match HTTP sidecar for non-native agents (spec.md §6):
//! `GET /mock-match` against a project's Rule Store without going
//! through the line-delimited wire protocol.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router as AxumRouter};
use hub_core::mock::{MatchOutcome, RuleStore};
use indexmap::IndexMap;
use serde::Serialize;

/// Per-project Rule Stores the sidecar can query. The spec's query
/// interface names no project parameter; when more than one project
/// is registered, callers must disambiguate with `project`.
#[derive(Clone, Default)]
pub struct SidecarState {
    rule_stores: Arc<IndexMap<String, Arc<RuleStore>>>,
}

impl SidecarState {
    /// Build sidecar state from the hub's per-project Rule Stores.
    pub fn new(rule_stores: IndexMap<String, Arc<RuleStore>>) -> Self {
        Self { rule_stores: Arc::new(rule_stores) }
    }
}

/// Build the sidecar's axum router.
pub fn router(state: SidecarState) -> AxumRouter {
    AxumRouter::new().route("/mock-match", get(mock_match)).with_state(state)
}

#[derive(Serialize)]
struct MatchBody {
    rule_id: String,
    rule_name: String,
    status_code: u16,
    headers: hub_core::Headers,
    content: String,
}

async fn mock_match(
    State(state): State<SidecarState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(rule_store) = resolve_rule_store(&state, &params) else {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({}))).into_response();
    };

    let method = params.get("method").cloned().unwrap_or_default();
    let host = params.get("host").cloned().unwrap_or_default();
    let path = params.get("path").cloned().unwrap_or_default();
    let query_pairs: Vec<(String, String)> = params
        .iter()
        .filter_map(|(k, v)| k.strip_prefix("query_").map(|key| (key.to_string(), v.clone())))
        .collect();

    match rule_store.match_request(&method, &host, &path, &query_pairs) {
        MatchOutcome::Hit(rule) => {
            let body = MatchBody {
                rule_id: rule.id,
                rule_name: rule.name,
                status_code: rule.response.status_code,
                headers: rule.response.headers,
                content: rule.response.body,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        MatchOutcome::Miss => (StatusCode::NOT_FOUND, Json(serde_json::json!({}))).into_response(),
    }
}

fn resolve_rule_store(state: &SidecarState, params: &HashMap<String, String>) -> Option<Arc<RuleStore>> {
    if let Some(project) = params.get("project") {
        return state.rule_stores.get(project).cloned();
    }
    if state.rule_stores.len() == 1 {
        return state.rule_stores.values().next().cloned();
    }
    None
}
