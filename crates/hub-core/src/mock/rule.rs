//! Mock Rule and Collection types (§3).

use serde::{Deserialize, Serialize};

use crate::flow::Headers;

/// How a [`QueryParam`] predicate's value is compared against the
/// request's query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// String equality.
    Exact,
    /// Key must be present; value is ignored.
    Wildcard,
    /// Full-match against a pre-compiled regular expression.
    Regex,
}

/// A single query-parameter predicate on a [`MockRule`]'s match pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryParam {
    /// The query parameter's key.
    pub key: String,
    /// The value to compare against (interpreted per `match_type`).
    pub value: String,
    /// Whether the key must be present for the rule to match at all.
    pub required: bool,
    /// How `value` is compared.
    pub match_type: MatchType,
}

/// The structured match pattern half of a [`MockRule`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockMatch {
    /// HTTP method (case-insensitive comparison).
    pub method: String,
    /// Scheme (`http`/`https`); not indexed on, informational only.
    #[serde(default)]
    pub scheme: String,
    /// Host (case-insensitive comparison).
    pub host: String,
    /// Port, when the rule is scoped to one.
    #[serde(default)]
    pub port: Option<u16>,
    /// Path: exact string match unless it contains a regex
    /// metacharacter (`.`, `*`, `+`, `?`), in which case it is treated
    /// as a full-path regular expression (§4.4).
    pub path: String,
    /// Query-parameter predicates.
    #[serde(default)]
    pub query_params: Vec<QueryParam>,
}

/// The canned-response half of a [`MockRule`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockResponseSpec {
    /// Status code to return.
    pub status_code: u16,
    /// Headers to return (full replacement set).
    #[serde(default)]
    pub headers: Headers,
    /// Body to return.
    #[serde(default)]
    pub body: String,
}

/// A structured matching pattern plus a canned response (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockRule {
    /// Unique rule id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether the rule itself is enabled (independent of its collection).
    pub enabled: bool,
    /// The collection this rule belongs to.
    pub collection_id: String,
    /// The match pattern.
    pub matcher: MockMatch,
    /// The canned response.
    pub response: MockResponseSpec,
}

/// A named grouping of [`MockRule`]s (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    /// Unique collection id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Optional package-name association (informational; routing uses
    /// the Router's own filters, not this field).
    #[serde(default)]
    pub package_name: Option<String>,
    /// Whether the collection (and therefore all its rules) is enabled.
    pub enabled: bool,
}
