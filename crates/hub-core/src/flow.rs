//! The Flow data model: a single observed request/response pair.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered, case-preserving multimap of header names to values.
///
/// Wire encoding is a plain JSON object (`string -> string`); insertion
/// order is preserved internally so that re-serialisation round-trips
/// the header order an agent sent.
pub type Headers = IndexMap<String, String>;

/// The request half of a [`Flow`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowRequest {
    /// HTTP method, as sent by the agent (not case-normalised on the wire).
    pub method: String,
    /// Absolute URL of the request.
    pub url: String,
    /// Request headers, in agent-supplied order.
    #[serde(default)]
    pub headers: Headers,
    /// Request body. Empty string when there is no body.
    #[serde(default)]
    pub body: String,
}

impl FlowRequest {
    /// The host component of [`Self::url`], or empty string if unparseable.
    pub fn host(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default()
    }

    /// The path component of [`Self::url`] (no query string), or `/` if unparseable.
    pub fn path(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .map(|u| u.path().to_string())
            .unwrap_or_else(|| "/".to_string())
    }

    /// Query parameters as `(key, value)` pairs, in URL order. Repeated
    /// keys appear multiple times.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        url::Url::parse(&self.url)
            .map(|u| {
                u.query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// The response half of a [`Flow`]. Absent until the agent has
/// observed a remote answer (or until the hub has synthesised one).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Status reason phrase, when supplied.
    #[serde(default)]
    pub reason: String,
    /// Response headers.
    #[serde(default)]
    pub headers: Headers,
    /// Response body. Empty string when there is no body.
    #[serde(default)]
    pub body: String,
}

/// Policy flags attached to a recorded [`Flow`], set by the Project
/// Interceptor as it processes the flow (§4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowFlags {
    /// The flow is paused awaiting human resolution (Debug/MockDebug).
    #[serde(default)]
    pub paused: bool,
    /// A human edited the response before it was returned to the agent.
    #[serde(default)]
    pub modified: bool,
    /// The mock engine substituted the response.
    #[serde(default)]
    pub mock_applied: bool,
    /// Name of the mock rule that matched, if any.
    #[serde(default)]
    pub mock_rule_name: Option<String>,
    /// Identity of the mock rule that matched, if any.
    #[serde(default)]
    pub mock_rule_id: Option<String>,
}

/// A single observed request/response pair, as defined in §3.
///
/// Flow identity is the agent-assigned `flow_id`; a Flow Store treats
/// an `add` of an existing id as an update, never a second insertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flow {
    /// Opaque flow id, assigned by the agent.
    pub flow_id: String,
    /// The request half.
    pub request: FlowRequest,
    /// The response half, absent when not yet available.
    pub response: Option<FlowResponse>,
    /// Agent wall-clock timestamp, in seconds.
    pub timestamp: f64,
    /// Duration of the request, in seconds.
    pub duration: f64,
    /// Policy flags set by the interceptor.
    #[serde(default)]
    pub flags: FlowFlags,
}

impl Flow {
    /// Approximate in-memory footprint used by the Flow Store's
    /// soft memory budget (§4.3): a fixed per-flow overhead plus the
    /// byte lengths of the url, both bodies, and the stringified
    /// headers.
    pub fn estimated_bytes(&self) -> usize {
        const PER_FLOW_OVERHEAD: usize = 256;

        let mut total = PER_FLOW_OVERHEAD;
        total += self.request.url.len();
        total += self.request.body.len();
        total += headers_byte_len(&self.request.headers);
        if let Some(response) = &self.response {
            total += response.body.len();
            total += headers_byte_len(&response.headers);
        }
        total
    }
}

fn headers_byte_len(headers: &Headers) -> usize {
    headers
        .iter()
        .map(|(k, v)| k.len() + v.len())
        .sum()
}

/// Wire-format Flow envelope (§6): the on-the-wire field names are
/// lower-snake-case and include routing hints the [`Flow`] itself does
/// not carry (those are consumed by the Router and discarded).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEnvelope {
    /// Opaque flow id.
    pub flow_id: String,
    /// The request half.
    pub request: FlowRequest,
    /// The response half, as observed by the agent before interception.
    pub response: Option<FlowResponse>,
    /// Agent wall-clock timestamp, in milliseconds on the wire.
    pub timestamp: f64,
    /// Duration, in milliseconds on the wire.
    pub duration: f64,
    /// Explicit project id, when the agent knows it.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Package name used for filter-based routing.
    #[serde(default)]
    pub package_name: Option<String>,
}

impl FlowEnvelope {
    /// Convert the wire envelope into the internal [`Flow`] record,
    /// normalising millisecond timestamps to seconds per §3.
    pub fn into_flow(self) -> Flow {
        Flow {
            flow_id: self.flow_id,
            request: self.request,
            response: self.response,
            timestamp: self.timestamp / 1000.0,
            duration: self.duration / 1000.0,
            flags: FlowFlags::default(),
        }
    }
}

/// A possibly-partial response substitution, the wire type returned to
/// agents (§3, §6). All three fields independently optional; the
/// all-null value is the "use original" sentinel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModifiedResponse {
    /// Replacement status code, or `None` to keep the remote one.
    #[serde(default)]
    pub status_code: Option<u16>,
    /// Replacement headers. When present, **replaces the full header
    /// set** (§9: a present map replaces; a null map leaves remote
    /// headers intact).
    #[serde(default)]
    pub headers: Option<Headers>,
    /// Replacement body, or `None` to keep the remote one.
    #[serde(default)]
    pub body: Option<String>,
}

impl ModifiedResponse {
    /// The original-sentinel: instructs the agent to use the remote
    /// response unchanged.
    pub fn original() -> Self {
        Self::default()
    }

    /// True when every field is absent (the original-sentinel).
    pub fn is_original(&self) -> bool {
        self.status_code.is_none() && self.headers.is_none() && self.body.is_none()
    }

    /// Build a full substitution from a mock rule's canned response.
    pub fn full(status_code: u16, headers: Headers, body: String) -> Self {
        Self {
            status_code: Some(status_code),
            headers: Some(headers),
            body: Some(body),
        }
    }

    /// Apply this (possibly partial) substitution onto a base response
    /// for re-recording (§9: a present `headers` map replaces the full
    /// set; absent fields keep the base's value). The original
    /// sentinel leaves `base` untouched.
    pub fn apply_to(&self, base: Option<&FlowResponse>) -> Option<FlowResponse> {
        if self.is_original() {
            return base.cloned();
        }
        let mut response = base.cloned().unwrap_or(FlowResponse {
            status_code: 0,
            reason: String::new(),
            headers: Headers::new(),
            body: String::new(),
        });
        if let Some(status_code) = self.status_code {
            response.status_code = status_code;
        }
        if let Some(headers) = &self.headers {
            response.headers = headers.clone();
        }
        if let Some(body) = &self.body {
            response.body = body.clone();
        }
        Some(response)
    }
}
