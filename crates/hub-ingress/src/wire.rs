//! Line-delimited JSON wire protocol (§6).

use hub_core::{FlowEnvelope, ModifiedResponse};

/// One connection carries exactly one of these.
pub enum Request {
    /// The literal ASCII line `PING`.
    Ping,
    /// A parsed Flow envelope.
    Flow(FlowEnvelope),
}

/// Parse a single line received from an agent connection.
///
/// Any parse failure is reported as `Err`, not a panic; the worker
/// replies with the original-sentinel and closes (§4.1 "Algorithm",
/// §7 "Protocol").
pub fn parse_line(line: &str) -> Result<Request, serde_json::Error> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed == "PING" {
        return Ok(Request::Ping);
    }
    let envelope: FlowEnvelope = serde_json::from_str(trimmed)?;
    Ok(Request::Flow(envelope))
}

/// Serialise a [`ModifiedResponse`] as a single wire line, including
/// the trailing newline.
pub fn encode_modified_response(response: &ModifiedResponse) -> String {
    let mut line = serde_json::to_string(response).unwrap_or_else(|_| "{}".to_string());
    line.push('\n');
    line
}
