// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fields every inbound command carries, regardless of which command it is
/// (spec.md §6). Flattened into each [`crate::CommandFrame`] variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CommandEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_client_session: Option<String>,
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed command frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

/// Best-effort extraction of `request_id` from a raw frame, used when full
/// deserialization into [`crate::CommandFrame`] fails (unknown command name,
/// or a malformed payload) so the error response can still echo it back.
pub fn parse_request_id(raw: &serde_json::Value) -> Option<String> {
    raw.get("request_id").and_then(|v| v.as_str()).map(str::to_owned)
}
