// SPDX-License-Identifier: MIT

//! Client session addressing (spec §3, §9).
//!
//! The gateway demultiplexes responses to the originating client using an
//! opaque token it attaches to inbound command frames. The agent's only
//! job is to echo it back on the matching response — richer semantics are
//! explicitly not ours to invent (spec.md §9, Open Question).

use serde::{Deserialize, Serialize};

/// An opaque, gateway-originated correlator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientSession(pub String);

impl std::fmt::Display for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ClientSession {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClientSession {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
