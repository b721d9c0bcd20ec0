// SPDX-License-Identifier: MIT

use async_trait::async_trait;

/// Delivery path for automation streaming events (`terminal_exec_output`,
/// `terminal_exec_result`) and state-change notifications. Handler
/// registration rebinds this to the live connection's send path so events
/// always route over the current socket, even across reconnects
/// (spec.md §4.3).
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, payload: serde_json::Value);
}

/// Resolves `[exposed:<port>]` placeholders in a `wait_for` target against
/// the current exposure table (owned by `portacode-ingress`/C10). Kept as a
/// narrow trait here so `portacode-automation` does not depend on the
/// ingress crate.
pub trait ExposedPortResolver: Send + Sync {
    fn resolve(&self, port: u16) -> Option<String>;
}

pub struct NoExposedPorts;

impl ExposedPortResolver for NoExposedPorts {
    fn resolve(&self, _port: u16) -> Option<String> {
        None
    }
}
