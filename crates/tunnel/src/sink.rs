// SPDX-License-Identifier: MIT

use async_trait::async_trait;

/// Delivery path for interim tunnel-setup events (`cloudflare_tunnel_login`
/// carrying the login URL). Mirrors `portacode_automation::EventSink`.
#[async_trait]
pub trait TunnelEventSink: Send + Sync {
    async fn send(&self, payload: serde_json::Value);
}

pub struct NoTunnelEvents;

#[async_trait]
impl TunnelEventSink for NoTunnelEvents {
    async fn send(&self, _payload: serde_json::Value) {}
}
