// SPDX-License-Identifier: MIT

use crate::context::HandlerContext;
use crate::error::{classify, to_json};
use crate::traits::{AsyncHandler, HandlerResponse};
use async_trait::async_trait;
use portacode_core::RouterError;
use portacode_tunnel::TunnelSetupRequest;
use portacode_wire::CommandFrame;
use std::time::Duration;

const DEFAULT_LOGIN_TIMEOUT_SECONDS: u64 = 120;

pub struct SetupCloudflareTunnelHandler;

#[async_trait]
impl AsyncHandler for SetupCloudflareTunnelHandler {
    async fn handle(&self, ctx: &HandlerContext, frame: CommandFrame) -> Result<HandlerResponse, RouterError> {
        let CommandFrame::SetupCloudflareTunnel(p) = frame else {
            return Err(RouterError::validation("setup_cloudflare_tunnel handler received a different frame"));
        };
        let timeout = Duration::from_secs(p.timeout.unwrap_or(DEFAULT_LOGIN_TIMEOUT_SECONDS));
        let request = TunnelSetupRequest { device_id: p.device_id, domain: ctx.domain.clone(), timeout };
        let state = ctx.tunnel.run(request).await.map_err(classify)?;
        Ok(HandlerResponse::new("cloudflare_tunnel_configured", to_json(&state)?))
    }
}
