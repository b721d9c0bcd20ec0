// SPDX-License-Identifier: MIT

use crate::context::HandlerContext;
use crate::error::{classify, to_json};
use crate::traits::{AsyncHandler, HandlerResponse};
use async_trait::async_trait;
use portacode_core::RouterError;
use portacode_ingress::ForwardingRule;
use portacode_wire::{CommandFrame, ForwardingRuleDto};

pub struct ConfigureCloudflareForwardingHandler;

#[async_trait]
impl AsyncHandler for ConfigureCloudflareForwardingHandler {
    async fn handle(&self, ctx: &HandlerContext, frame: CommandFrame) -> Result<HandlerResponse, RouterError> {
        let CommandFrame::ConfigureCloudflareForwarding(p) = frame else {
            return Err(RouterError::validation("configure_cloudflare_forwarding handler received a different frame"));
        };
        let rules = p.rules.map(|list| {
            list.into_iter().map(|r| ForwardingRule { hostname: r.hostname, destination: r.destination }).collect()
        });
        let applied = ctx.ingress.configure_forwarding(rules).await.map_err(classify)?;
        let dtos: Vec<ForwardingRuleDto> =
            applied.into_iter().map(|r| ForwardingRuleDto { hostname: r.hostname, destination: r.destination }).collect();
        Ok(HandlerResponse::new(
            "cloudflare_forwarding_configured",
            to_json(&serde_json::json!({ "device_id": p.device_id, "rules": dtos }))?,
        ))
    }
}

pub struct ConfigureProxmoxContainerExposePortsHandler;

#[async_trait]
impl AsyncHandler for ConfigureProxmoxContainerExposePortsHandler {
    async fn handle(&self, ctx: &HandlerContext, frame: CommandFrame) -> Result<HandlerResponse, RouterError> {
        let CommandFrame::ConfigureProxmoxContainerExposePorts(p) = frame else {
            return Err(RouterError::validation(
                "configure_proxmox_container_expose_ports handler received a different frame",
            ));
        };
        let rules = ctx.ingress.configure_expose_ports(&p.child_device_id, p.expose_ports).await.map_err(classify)?;
        let dtos: Vec<ForwardingRuleDto> =
            rules.into_iter().map(|r| ForwardingRuleDto { hostname: r.hostname, destination: r.destination }).collect();
        Ok(HandlerResponse::new(
            "proxmox_container_expose_ports_configured",
            to_json(&serde_json::json!({ "child_device_id": p.child_device_id, "rules": dtos }))?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::tests::test_ctx;
    use portacode_wire::CommandEnvelope;

    #[tokio::test]
    async fn expose_ports_handler_returns_computed_hostnames() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;
        let frame = CommandFrame::ConfigureProxmoxContainerExposePorts(portacode_wire::ExposePortsPayload {
            envelope: CommandEnvelope::default(),
            child_device_id: "42".into(),
            expose_ports: vec![3000, 8080],
        });
        let response = ConfigureProxmoxContainerExposePortsHandler.handle(&ctx, frame).await.unwrap();
        let rules = response.payload["rules"].as_array().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0]["hostname"], "42.example.com");
        assert_eq!(rules[1]["hostname"], "1_42.example.com");
    }
}
