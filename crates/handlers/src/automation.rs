// SPDX-License-Identifier: MIT

use crate::context::HandlerContext;
use crate::error::{classify, to_json};
use crate::traits::{AsyncHandler, HandlerResponse};
use async_trait::async_trait;
use portacode_automation::{Step, DEFAULT_STEP_TIMEOUT_SECONDS};
use portacode_core::RouterError;
use portacode_wire::CommandFrame;

pub struct AutomationV2StartHandler;

#[async_trait]
impl AsyncHandler for AutomationV2StartHandler {
    async fn handle(&self, ctx: &HandlerContext, frame: CommandFrame) -> Result<HandlerResponse, RouterError> {
        let CommandFrame::AutomationV2Start(p) = frame else {
            return Err(RouterError::validation("automation_v2_start handler received a different frame"));
        };
        if p.instructions.is_empty() {
            return Err(RouterError::validation("instructions must be a non-empty list"));
        }
        let steps: Vec<Step> =
            p.instructions.into_iter().map(|raw| Step::from_raw(raw.command, raw.wait_for, raw.timeout)).collect();
        let default_timeout = p.step_timeout_seconds.unwrap_or(DEFAULT_STEP_TIMEOUT_SECONDS);
        let task = ctx.automation.start(p.task_id, steps, default_timeout).await.map_err(classify)?;
        Ok(HandlerResponse::new("automation_v2_started", to_json(&task)?))
    }
}

pub struct AutomationV2StateHandler;

#[async_trait]
impl AsyncHandler for AutomationV2StateHandler {
    async fn handle(&self, ctx: &HandlerContext, frame: CommandFrame) -> Result<HandlerResponse, RouterError> {
        let CommandFrame::AutomationV2State(p) = frame else {
            return Err(RouterError::validation("automation_v2_state handler received a different frame"));
        };
        let task = ctx.automation.state(&p.task_id).await;
        Ok(HandlerResponse::new("automation_v2_state", to_json(&task)?))
    }
}

pub struct AutomationV2CancelHandler;

#[async_trait]
impl AsyncHandler for AutomationV2CancelHandler {
    async fn handle(&self, ctx: &HandlerContext, frame: CommandFrame) -> Result<HandlerResponse, RouterError> {
        let CommandFrame::AutomationV2Cancel(p) = frame else {
            return Err(RouterError::validation("automation_v2_cancel handler received a different frame"));
        };
        let task = ctx.automation.cancel(&p.task_id).await;
        Ok(HandlerResponse::new("automation_v2_cancelled", to_json(&task)?))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::context::{AlwaysConnected, NoOutbound, ProvisionerContext, RealProcess};
    use crate::terminal::TerminalRegistry;
    use portacode_provisioner::{NoProvisionerEvents, StorageKind};
    use portacode_wire::{AutomationStartPayload, AutomationStatePayload, CommandEnvelope, RawStep};
    use std::sync::Arc;

    pub(crate) async fn test_ctx(dir: &std::path::Path) -> HandlerContext {
        let automation = portacode_automation::AutomationRuntime::new(dir.join("automation.json")).await.unwrap();
        let ingress = Arc::new(portacode_ingress::IngressController::new(
            portacode_ingress::IngressConfig {
                domain: "example.com".into(),
                tunnel_id: "t".into(),
                tunnel_name: "n".into(),
                credentials_file: None,
                config_path: dir.join("cloudflared.yml"),
                rules_store_path: dir.join("rules.json"),
                leases_path: dir.join("leases"),
                service_name: "cloudflared".into(),
            },
            Arc::new(crate::tests_support::FixedMac),
            Box::new(crate::tests_support::NoopInit),
            Arc::new(portacode_ingress::NoExposurePropagation),
            Box::new(crate::tests_support::NoopDns),
        ));
        let tunnel = Arc::new(portacode_tunnel::TunnelSetup::new(dir.join("tunnel.json"), Arc::new(portacode_tunnel::NoTunnelEvents)));
        HandlerContext {
            automation,
            ingress,
            tunnel,
            provisioner: ProvisionerContext {
                node: "pve".into(),
                node_ram_mib: 8192,
                node_cpus: 8,
                bridge: "vmbr1".into(),
                interfaces_path: dir.join("interfaces"),
                credentials_path: dir.join("proxmox_infra.json"),
                containers_path: dir.join("containers.json"),
                base_url: "https://127.0.0.1:8006".into(),
                default_template: "local:vztmpl/debian-12.tar.zst".into(),
                default_storage: "local-lvm".into(),
                storage_kind: StorageKind::Lvm,
                sink: Arc::new(NoProvisionerEvents),
            },
            domain: "example.com".into(),
            started_at: chrono::Utc::now(),
            fingerprint: "ab:cd".into(),
            connection: Arc::new(AlwaysConnected),
            process: Arc::new(RealProcess),
            outbound: Arc::new(NoOutbound),
            terminals: TerminalRegistry::new(Arc::new(NoOutbound)),
        }
    }

    #[tokio::test]
    async fn start_then_state_round_trips_task_id() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;

        let start_frame = CommandFrame::AutomationV2Start(AutomationStartPayload {
            envelope: CommandEnvelope::default(),
            task_id: "t1".into(),
            instructions: vec![RawStep { command: Some("true".into()), wait_for: None, timeout: None }],
            step_timeout_seconds: None,
        });
        let response = AutomationV2StartHandler.handle(&ctx, start_frame).await.unwrap();
        assert_eq!(response.event, "automation_v2_started");
        assert_eq!(response.payload["task_id"], "t1");

        let state_frame = CommandFrame::AutomationV2State(AutomationStatePayload {
            envelope: CommandEnvelope::default(),
            task_id: "t1".into(),
        });
        let response = AutomationV2StateHandler.handle(&ctx, state_frame).await.unwrap();
        assert_eq!(response.payload["task_id"], "t1");
    }

    #[tokio::test]
    async fn start_rejects_empty_instructions() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;
        let frame = CommandFrame::AutomationV2Start(AutomationStartPayload {
            envelope: CommandEnvelope::default(),
            task_id: "t1".into(),
            instructions: vec![],
            step_timeout_seconds: None,
        });
        let err = AutomationV2StartHandler.handle(&ctx, frame).await.unwrap_err();
        assert_eq!(err.kind, portacode_core::ErrorKind::Validation);
    }
}
