// SPDX-License-Identifier: MIT

//! Command router (C5, spec.md §4.2): decode a raw inbound frame, look up
//! the handler by command name, dispatch, and build the outbound response
//! frame. The router never serializes handler execution -- each frame is
//! handed off independently by the connection supervisor's `tokio::spawn`.

use portacode_core::RouterError;
use portacode_handlers::{build_registry, command_name, HandlerContext, HandlerResponse, RegisteredHandler};
use portacode_wire::{parse_request_id, CommandFrame};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::warn;

fn registry() -> &'static HashMap<&'static str, RegisteredHandler> {
    static REGISTRY: OnceLock<HashMap<&'static str, RegisteredHandler>> = OnceLock::new();
    REGISTRY.get_or_init(build_registry)
}

/// Decode `raw` and dispatch it to the matching handler, returning the
/// serialized response/error frame to send back, if any dispatch attempt
/// was made (decoding never fails to produce a frame -- it always returns
/// `Some`, matching spec.md §4.2's "never close the connection").
pub async fn dispatch_frame(ctx: &Arc<HandlerContext>, raw: &str) -> Option<String> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "received malformed frame, ignoring");
            return None;
        }
    };

    let request_id = parse_request_id(&value);

    let frame: CommandFrame = match serde_json::from_value(value.clone()) {
        Ok(frame) => frame,
        Err(_) => {
            let command = value.get("command").and_then(|v| v.as_str()).unwrap_or("<unknown>");
            let err = RouterError::validation(format!("unrecognized or malformed command: {command}"));
            return Some(error_frame(err, request_id));
        }
    };

    let source_session = frame.envelope().source_client_session.clone();
    let request_id = frame.envelope().request_id.clone().or(request_id);
    let name = command_name(&frame);

    let Some(handler) = registry().get(name) else {
        let err = RouterError::validation(format!("unknown command: {name}"));
        return Some(error_frame(err, request_id));
    };

    match handler.dispatch(Arc::clone(ctx), frame).await {
        Ok(response) => Some(success_frame(response, request_id, source_session)),
        Err(err) => Some(error_frame(err, request_id)),
    }
}

fn success_frame(response: HandlerResponse, request_id: Option<String>, source_session: Option<String>) -> String {
    let mut frame = serde_json::json!({ "event": response.event });
    merge(&mut frame, response.payload);
    if let Some(id) = request_id {
        frame["request_id"] = serde_json::Value::String(id);
    }
    if let Some(session) = source_session {
        frame["client_sessions"] = serde_json::json!([session]);
    }
    frame.to_string()
}

fn error_frame(err: RouterError, request_id: Option<String>) -> String {
    let mut frame = serde_json::json!({ "event": "error", "error": err.message, "success": false, "kind": err.kind.to_string() });
    if let Some(id) = request_id {
        frame["request_id"] = serde_json::Value::String(id);
    }
    frame.to_string()
}

fn merge(target: &mut serde_json::Value, payload: serde_json::Value) {
    if let (Some(target), Some(payload)) = (target.as_object_mut(), payload.as_object()) {
        for (k, v) in payload {
            target.insert(k.clone(), v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portacode_handlers::{AlwaysConnected, NoOutbound, ProcessControl, ProvisionerContext, RealProcess};
    use portacode_provisioner::{NoProvisionerEvents, StorageKind};

    async fn test_ctx(dir: &std::path::Path) -> Arc<HandlerContext> {
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
            Arc::new(NoopResolver),
            Box::new(NoopInit),
            Arc::new(portacode_ingress::NoExposurePropagation),
            Box::new(NoopDns),
        ));
        let tunnel = Arc::new(portacode_tunnel::TunnelSetup::new(dir.join("tunnel.json"), Arc::new(portacode_tunnel::NoTunnelEvents)));
        Arc::new(HandlerContext {
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
            terminals: portacode_handlers::TerminalRegistry::new(Arc::new(NoOutbound)),
        })
    }

    struct NoopResolver;
    impl portacode_ingress::DeviceNetworkResolver for NoopResolver {
        fn mac_for_device(&self, _device_id: &str) -> Option<String> {
            None
        }
    }

    struct NoopInit;
    #[async_trait::async_trait]
    impl portacode_hostops::InitSystem for NoopInit {
        fn kind(&self) -> portacode_hostops::InitSystemKind {
            portacode_hostops::InitSystemKind::Systemd
        }
        async fn install(&self, _spec: &portacode_hostops::ServiceSpec) -> Result<(), portacode_hostops::HostOpsError> {
            Ok(())
        }
        async fn enable(&self, _name: &str) -> Result<(), portacode_hostops::HostOpsError> {
            Ok(())
        }
        async fn restart(&self, _name: &str) -> Result<(), portacode_hostops::HostOpsError> {
            Ok(())
        }
        async fn reload(&self, _name: &str) -> Result<(), portacode_hostops::HostOpsError> {
            Ok(())
        }
    }

    struct NoopDns;
    #[async_trait::async_trait]
    impl portacode_ingress::DnsRegistrar for NoopDns {
        async fn register(&self, _tunnel_name: &str, _hostname: &str) -> Result<(), portacode_ingress::IngressError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn unknown_command_yields_error_frame_with_request_id() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;
        let raw = r#"{"command":"does_not_exist","request_id":"r1"}"#;
        let reply = dispatch_frame(&ctx, raw).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(parsed["event"], "error");
        assert_eq!(parsed["request_id"], "r1");
    }

    #[tokio::test]
    async fn status_command_round_trips_request_id_and_client_session() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;
        let raw = r#"{"command":"status","request_id":"r2","source_client_session":"s1"}"#;
        let reply = dispatch_frame(&ctx, raw).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(parsed["event"], "status_response");
        assert_eq!(parsed["request_id"], "r2");
        assert_eq!(parsed["client_sessions"], serde_json::json!(["s1"]));
    }

    #[tokio::test]
    async fn malformed_json_is_dropped_without_a_reply() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;
        assert!(dispatch_frame(&ctx, "not json").await.is_none());
    }
}
