// SPDX-License-Identifier: MIT

use crate::terminal::TerminalRegistry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portacode_automation::AutomationRuntime;
use portacode_ingress::IngressController;
use portacode_provisioner::{ProvisionerEventSink, StorageKind};
use portacode_tunnel::TunnelSetup;
use std::path::PathBuf;
use std::sync::Arc;

/// Reports whether the gateway connection is currently up, for `status`
/// (spec.md [HANDLERS]). Kept as a narrow trait so this crate never depends
/// on `portacode-daemon`'s connection supervisor.
pub trait ConnectionStatus: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// Always reports connected; used where no live supervisor is wired (tests,
/// or an agent run standalone without the daemon's connection loop).
pub struct AlwaysConnected;

impl ConnectionStatus for AlwaysConnected {
    fn is_connected(&self) -> bool {
        true
    }
}

/// Terminates the process. A seam so `update_portacode_cli`'s exit(42) is
/// exercised in tests without actually tearing down the test binary.
pub trait ProcessControl: Send + Sync {
    fn exit(&self, code: i32) -> !;
}

pub struct RealProcess;

impl ProcessControl for RealProcess {
    fn exit(&self, code: i32) -> ! {
        std::process::exit(code)
    }
}

/// Sends a handler-originated event frame immediately, bypassing the
/// request/response return path. Only `update_portacode_cli` needs this
/// (it must reply before it exits the process).
#[async_trait]
pub trait OutboundSink: Send + Sync {
    async fn send(&self, event: &str, payload: serde_json::Value);
}

pub struct NoOutbound;

#[async_trait]
impl OutboundSink for NoOutbound {
    async fn send(&self, _event: &str, _payload: serde_json::Value) {}
}

/// Fixed provisioning topology and well-known paths for the C8 handlers
/// (spec.md §4.6). One per agent process; the node is whichever hypervisor
/// host the agent itself runs on.
pub struct ProvisionerContext {
    pub node: String,
    pub node_ram_mib: u64,
    pub node_cpus: u32,
    pub bridge: String,
    pub interfaces_path: PathBuf,
    pub credentials_path: PathBuf,
    pub containers_path: PathBuf,
    pub base_url: String,
    pub default_template: String,
    pub default_storage: String,
    pub storage_kind: StorageKind,
    pub sink: Arc<dyn ProvisionerEventSink>,
}

impl ProvisionerContext {
    /// Path to the freshly-created container's device keypair, as seen
    /// from the host through the LXC rootfs mount -- the bootstrap
    /// pipeline's "wait for keypair" step polls this path.
    pub fn keypair_wait_path(&self, vmid: u32) -> PathBuf {
        PathBuf::from(format!("/var/lib/lxc/{vmid}/rootfs/root/.config/portacode/device_key.pem"))
    }
}

/// Everything a handler needs beyond its own decoded payload: the
/// long-lived subsystems (C6-C10) plus this agent's own identity
/// (spec.md §4.2's "handler context").
pub struct HandlerContext {
    pub automation: Arc<AutomationRuntime>,
    pub ingress: Arc<IngressController>,
    pub tunnel: Arc<TunnelSetup>,
    pub provisioner: ProvisionerContext,
    pub domain: String,
    pub started_at: DateTime<Utc>,
    pub fingerprint: String,
    pub connection: Arc<dyn ConnectionStatus>,
    pub process: Arc<dyn ProcessControl>,
    pub outbound: Arc<dyn OutboundSink>,
    pub terminals: TerminalRegistry,
}

impl HandlerContext {
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds().max(0)
    }
}
