// SPDX-License-Identifier: MIT

//! Environment-driven configuration (spec.md §6, §9's "global singletons
//! become an application-scoped service locator"). Centralizing env access
//! here means nothing else in this crate calls `std::env::var` directly.

use portacode_provisioner::StorageKind;
use portacode_storage::paths::{config_root, state_dir};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_GATEWAY_URL: &str = "wss://portacode.com/gateway";
const DEFAULT_RECONNECT_DELAY_SECS: f64 = 5.0;

/// Everything the agent needs to start, resolved once at process startup.
pub struct AgentConfig {
    pub gateway_url: String,
    pub reconnect_delay: Duration,
    pub domain: String,
    pub config_root: PathBuf,
    pub state_dir: PathBuf,
    pub provisioner_node: String,
    pub provisioner_node_ram_mib: u64,
    pub provisioner_node_cpus: u32,
    pub provisioner_bridge: String,
    pub provisioner_base_url: String,
    pub provisioner_default_template: String,
    pub provisioner_default_storage: String,
    pub provisioner_storage_kind: StorageKind,
}

impl AgentConfig {
    /// Resolve from the environment, applying `--gateway` if the caller
    /// parsed one off the command line (spec.md §6: `PORTACODE_GATEWAY`
    /// overrides the gateway URL; the CLI flag takes priority over that).
    pub fn resolve(gateway_override: Option<String>) -> Self {
        let gateway_url = gateway_override
            .or_else(|| std::env::var("PORTACODE_GATEWAY").ok())
            .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());

        let reconnect_delay = std::env::var("PORTACODE_RECONNECT_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs_f64(DEFAULT_RECONNECT_DELAY_SECS));

        let root = config_root();
        Self {
            gateway_url,
            reconnect_delay,
            domain: std::env::var("PORTACODE_DOMAIN").unwrap_or_else(|_| "portacode.dev".to_string()),
            config_root: root.clone(),
            state_dir: state_dir(),
            provisioner_node: std::env::var("PORTACODE_PVE_NODE").unwrap_or_else(|_| "pve".to_string()),
            provisioner_node_ram_mib: std::env::var("PORTACODE_PVE_NODE_RAM_MIB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8192),
            provisioner_node_cpus: std::env::var("PORTACODE_PVE_NODE_CPUS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8),
            provisioner_bridge: std::env::var("PORTACODE_PVE_BRIDGE").unwrap_or_else(|_| "vmbr1".to_string()),
            provisioner_base_url: std::env::var("PORTACODE_PVE_BASE_URL")
                .unwrap_or_else(|_| "https://127.0.0.1:8006".to_string()),
            provisioner_default_template: std::env::var("PORTACODE_PVE_TEMPLATE")
                .unwrap_or_else(|_| "local:vztmpl/debian-12-standard_12.7-1_amd64.tar.zst".to_string()),
            provisioner_default_storage: std::env::var("PORTACODE_PVE_STORAGE").unwrap_or_else(|_| "local-lvm".to_string()),
            provisioner_storage_kind: StorageKind::Lvm,
        }
    }

    pub fn pid_file_path(&self) -> PathBuf {
        self.state_dir.join("portacode_agent.pid")
    }

    pub fn tunnel_state_path(&self) -> PathBuf {
        self.config_root.join("cloudflare_tunnel.json")
    }

    pub fn forwarding_rules_path(&self) -> PathBuf {
        self.config_root.join("cloudflare_forwarding.json")
    }

    pub fn infra_credentials_path(&self) -> PathBuf {
        self.config_root.join("proxmox_infra.json")
    }

    pub fn containers_path(&self) -> PathBuf {
        self.config_root.join("containers").join("ct.json")
    }

    pub fn automation_state_path(&self) -> PathBuf {
        self.state_dir.join("portacode_automation_v2_state.json")
    }

    pub fn leases_path(&self) -> PathBuf {
        portacode_ingress::DEFAULT_LEASES_PATH.into()
    }

    pub fn cloudflared_config_path(&self) -> PathBuf {
        self.config_root.join("cloudflared.yml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial(portacode_gateway_env)]
    fn cli_flag_wins_over_env_var() {
        std::env::set_var("PORTACODE_GATEWAY", "wss://env.example/gateway");
        let cfg = AgentConfig::resolve(Some("wss://flag.example/gateway".to_string()));
        assert_eq!(cfg.gateway_url, "wss://flag.example/gateway");
        std::env::remove_var("PORTACODE_GATEWAY");
    }

    #[test]
    #[serial_test::serial(portacode_gateway_env)]
    fn falls_back_to_hardcoded_default() {
        std::env::remove_var("PORTACODE_GATEWAY");
        let cfg = AgentConfig::resolve(None);
        assert_eq!(cfg.gateway_url, DEFAULT_GATEWAY_URL);
    }
}
