// SPDX-License-Identifier: MIT

use chrono::{DateTime, Utc};
use portacode_hostops::is_root;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Persisted at `<cfg>/portacode/cloudflare_tunnel.json`, 0600
/// (spec.md §6 persisted file layout).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TunnelState {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub tunnel_name: Option<String>,
    #[serde(default)]
    pub tunnel_id: Option<String>,
    #[serde(default)]
    pub tunnel_existed: bool,
    #[serde(default)]
    pub credentials_file: Option<String>,
    #[serde(default)]
    pub config_path: Option<String>,
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub cloudflared_version: Option<String>,
    #[serde(default)]
    pub service_installed: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// `/etc/cloudflared/config.yml` for root, `~/.cloudflared/config.yml`
/// otherwise.
pub fn default_config_path() -> PathBuf {
    if is_root() {
        PathBuf::from("/etc/cloudflared/config.yml")
    } else {
        cloudflared_home().join("config.yml")
    }
}

pub fn credentials_path_for_tunnel(tunnel_id: &str) -> PathBuf {
    cloudflared_home().join(format!("{tunnel_id}.json"))
}

pub fn default_cert_path() -> PathBuf {
    cloudflared_home().join("cert.pem")
}

pub(crate) fn token_path() -> PathBuf {
    cloudflared_home().join("token")
}

/// The launch wrapper installed as the service's `exec_start` (spec.md
/// §4.7 step 5): exports the stored token into the environment before
/// handing off to `cloudflared`, so a token-only (no credentials-file)
/// tunnel still has its token at runtime.
pub(crate) fn wrapper_script_path() -> PathBuf {
    if is_root() {
        PathBuf::from("/usr/local/bin/portacode-cloudflared-launch.sh")
    } else {
        cloudflared_home().join("launch.sh")
    }
}

fn cloudflared_home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root")).join(".cloudflared")
}

/// Sanitize a device id into the tunnel name `portacode-proxmox-<id>`,
/// matching `CloudflareTunnelSetupHandler`'s naming scheme.
pub fn tunnel_name_for_device(device_id: &str) -> String {
    let normalized: String = device_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    format!("portacode-proxmox-{normalized}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunnel_name_sanitizes_non_alphanumeric() {
        assert_eq!(tunnel_name_for_device("dev 42!"), "portacode-proxmox-dev-42-");
    }

    #[test]
    fn credentials_path_is_under_cloudflared_home() {
        let path = credentials_path_for_tunnel("abc-123");
        assert!(path.ends_with("abc-123.json"));
    }
}
