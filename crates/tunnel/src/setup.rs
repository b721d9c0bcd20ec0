// SPDX-License-Identifier: MIT

use crate::error::TunnelError;
use crate::login::{poll_cert_file, scrape_login_url};
use crate::sink::TunnelEventSink;
use crate::state::{
    credentials_path_for_tunnel, default_cert_path, default_config_path, token_path, tunnel_name_for_device,
    wrapper_script_path, TunnelState,
};
use portacode_hostops::{detect_init_system, have, run, write_text, InitSystem, ServiceSpec};
use portacode_storage::AtomicJsonStore;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

pub struct TunnelSetupRequest {
    pub device_id: String,
    pub domain: String,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct CliTunnel {
    id: String,
    name: String,
}

/// Ensures a named edge tunnel exists, end-to-end (spec.md §4.7, C9).
pub struct TunnelSetup {
    state_path: PathBuf,
    event_sink: Arc<dyn TunnelEventSink>,
}

impl TunnelSetup {
    pub fn new(state_path: impl Into<PathBuf>, event_sink: Arc<dyn TunnelEventSink>) -> Self {
        Self { state_path: state_path.into(), event_sink }
    }

    pub async fn run(&self, req: TunnelSetupRequest) -> Result<TunnelState, TunnelError> {
        let tunnel_name = tunnel_name_for_device(&req.device_id);
        let store: AtomicJsonStore<TunnelState> = AtomicJsonStore::new(&self.state_path, 0o600);

        self.ensure_cli_installed().await?;
        let cloudflared_version = self.query_version().await;

        let cert_path = default_cert_path();
        if !cert_file_present(&cert_path).await {
            self.run_login_flow(&cert_path, req.timeout).await?;
        }

        let (tunnel_id, tunnel_existed) = self.find_or_create_tunnel(&tunnel_name).await?;

        let credentials_path = credentials_path_for_tunnel(&tunnel_id);
        let credentials_file = if tokio::fs::metadata(&credentials_path).await.is_ok() {
            Some(credentials_path.to_string_lossy().into_owned())
        } else {
            self.fetch_and_store_token(&tunnel_id).await?;
            None
        };

        let config_path = default_config_path();
        self.write_minimal_config(&config_path, &tunnel_id, credentials_file.as_deref()).await?;

        let service_installed = self.install_service(&config_path).await.is_ok();

        let state = TunnelState {
            connected: true,
            domain: Some(req.domain),
            tunnel_name: Some(tunnel_name),
            tunnel_id: Some(tunnel_id),
            tunnel_existed,
            credentials_file,
            config_path: Some(config_path.to_string_lossy().into_owned()),
            cert_path: Some(cert_path.to_string_lossy().into_owned()),
            cloudflared_version,
            service_installed,
            updated_at: Some(chrono::Utc::now()),
        };
        store.save(&state)?;
        Ok(state)
    }

    async fn ensure_cli_installed(&self) -> Result<(), TunnelError> {
        if have("cloudflared") {
            return Ok(());
        }
        info!("edge CLI not found, attempting package-manager install");
        if have("apt-get") {
            let _ = run(&["apt-get", "install", "-y", "cloudflared"]).await;
        } else if have("yum") {
            let _ = run(&["yum", "install", "-y", "cloudflared"]).await;
        }
        if have("cloudflared") {
            return Ok(());
        }
        warn!("falling back to downloading a static cloudflared binary");
        let arch = std::env::consts::ARCH;
        let url = format!("https://github.com/cloudflare/cloudflared/releases/latest/download/cloudflared-linux-{arch}");
        let _ = run(&["curl", "-fsSL", "-o", "/usr/local/bin/cloudflared", &url]).await;
        let _ = run(&["chmod", "+x", "/usr/local/bin/cloudflared"]).await;
        if have("cloudflared") {
            Ok(())
        } else {
            Err(TunnelError::CliUnavailable)
        }
    }

    async fn query_version(&self) -> Option<String> {
        let output = run(&["cloudflared", "--version"]).await.ok()?;
        output.stdout.split_whitespace().nth(2).map(|s| s.to_string())
    }

    async fn run_login_flow(&self, cert_path: &std::path::Path, timeout: Duration) -> Result<(), TunnelError> {
        let mut child = Command::new("cloudflared")
            .arg("tunnel")
            .arg("login")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdout = child.stdout.take().expect("piped stdout");
        let mut stderr = child.stderr.take().expect("piped stderr");
        let mut merged = String::new();

        use tokio::io::AsyncReadExt;
        let read_timeout = Duration::from_secs(10);
        let _ = tokio::time::timeout(read_timeout, stdout.read_to_string(&mut merged)).await;
        let mut stderr_buf = String::new();
        let _ = tokio::time::timeout(read_timeout, stderr.read_to_string(&mut stderr_buf)).await;
        merged.push_str(&stderr_buf);

        if let Some(url) = scrape_login_url(&merged) {
            self.event_sink.send(json!({ "event": "cloudflare_tunnel_login", "login_url": url })).await;
        }

        let cert_wait = poll_cert_file(cert_path, timeout).await;
        let _ = child.kill().await;
        cert_wait
    }

    async fn find_or_create_tunnel(&self, tunnel_name: &str) -> Result<(String, bool), TunnelError> {
        let list_output = run(&["cloudflared", "tunnel", "list", "--output", "json"]).await?;
        let tunnels: Vec<CliTunnel> = serde_json::from_str(&list_output.stdout).unwrap_or_default();
        if let Some(existing) = tunnels.into_iter().find(|t| t.name == tunnel_name) {
            return Ok((existing.id, true));
        }

        let create_output =
            run(&["cloudflared", "tunnel", "create", "--output", "json", tunnel_name]).await?;
        if !create_output.success() {
            return Err(TunnelError::MalformedOutput(create_output.stderr));
        }
        let created: CliTunnel = serde_json::from_str(&create_output.stdout)
            .map_err(|e| TunnelError::MalformedOutput(e.to_string()))?;
        Ok((created.id, false))
    }

    async fn fetch_and_store_token(&self, tunnel_id: &str) -> Result<(), TunnelError> {
        let output = run(&["cloudflared", "tunnel", "token", tunnel_id]).await?;
        let token_path = crate::state::token_path();
        write_text(&token_path, output.stdout.trim(), 0o600).await?;
        Ok(())
    }

    async fn write_minimal_config(
        &self,
        config_path: &std::path::Path,
        tunnel_id: &str,
        credentials_file: Option<&str>,
    ) -> Result<(), TunnelError> {
        let mut body = format!("tunnel: {tunnel_id}\n");
        if let Some(path) = credentials_file {
            body.push_str(&format!("credentials-file: {path}\n"));
        }
        body.push_str("ingress:\n  - service: http_status:404\n");
        write_text(config_path, &body, 0o600).await?;
        Ok(())
    }

    async fn install_service(&self, config_path: &std::path::Path) -> Result<(), TunnelError> {
        let Some(init) = detect_init_system() else { return Err(TunnelError::CliUnavailable) };
        let wrapper_path = self.write_launch_wrapper(config_path).await?;
        let spec = ServiceSpec {
            name: "cloudflared".into(),
            description: "Cloudflare Tunnel client".into(),
            exec_start: wrapper_path.to_string_lossy().into_owned(),
            working_directory: None,
            after: vec!["network-online.target".into()],
        };
        init.install(&spec).await?;
        init.enable("cloudflared").await?;
        init.restart("cloudflared").await?;
        Ok(())
    }

    /// Writes the service's actual `exec_start` target: a wrapper that
    /// exports `TUNNEL_TOKEN` from the stored token file, if any, before
    /// exec'ing `cloudflared` (spec.md §4.7 step 5).
    async fn write_launch_wrapper(&self, config_path: &std::path::Path) -> Result<PathBuf, TunnelError> {
        let wrapper_path = wrapper_script_path();
        let token_path = token_path();
        let body = format!(
            "#!/bin/sh\nif [ -f \"{token}\" ]; then\n  export TUNNEL_TOKEN=\"$(cat \"{token}\")\"\nfi\nexec /usr/local/bin/cloudflared tunnel --config {config} run\n",
            token = token_path.display(),
            config = config_path.display(),
        );
        write_text(&wrapper_path, &body, 0o755).await?;
        Ok(wrapper_path)
    }
}

async fn cert_file_present(path: &std::path::Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.len() > 0).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_query_extracts_the_version_token() {
        let stdout = "cloudflared version 2024.1.0 (built 2024-01-01)";
        let version = stdout.split_whitespace().nth(2).map(|s| s.to_string());
        assert_eq!(version.as_deref(), Some("2024.1.0"));
    }
}
