// SPDX-License-Identifier: MIT

use crate::exec::{have, run_checked, HostOpsError};
use async_trait::async_trait;

/// Which init system `detect_init_system` found on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitSystemKind {
    Systemd,
    OpenRc,
}

/// A unit/service to install under whichever init system is present.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub description: String,
    pub exec_start: String,
    pub working_directory: Option<String>,
    pub after: Vec<String>,
}

/// Minimal interface over the two init systems this agent provisions
/// against (spec.md §4.8, §9): install a unit, enable it at boot,
/// (re)start it, and reload its config without restarting.
#[async_trait]
pub trait InitSystem: Send + Sync {
    fn kind(&self) -> InitSystemKind;
    async fn install(&self, spec: &ServiceSpec) -> Result<(), HostOpsError>;
    async fn enable(&self, name: &str) -> Result<(), HostOpsError>;
    async fn restart(&self, name: &str) -> Result<(), HostOpsError>;
    async fn reload(&self, name: &str) -> Result<(), HostOpsError>;
}

pub struct Systemd;

#[async_trait]
impl InitSystem for Systemd {
    fn kind(&self) -> InitSystemKind {
        InitSystemKind::Systemd
    }

    async fn install(&self, spec: &ServiceSpec) -> Result<(), HostOpsError> {
        let unit_path = format!("/etc/systemd/system/{}.service", spec.name);
        let mut unit = String::new();
        unit.push_str("[Unit]\n");
        unit.push_str(&format!("Description={}\n", spec.description));
        for dep in &spec.after {
            unit.push_str(&format!("After={dep}\n"));
        }
        unit.push_str("\n[Service]\n");
        unit.push_str(&format!("ExecStart={}\n", spec.exec_start));
        if let Some(dir) = &spec.working_directory {
            unit.push_str(&format!("WorkingDirectory={dir}\n"));
        }
        unit.push_str("Restart=on-failure\n");
        unit.push_str("\n[Install]\nWantedBy=multi-user.target\n");

        crate::fsops::write_text(std::path::Path::new(&unit_path), &unit, 0o644).await?;
        run_checked(&["systemctl", "daemon-reload"]).await?;
        Ok(())
    }

    async fn enable(&self, name: &str) -> Result<(), HostOpsError> {
        run_checked(&["systemctl", "enable", name]).await.map(|_| ())
    }

    async fn restart(&self, name: &str) -> Result<(), HostOpsError> {
        run_checked(&["systemctl", "restart", name]).await.map(|_| ())
    }

    async fn reload(&self, name: &str) -> Result<(), HostOpsError> {
        run_checked(&["systemctl", "reload", name]).await.map(|_| ())
    }
}

pub struct OpenRc;

#[async_trait]
impl InitSystem for OpenRc {
    fn kind(&self) -> InitSystemKind {
        InitSystemKind::OpenRc
    }

    async fn install(&self, spec: &ServiceSpec) -> Result<(), HostOpsError> {
        let script_path = format!("/etc/init.d/{}", spec.name);
        let mut script = String::new();
        script.push_str("#!/sbin/openrc-run\n\n");
        script.push_str(&format!("description=\"{}\"\n", spec.description));
        script.push_str(&format!("command=\"{}\"\n", first_token(&spec.exec_start)));
        script.push_str(&format!("command_args=\"{}\"\n", rest_tokens(&spec.exec_start)));
        if let Some(dir) = &spec.working_directory {
            script.push_str(&format!("directory=\"{dir}\"\n"));
        }
        script.push_str("command_background=\"yes\"\n");
        script.push_str("pidfile=\"/run/${RC_SVCNAME}.pid\"\n");
        script.push_str("\ndepend() {\n\tneed net\n}\n");

        crate::fsops::write_text(std::path::Path::new(&script_path), &script, 0o755).await?;
        Ok(())
    }

    async fn enable(&self, name: &str) -> Result<(), HostOpsError> {
        run_checked(&["rc-update", "add", name, "default"]).await.map(|_| ())
    }

    async fn restart(&self, name: &str) -> Result<(), HostOpsError> {
        run_checked(&["rc-service", name, "restart"]).await.map(|_| ())
    }

    async fn reload(&self, name: &str) -> Result<(), HostOpsError> {
        run_checked(&["rc-service", name, "reload"]).await.map(|_| ())
    }
}

fn first_token(s: &str) -> &str {
    s.split_whitespace().next().unwrap_or(s)
}

fn rest_tokens(s: &str) -> String {
    s.split_whitespace().skip(1).collect::<Vec<_>>().join(" ")
}

/// Probe the host for a supported init system. `systemctl` is preferred;
/// `openrc-run`'s presence is the OpenRC tell (Alpine and friends).
pub fn detect_init_system() -> Option<Box<dyn InitSystem>> {
    if have("systemctl") {
        Some(Box::new(Systemd))
    } else if have("rc-service") || have("openrc-run") {
        Some(Box::new(OpenRc))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_and_rest_tokens_split_exec_line() {
        assert_eq!(first_token("/usr/bin/portacode --daemon"), "/usr/bin/portacode");
        assert_eq!(rest_tokens("/usr/bin/portacode --daemon"), "--daemon");
    }
}
