// SPDX-License-Identifier: MIT

use crate::automation::{AutomationV2CancelHandler, AutomationV2StartHandler, AutomationV2StateHandler};
use crate::diff::ApplyDiffHandler;
use crate::fsops::{FsListHandler, FsReadHandler, FsWriteHandler};
use crate::ingress::{ConfigureCloudflareForwardingHandler, ConfigureProxmoxContainerExposePortsHandler};
use crate::provisioner::{CreateProxmoxContainerHandler, SetupProxmoxInfraHandler};
use crate::status::{StatusHandler, UpdatePortacodeCliHandler};
use crate::terminal::{TerminalCloseHandler, TerminalInputHandler, TerminalOpenHandler};
use crate::traits::RegisteredHandler;
use crate::tunnel::SetupCloudflareTunnelHandler;
use std::collections::HashMap;
use std::sync::Arc;

/// Every command name the agent understands, mapped to its handler. The
/// daemon's command router (C5) looks commands up here by the wire frame's
/// `command` tag (spec.md §4.2).
pub fn build_registry() -> HashMap<&'static str, RegisteredHandler> {
    let mut registry: HashMap<&'static str, RegisteredHandler> = HashMap::new();

    registry.insert("automation_v2_start", RegisteredHandler::Async(Box::new(AutomationV2StartHandler)));
    registry.insert("automation_v2_state", RegisteredHandler::Async(Box::new(AutomationV2StateHandler)));
    registry.insert("automation_v2_cancel", RegisteredHandler::Async(Box::new(AutomationV2CancelHandler)));
    registry.insert("configure_cloudflare_forwarding", RegisteredHandler::Async(Box::new(ConfigureCloudflareForwardingHandler)));
    registry.insert(
        "configure_proxmox_container_expose_ports",
        RegisteredHandler::Async(Box::new(ConfigureProxmoxContainerExposePortsHandler)),
    );
    registry.insert("setup_cloudflare_tunnel", RegisteredHandler::Async(Box::new(SetupCloudflareTunnelHandler)));
    registry.insert("setup_proxmox_infra", RegisteredHandler::Async(Box::new(SetupProxmoxInfraHandler)));
    registry.insert("create_proxmox_container", RegisteredHandler::Async(Box::new(CreateProxmoxContainerHandler)));
    registry.insert("update_portacode_cli", RegisteredHandler::Async(Box::new(UpdatePortacodeCliHandler)));
    registry.insert("fs_read", RegisteredHandler::Async(Box::new(FsReadHandler)));
    registry.insert("fs_list", RegisteredHandler::Async(Box::new(FsListHandler)));
    registry.insert("fs_write", RegisteredHandler::Async(Box::new(FsWriteHandler)));
    registry.insert("apply_diff", RegisteredHandler::Sync(Arc::new(ApplyDiffHandler)));
    registry.insert("terminal_open", RegisteredHandler::Async(Box::new(TerminalOpenHandler)));
    registry.insert("terminal_input", RegisteredHandler::Async(Box::new(TerminalInputHandler)));
    registry.insert("terminal_close", RegisteredHandler::Async(Box::new(TerminalCloseHandler)));
    registry.insert("status", RegisteredHandler::Async(Box::new(StatusHandler)));

    registry
}

/// The command name a frame carries, matching [`build_registry`]'s keys.
pub fn command_name(frame: &portacode_wire::CommandFrame) -> &'static str {
    use portacode_wire::CommandFrame::*;
    match frame {
        AutomationV2Start(_) => "automation_v2_start",
        AutomationV2State(_) => "automation_v2_state",
        AutomationV2Cancel(_) => "automation_v2_cancel",
        ConfigureCloudflareForwarding(_) => "configure_cloudflare_forwarding",
        ConfigureProxmoxContainerExposePorts(_) => "configure_proxmox_container_expose_ports",
        SetupCloudflareTunnel(_) => "setup_cloudflare_tunnel",
        SetupProxmoxInfra(_) => "setup_proxmox_infra",
        CreateProxmoxContainer(_) => "create_proxmox_container",
        UpdatePortacodeCli(_) => "update_portacode_cli",
        FsRead(_) => "fs_read",
        FsList(_) => "fs_list",
        FsWrite(_) => "fs_write",
        ApplyDiff(_) => "apply_diff",
        TerminalOpen(_) => "terminal_open",
        TerminalInput(_) => "terminal_input",
        TerminalClose(_) => "terminal_close",
        Status(_) => "status",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_every_command_name() {
        let registry = build_registry();
        for name in [
            "automation_v2_start",
            "automation_v2_state",
            "automation_v2_cancel",
            "configure_cloudflare_forwarding",
            "configure_proxmox_container_expose_ports",
            "setup_cloudflare_tunnel",
            "setup_proxmox_infra",
            "create_proxmox_container",
            "update_portacode_cli",
            "fs_read",
            "fs_list",
            "fs_write",
            "apply_diff",
            "terminal_open",
            "terminal_input",
            "terminal_close",
            "status",
        ] {
            assert!(registry.contains_key(name), "missing handler for {name}");
        }
    }
}
