// SPDX-License-Identifier: MIT

use crate::envelope::CommandEnvelope;
use serde::{Deserialize, Serialize};

/// A single automation instruction as received on the wire: either a shell
/// step (`command`) or an HTTP readiness probe (`wait_for`). Kept as a raw,
/// loosely-typed DTO here -- `portacode-automation` classifies and validates
/// it into its own `Step` domain type at the handler boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForwardingRuleDto {
    pub hostname: String,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutomationStartPayload {
    #[serde(flatten)]
    pub envelope: CommandEnvelope,
    pub task_id: String,
    pub instructions: Vec<RawStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_timeout_seconds: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutomationStatePayload {
    #[serde(flatten)]
    pub envelope: CommandEnvelope,
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutomationCancelPayload {
    #[serde(flatten)]
    pub envelope: CommandEnvelope,
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigureForwardingPayload {
    #[serde(flatten)]
    pub envelope: CommandEnvelope,
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<ForwardingRuleDto>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExposePortsPayload {
    #[serde(flatten)]
    pub envelope: CommandEnvelope,
    pub child_device_id: String,
    pub expose_ports: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetupTunnelPayload {
    #[serde(flatten)]
    pub envelope: CommandEnvelope,
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetupInfraPayload {
    #[serde(flatten)]
    pub envelope: CommandEnvelope,
    pub token_identifier: String,
    pub token_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_ssl: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateContainerPayload {
    #[serde(flatten)]
    pub envelope: CommandEnvelope,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub disk_gib: Option<u32>,
    #[serde(default)]
    pub ram_mib: Option<u32>,
    #[serde(default)]
    pub cpus: Option<u32>,
    #[serde(default)]
    pub storage: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ssh_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FsReadPayload {
    #[serde(flatten)]
    pub envelope: CommandEnvelope,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FsListPayload {
    #[serde(flatten)]
    pub envelope: CommandEnvelope,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FsWritePayload {
    #[serde(flatten)]
    pub envelope: CommandEnvelope,
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplyDiffPayload {
    #[serde(flatten)]
    pub envelope: CommandEnvelope,
    pub path: String,
    pub diff: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TerminalOpenPayload {
    #[serde(flatten)]
    pub envelope: CommandEnvelope,
    pub terminal_id: String,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TerminalInputPayload {
    #[serde(flatten)]
    pub envelope: CommandEnvelope,
    pub terminal_id: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TerminalClosePayload {
    #[serde(flatten)]
    pub envelope: CommandEnvelope,
    pub terminal_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusPayload {
    #[serde(flatten)]
    pub envelope: CommandEnvelope,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateCliPayload {
    #[serde(flatten)]
    pub envelope: CommandEnvelope,
}

/// Inbound command frame, dispatched on the `command` field (spec.md §9
/// design note). Unrecognized command names fail to deserialize into this
/// enum entirely; callers fall back to [`crate::parse_request_id`] on the
/// raw JSON to still echo `request_id` in the error response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command")]
pub enum CommandFrame {
    #[serde(rename = "automation_v2_start")]
    AutomationV2Start(AutomationStartPayload),
    #[serde(rename = "automation_v2_state")]
    AutomationV2State(AutomationStatePayload),
    #[serde(rename = "automation_v2_cancel")]
    AutomationV2Cancel(AutomationCancelPayload),
    #[serde(rename = "configure_cloudflare_forwarding")]
    ConfigureCloudflareForwarding(ConfigureForwardingPayload),
    #[serde(rename = "configure_proxmox_container_expose_ports")]
    ConfigureProxmoxContainerExposePorts(ExposePortsPayload),
    #[serde(rename = "setup_cloudflare_tunnel")]
    SetupCloudflareTunnel(SetupTunnelPayload),
    #[serde(rename = "setup_proxmox_infra")]
    SetupProxmoxInfra(SetupInfraPayload),
    #[serde(rename = "create_proxmox_container")]
    CreateProxmoxContainer(CreateContainerPayload),
    #[serde(rename = "update_portacode_cli")]
    UpdatePortacodeCli(UpdateCliPayload),
    #[serde(rename = "fs_read")]
    FsRead(FsReadPayload),
    #[serde(rename = "fs_list")]
    FsList(FsListPayload),
    #[serde(rename = "fs_write")]
    FsWrite(FsWritePayload),
    #[serde(rename = "apply_diff")]
    ApplyDiff(ApplyDiffPayload),
    #[serde(rename = "terminal_open")]
    TerminalOpen(TerminalOpenPayload),
    #[serde(rename = "terminal_input")]
    TerminalInput(TerminalInputPayload),
    #[serde(rename = "terminal_close")]
    TerminalClose(TerminalClosePayload),
    #[serde(rename = "status")]
    Status(StatusPayload),
}

impl CommandFrame {
    /// The envelope shared by every variant, for request_id/session routing.
    pub fn envelope(&self) -> &CommandEnvelope {
        match self {
            CommandFrame::AutomationV2Start(p) => &p.envelope,
            CommandFrame::AutomationV2State(p) => &p.envelope,
            CommandFrame::AutomationV2Cancel(p) => &p.envelope,
            CommandFrame::ConfigureCloudflareForwarding(p) => &p.envelope,
            CommandFrame::ConfigureProxmoxContainerExposePorts(p) => &p.envelope,
            CommandFrame::SetupCloudflareTunnel(p) => &p.envelope,
            CommandFrame::SetupProxmoxInfra(p) => &p.envelope,
            CommandFrame::CreateProxmoxContainer(p) => &p.envelope,
            CommandFrame::UpdatePortacodeCli(p) => &p.envelope,
            CommandFrame::FsRead(p) => &p.envelope,
            CommandFrame::FsList(p) => &p.envelope,
            CommandFrame::FsWrite(p) => &p.envelope,
            CommandFrame::ApplyDiff(p) => &p.envelope,
            CommandFrame::TerminalOpen(p) => &p.envelope,
            CommandFrame::TerminalInput(p) => &p.envelope,
            CommandFrame::TerminalClose(p) => &p.envelope,
            CommandFrame::Status(p) => &p.envelope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn automation_start_round_trips_through_json() {
        let raw = serde_json::json!({
            "command": "automation_v2_start",
            "request_id": "r1",
            "task_id": "t1",
            "instructions": [{"command": "echo hi"}],
            "step_timeout_seconds": 10.0,
        });
        let frame: CommandFrame = serde_json::from_value(raw).unwrap();
        match &frame {
            CommandFrame::AutomationV2Start(p) => {
                assert_eq!(p.task_id, "t1");
                assert_eq!(p.instructions.len(), 1);
                assert_eq!(p.envelope.request_id.as_deref(), Some("r1"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_command_fails_to_parse() {
        let raw = serde_json::json!({"command": "does_not_exist", "request_id": "r2"});
        let result: Result<CommandFrame, _> = serde_json::from_value(raw);
        assert!(result.is_err());
    }

    #[test]
    fn wait_for_step_parses_without_command_field() {
        let raw = serde_json::json!({"wait_for": "http://127.0.0.1/health", "timeout": 5.0});
        let step: RawStep = serde_json::from_value(raw).unwrap();
        assert!(step.command.is_none());
        assert_eq!(step.wait_for.as_deref(), Some("http://127.0.0.1/health"));
    }
}
