// SPDX-License-Identifier: MIT

use crate::error::ProvisionerError;
use portacode_hostops::{run_checked, write_text, InitSystem, ServiceSpec};
use std::path::Path;

pub const DEFAULT_BRIDGE: &str = "vmbr1";
pub const SUBNET_CIDR: &str = "10.10.0.1/24";
pub const DHCP_START: &str = "10.10.0.100";
pub const DHCP_END: &str = "10.10.0.200";
pub const DNS_SERVER: &str = "1.1.1.1";
pub const MANAGED_MARKER: &str = "portacode-managed:true";

/// The bridge's own address, derived from [`SUBNET_CIDR`].
pub fn bridge_ip() -> &'static str {
    "10.10.0.1"
}

fn begin_marker(bridge: &str) -> String {
    format!("# Portacode INFRA BEGIN {bridge}")
}

fn end_marker(bridge: &str) -> String {
    format!("# Portacode INFRA END {bridge}")
}

/// Render the `/etc/network/interfaces` stanza for `bridge`, delimited by
/// BEGIN/END markers so re-running is idempotent (upsert_block strips any
/// prior block with the same markers before appending).
pub fn render_bridge_stanza(bridge: &str) -> String {
    format!(
        "{}\nauto {bridge}\niface {bridge} inet static\n    address {}\n    bridge-ports none\n    bridge-stp off\n    bridge-fd 0\n{}\n",
        begin_marker(bridge),
        SUBNET_CIDR,
        end_marker(bridge),
    )
}

/// Strip any existing `[BEGIN marker, END marker]` block from `existing` and
/// append a fresh one built from `new_block` (spec.md §4.5/§4.6 idempotent
/// upsert pattern, shared by network config and exposure injection).
pub fn upsert_block(existing: &str, begin: &str, end: &str, new_block: &str) -> String {
    let stripped = strip_block(existing, begin, end);
    let mut out = stripped.trim_end().to_string();
    if !out.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str(new_block);
    out
}

fn strip_block(existing: &str, begin: &str, end: &str) -> String {
    let Some(begin_idx) = existing.find(begin) else { return existing.to_string() };
    let Some(end_idx) = existing[begin_idx..].find(end).map(|i| begin_idx + i + end.len()) else {
        return existing.to_string();
    };
    let mut out = existing[..begin_idx].to_string();
    out.push_str(&existing[end_idx..]);
    out
}

pub async fn write_bridge_config(interfaces_path: &Path, bridge: &str) -> Result<(), ProvisionerError> {
    let existing = tokio::fs::read_to_string(interfaces_path).await.unwrap_or_default();
    let stanza = render_bridge_stanza(bridge);
    let updated = upsert_block(&existing, &begin_marker(bridge), &end_marker(bridge), &stanza);
    write_text(interfaces_path, &updated, 0o644).await?;
    Ok(())
}

pub fn nat_service_name(bridge: &str) -> String {
    format!("portacode-{bridge}-nat.service")
}

pub fn dnsmasq_service_name(bridge: &str) -> String {
    format!("portacode-{bridge}-dnsmasq.service")
}

async fn write_units(bridge: &str, init: &dyn InitSystem) -> Result<(), ProvisionerError> {
    let nat_name = nat_service_name(bridge);
    let nat_spec = ServiceSpec {
        name: nat_name.trim_end_matches(".service").to_string(),
        description: format!("portacode NAT/FORWARD rules for {bridge}"),
        exec_start: format!(
            "/sbin/iptables -t nat -A POSTROUTING -s {SUBNET_CIDR} ! -o {bridge} -j MASQUERADE"
        ),
        working_directory: None,
        after: vec!["network.target".into()],
    };
    init.install(&nat_spec).await?;

    let dnsmasq_name = dnsmasq_service_name(bridge);
    let dnsmasq_spec = ServiceSpec {
        name: dnsmasq_name.trim_end_matches(".service").to_string(),
        description: format!("portacode DHCP+DNS for {bridge}"),
        exec_start: format!(
            "/usr/sbin/dnsmasq --interface={bridge} --dhcp-range={DHCP_START},{DHCP_END},12h --server={DNS_SERVER} --leasefile-ro --dhcp-leasefile=/var/lib/misc/portacode_dnsmasq.leases --keep-in-foreground"
        ),
        working_directory: None,
        after: vec!["network.target".into()],
    };
    init.install(&dnsmasq_spec).await?;
    Ok(())
}

/// Bring up the managed bridge, NAT, and DHCP+DNS daemon (spec.md §4.6 step
/// 1). On any failure, reverts the units it already installed.
pub async fn ensure_network(interfaces_path: &Path, bridge: &str, init: &dyn InitSystem) -> Result<(), ProvisionerError> {
    write_bridge_config(interfaces_path, bridge).await.map_err(|e| ProvisionerError::NetworkSetupFailed(e.to_string()))?;

    if let Err(e) = write_units(bridge, init).await {
        return Err(ProvisionerError::NetworkSetupFailed(e.to_string()));
    }

    let nat_name = nat_service_name(bridge);
    let dnsmasq_name = dnsmasq_service_name(bridge);

    let enable_result = async {
        init.enable(nat_name.trim_end_matches(".service")).await?;
        init.restart(nat_name.trim_end_matches(".service")).await?;
        init.enable(dnsmasq_name.trim_end_matches(".service")).await?;
        init.restart(dnsmasq_name.trim_end_matches(".service")).await?;
        Ok::<_, portacode_hostops::HostOpsError>(())
    }
    .await;

    if let Err(e) = enable_result {
        let _ = run_checked(&["ip", "link", "delete", bridge]).await;
        return Err(ProvisionerError::NetworkSetupFailed(e.to_string()));
    }

    if run_checked(&["sysctl", "-w", "net.ipv4.ip_forward=1"]).await.is_err() {
        return Err(ProvisionerError::NetworkSetupFailed("failed to enable ipv4 forwarding".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_bridge_stanza_with_markers() {
        let stanza = render_bridge_stanza("vmbr1");
        assert!(stanza.starts_with("# Portacode INFRA BEGIN vmbr1"));
        assert!(stanza.trim_end().ends_with("# Portacode INFRA END vmbr1"));
        assert!(stanza.contains(SUBNET_CIDR));
    }

    #[test]
    fn upsert_is_idempotent_across_repeated_runs() {
        let first = upsert_block("", "# BEGIN", "# END", "# BEGIN\nfoo\n# END");
        let second = upsert_block(&first, "# BEGIN", "# END", "# BEGIN\nfoo\n# END");
        assert_eq!(first, second);
    }

    #[test]
    fn upsert_preserves_unrelated_content() {
        let existing = "auto eth0\niface eth0 inet dhcp\n";
        let updated = upsert_block(existing, "# BEGIN x", "# END x", "# BEGIN x\nnew\n# END x");
        assert!(updated.contains("auto eth0"));
        assert!(updated.contains("# BEGIN x\nnew\n# END x"));
    }

    #[test]
    fn service_names_follow_bridge_pattern() {
        assert_eq!(nat_service_name("vmbr1"), "portacode-vmbr1-nat.service");
        assert_eq!(dnsmasq_service_name("vmbr1"), "portacode-vmbr1-dnsmasq.service");
    }
}
