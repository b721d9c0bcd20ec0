// SPDX-License-Identifier: MIT

//! Resolves a portacode device id (a container vmid) to its network
//! interface's MAC address by asking the hypervisor's CLI directly
//! (spec.md §4.4 step 2's "device_id -> container vmid -> mac"). The
//! `net0` line Proxmox's create API auto-assigns a MAC for isn't returned
//! by the create call, so this is read back from the running container's
//! config rather than computed.

use portacode_ingress::DeviceNetworkResolver;
use regex::Regex;
use std::sync::OnceLock;

fn hwaddr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)hwaddr=([0-9a-f:]{17})").expect("static regex is valid"))
}

/// `DeviceNetworkResolver::mac_for_device` is synchronous (spec.md §4.4
/// deliberately keeps lease resolution off the async executor), so this
/// shells out via `std::process::Command` rather than the crate's usual
/// `tokio::process` path.
pub struct PctConfigMacResolver;

impl DeviceNetworkResolver for PctConfigMacResolver {
    fn mac_for_device(&self, device_id: &str) -> Option<String> {
        let output = std::process::Command::new("pct").args(["config", device_id]).output().ok()?;
        if !output.status.success() {
            return None;
        }
        let body = String::from_utf8_lossy(&output.stdout);
        let net_line = body.lines().find(|l| l.starts_with("net0"))?;
        hwaddr_re().captures(net_line).map(|c| c[1].to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_hwaddr_from_a_net0_line() {
        let re = hwaddr_re();
        let caps = re.captures("net0: name=eth0,bridge=vmbr1,hwaddr=AA:BB:CC:DD:EE:FF,ip=dhcp").unwrap();
        assert_eq!(&caps[1], "AA:BB:CC:DD:EE:FF");
    }
}
