// SPDX-License-Identifier: MIT

use crate::error::IngressError;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_LEASES_PATH: &str = "/var/lib/misc/portacode_dnsmasq.leases";

/// One whitespace-separated `mac ip hostname` dnsmasq lease record.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaseRecord {
    pub mac: String,
    pub ip: IpAddr,
    pub hostname: String,
}

/// Parse a dnsmasq leases file. Each non-blank line is
/// `<expiry> <mac> <ip> <hostname> <client-id>`; only the mac/ip/hostname
/// columns are kept, matching the fields the original forwarding handler
/// reads off the lease line.
pub fn parse_leases(path: &Path) -> Result<Vec<LeaseRecord>, IngressError> {
    let body = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            IngressError::LeaseFileMissing(path.to_path_buf())
        } else {
            IngressError::Io { path: path.to_path_buf(), source }
        }
    })?;

    let mut records = Vec::new();
    for line in body.lines() {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 4 {
            continue;
        }
        let Ok(ip) = cols[2].parse::<IpAddr>() else { continue };
        records.push(LeaseRecord { mac: cols[1].to_string(), ip, hostname: cols[3].to_string() });
    }
    Ok(records)
}

/// Resolves a portacode `device_id` to a network address reachable from the
/// host. Implemented by `portacode-provisioner` (vmid -> mac -> lease); kept
/// as a narrow trait here so ingress never depends on the provisioner crate.
pub trait DeviceNetworkResolver: Send + Sync {
    fn mac_for_device(&self, device_id: &str) -> Option<String>;
}

/// Resolves a batch of device ids against one leases-file read, caching
/// results within the call per spec.md §4.4 step 2.
pub struct LeaseCache {
    leases_path: PathBuf,
    by_mac: HashMap<String, LeaseRecord>,
}

impl LeaseCache {
    pub fn load(leases_path: impl Into<PathBuf>) -> Result<Self, IngressError> {
        let leases_path = leases_path.into();
        let records = parse_leases(&leases_path)?;
        let by_mac = records.into_iter().map(|r| (r.mac.clone(), r)).collect();
        Ok(Self { leases_path, by_mac })
    }

    pub fn resolve(&self, resolver: &dyn DeviceNetworkResolver, device_id: &str) -> Result<IpAddr, IngressError> {
        let mac = resolver
            .mac_for_device(device_id)
            .ok_or_else(|| IngressError::UnresolvedDevice(device_id.to_string()))?;
        self.by_mac
            .get(&mac)
            .map(|r| r.ip)
            .ok_or_else(|| IngressError::UnresolvedDevice(device_id.to_string()))
    }

    pub fn leases_path(&self) -> &Path {
        &self.leases_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_lease_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leases");
        std::fs::write(&path, "1700000000 aa:bb:cc:dd:ee:ff 10.10.0.101 ct42 *\n").unwrap();
        let records = parse_leases(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].hostname, "ct42");
        assert_eq!(records[0].ip.to_string(), "10.10.0.101");
    }

    #[test]
    fn missing_leases_file_is_fatal() {
        let err = parse_leases(Path::new("/nonexistent/portacode_leases")).unwrap_err();
        assert!(matches!(err, IngressError::LeaseFileMissing(_)));
    }

    struct FixedMac(&'static str);
    impl DeviceNetworkResolver for FixedMac {
        fn mac_for_device(&self, _device_id: &str) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    #[test]
    fn cache_resolves_device_id_through_mac_and_lease() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leases");
        std::fs::write(&path, "1700000000 aa:bb:cc:dd:ee:ff 10.10.0.101 ct42 *\n").unwrap();
        let cache = LeaseCache::load(&path).unwrap();
        let ip = cache.resolve(&FixedMac("aa:bb:cc:dd:ee:ff"), "42").unwrap();
        assert_eq!(ip.to_string(), "10.10.0.101");
    }
}
