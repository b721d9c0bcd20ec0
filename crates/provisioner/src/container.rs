// SPDX-License-Identifier: MIT

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProvisionerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Lvm,
    FileBacked,
}

/// `storage:N` for LVM-backed storage (whole gibibytes, no suffix),
/// `storage:NG` otherwise (spec.md §4.6 step 3).
pub fn disk_expression(storage: &str, kind: StorageKind, disk_gib: u32) -> String {
    match kind {
        StorageKind::Lvm => format!("{storage}:{disk_gib}"),
        StorageKind::FileBacked => format!("{storage}:{disk_gib}G"),
    }
}

#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub node: String,
    pub storage: String,
    pub storage_kind: StorageKind,
    pub template: String,
    pub hostname: String,
    pub disk_gib: u32,
    pub ram_mib: u64,
    pub cpus: u32,
    pub bridge: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssh_key: Option<String>,
}

/// Persisted at `<cfg>/portacode/containers/ct-<vmid>.json` (spec.md §3).
/// `password` is kept only so a dropped bootstrap can re-enter the
/// container without re-prompting the caller; the file is written 0600.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerRecord {
    pub vmid: u32,
    pub node: String,
    pub hostname: String,
    pub template: String,
    pub storage: String,
    pub disk_gib: u32,
    pub ram_mib: u64,
    pub cpus: u32,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssh_public_key: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Verify the requested container would not push aggregate RAM/core usage
/// across already-managed containers over the node's capacity (spec.md
/// §4.6 step 4).
pub fn check_capacity(
    existing: &[ContainerRecord],
    requested_ram_mib: u64,
    requested_cpus: u32,
    node_ram_mib: u64,
    node_cpus: u32,
) -> Result<(), ProvisionerError> {
    let used_ram: u64 = existing.iter().map(|c| c.ram_mib).sum();
    let used_cpus: u32 = existing.iter().map(|c| c.cpus).sum();

    let total_ram = used_ram + requested_ram_mib;
    let total_cpus = used_cpus + requested_cpus;

    if total_ram > node_ram_mib || total_cpus > node_cpus {
        return Err(ProvisionerError::CapacityExceeded {
            requested_mib: requested_ram_mib,
            requested_cpus,
            available_mib: node_ram_mib.saturating_sub(used_ram),
            available_cpus: node_cpus.saturating_sub(used_cpus),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lvm_disk_expression_has_no_suffix() {
        assert_eq!(disk_expression("local-lvm", StorageKind::Lvm, 8), "local-lvm:8");
    }

    #[test]
    fn file_backed_disk_expression_has_g_suffix() {
        assert_eq!(disk_expression("local", StorageKind::FileBacked, 8), "local:8G");
    }

    fn record(ram_mib: u64, cpus: u32) -> ContainerRecord {
        ContainerRecord {
            vmid: 100,
            node: "pve".into(),
            hostname: "h".into(),
            template: "local:vztmpl/debian-12.tar.zst".into(),
            storage: "local-lvm".into(),
            disk_gib: 8,
            ram_mib,
            cpus,
            username: None,
            password: None,
            ssh_public_key: None,
            description: crate::network::MANAGED_MARKER.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn capacity_check_passes_when_within_budget() {
        let existing = vec![record(2048, 2)];
        assert!(check_capacity(&existing, 1024, 1, 8192, 8).is_ok());
    }

    #[test]
    fn capacity_check_rejects_ram_overcommit() {
        let existing = vec![record(7000, 2)];
        let err = check_capacity(&existing, 2000, 1, 8192, 8).unwrap_err();
        assert!(matches!(err, ProvisionerError::CapacityExceeded { .. }));
    }

    #[test]
    fn capacity_check_rejects_cpu_overcommit() {
        let existing = vec![record(1024, 7)];
        let err = check_capacity(&existing, 512, 2, 8192, 8).unwrap_err();
        assert!(matches!(err, ProvisionerError::CapacityExceeded { .. }));
    }
}
