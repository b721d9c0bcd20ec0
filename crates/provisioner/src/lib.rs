// SPDX-License-Identifier: MIT

//! Hypervisor infrastructure provisioning (spec.md §4.6, C8): bridge/NAT/
//! DHCP network setup, credential validation, container creation via the
//! hypervisor API, and the bootstrap step pipeline.

mod bootstrap;
mod client;
mod container;
mod credentials;
mod error;
mod network;
mod sink;

pub use bootstrap::{run_pipeline, wait_for_keypair_stable, BootstrapStep, StepFuture};
pub use client::HypervisorClient;
pub use container::{check_capacity, disk_expression, ContainerRecord, ContainerSpec, StorageKind};
pub use credentials::{InfraCredentials, TokenIdentifier};
pub use error::ProvisionerError;
pub use network::{
    bridge_ip, dnsmasq_service_name, ensure_network, nat_service_name, render_bridge_stanza, upsert_block,
    DEFAULT_BRIDGE, DHCP_END, DHCP_START, DNS_SERVER, MANAGED_MARKER, SUBNET_CIDR,
};
pub use sink::{ContainerProgress, NoProvisionerEvents, ProgressStatus, ProvisionerEventSink};
