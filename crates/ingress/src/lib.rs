// SPDX-License-Identifier: MIT

//! Edge proxy ingress configuration (spec.md §4.4, C7): validates and
//! normalizes forwarding rules, resolves device-reference destinations
//! against the hypervisor's DHCP leases, and publishes the proxy config,
//! DNS routes, and service reload as one mutex-serialized operation.

mod config;
mod controller;
mod error;
mod resolve;
mod rule;

pub use config::{render_config, write_config, IngressEntry};
pub use controller::{
    CloudflaredDnsRegistrar, DnsRegistrar, ExposurePropagator, IngressConfig, IngressController,
    NoExposurePropagation,
};
pub use error::IngressError;
pub use resolve::{parse_leases, DeviceNetworkResolver, LeaseCache, LeaseRecord, DEFAULT_LEASES_PATH};
pub use rule::{parse_destination, validate_hostname, Destination, ForwardingRule};
