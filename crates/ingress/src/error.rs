// SPDX-License-Identifier: MIT

use portacode_core::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngressError {
    #[error("invalid hostname {hostname:?}: must equal or be a subdomain of {domain:?}")]
    InvalidHostname { hostname: String, domain: String },
    #[error("invalid destination {0:?}")]
    InvalidDestination(String),
    #[error("expose_ports must have 1-3 entries, got {0}")]
    TooManyPorts(usize),
    #[error("port {0} outside 1-65535")]
    PortOutOfRange(i64),
    #[error("could not resolve device {0} to a network address")]
    UnresolvedDevice(String),
    #[error("dnsmasq lease file not found at {0}")]
    LeaseFileMissing(std::path::PathBuf),
    #[error("edge CLI command failed: {0}")]
    EdgeCli(#[from] portacode_hostops::HostOpsError),
    #[error("storage error: {0}")]
    Storage(#[from] portacode_storage::StorageError),
    #[error("io error at {path}: {source}")]
    Io { path: std::path::PathBuf, #[source] source: std::io::Error },
}

impl Classify for IngressError {
    fn kind(&self) -> ErrorKind {
        match self {
            IngressError::InvalidHostname { .. }
            | IngressError::InvalidDestination(_)
            | IngressError::TooManyPorts(_)
            | IngressError::PortOutOfRange(_) => ErrorKind::Validation,
            IngressError::UnresolvedDevice(_) => ErrorKind::Conflict,
            IngressError::LeaseFileMissing(_) | IngressError::EdgeCli(_) | IngressError::Io { .. } => {
                ErrorKind::FatalHost
            }
            IngressError::Storage(_) => ErrorKind::FatalHost,
        }
    }
}
