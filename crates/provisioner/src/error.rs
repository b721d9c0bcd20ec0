// SPDX-License-Identifier: MIT

use portacode_core::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionerError {
    #[error("invalid token identifier {0:?}: expected user@realm!tokenname")]
    InvalidTokenIdentifier(String),
    #[error("node capacity exceeded: requested {requested_mib} MiB RAM / {requested_cpus} cpus, {available_mib} MiB / {available_cpus} available")]
    CapacityExceeded { requested_mib: u64, requested_cpus: u32, available_mib: u64, available_cpus: u32 },
    #[error("bootstrap step {step} failed after {attempts} attempts: {message}")]
    BootstrapFailed { step: String, attempts: u32, message: String },
    #[error("hypervisor API error: {0}")]
    Hypervisor(String),
    #[error("network provisioning failed, reverted: {0}")]
    NetworkSetupFailed(String),
    #[error("host operation failed: {0}")]
    HostOps(#[from] portacode_hostops::HostOpsError),
    #[error("storage error: {0}")]
    Storage(#[from] portacode_storage::StorageError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Classify for ProvisionerError {
    fn kind(&self) -> ErrorKind {
        match self {
            ProvisionerError::InvalidTokenIdentifier(_) => ErrorKind::Validation,
            ProvisionerError::CapacityExceeded { .. } => ErrorKind::Conflict,
            ProvisionerError::BootstrapFailed { .. } => ErrorKind::StepFailed,
            ProvisionerError::Hypervisor(_) | ProvisionerError::Http(_) => ErrorKind::Transient,
            ProvisionerError::NetworkSetupFailed(_) | ProvisionerError::HostOps(_) => ErrorKind::FatalHost,
            ProvisionerError::Storage(_) => ErrorKind::FatalHost,
        }
    }
}
