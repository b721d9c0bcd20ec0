// SPDX-License-Identifier: MIT

use portacode_core::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExposureError {
    #[error("failed to push {local} into container {device_id} at {remote}: {source}")]
    Push { device_id: String, local: String, remote: String, #[source] source: portacode_hostops::HostOpsError },
    #[error("host operation failed: {0}")]
    HostOps(#[from] portacode_hostops::HostOpsError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Classify for ExposureError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::FatalHost
    }
}
