// SPDX-License-Identifier: MIT

use portacode_core::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("edge CLI is not installed and could not be installed")]
    CliUnavailable,
    #[error("login cert did not appear within the timeout")]
    LoginTimedOut,
    #[error("no login URL observed in edge CLI output")]
    NoLoginUrl,
    #[error("failed to parse edge CLI output: {0}")]
    MalformedOutput(String),
    #[error("edge CLI command failed: {0}")]
    EdgeCli(#[from] portacode_hostops::HostOpsError),
    #[error("storage error: {0}")]
    Storage(#[from] portacode_storage::StorageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Classify for TunnelError {
    fn kind(&self) -> ErrorKind {
        match self {
            TunnelError::CliUnavailable | TunnelError::EdgeCli(_) | TunnelError::Io(_) => ErrorKind::FatalHost,
            TunnelError::LoginTimedOut => ErrorKind::Transient,
            TunnelError::NoLoginUrl | TunnelError::MalformedOutput(_) => ErrorKind::Validation,
            TunnelError::Storage(_) => ErrorKind::FatalHost,
        }
    }
}
