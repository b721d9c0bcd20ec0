// SPDX-License-Identifier: MIT

use portacode_core::{Classify, ErrorKind, RouterError};
use thiserror::Error;

/// Errors local to the interactive-ops handlers (fs/diff/terminal) that
/// have no existing subsystem crate of their own.
#[derive(Debug, Error)]
pub enum HandlersError {
    #[error("path {0} is not valid UTF-8")]
    NotUtf8(String),
    #[error("no terminal open with id {0}")]
    UnknownTerminal(String),
    #[error("diff does not apply: {0}")]
    DiffMismatch(String),
    #[error("io error at {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error(transparent)]
    HostOps(#[from] portacode_hostops::HostOpsError),
}

impl Classify for HandlersError {
    fn kind(&self) -> ErrorKind {
        match self {
            HandlersError::NotUtf8(_) | HandlersError::DiffMismatch(_) => ErrorKind::Validation,
            HandlersError::UnknownTerminal(_) => ErrorKind::Conflict,
            HandlersError::Io { .. } | HandlersError::HostOps(_) => ErrorKind::FatalHost,
        }
    }
}

/// Classify any subsystem error (each implements [`Classify`]) into the
/// router's uniform [`RouterError`], so handlers never hand-roll a match
/// over error kinds.
pub fn classify<E: Classify + std::fmt::Display>(err: E) -> RouterError {
    RouterError::new(err.kind(), err.to_string())
}

/// Serialize a value that is known to always succeed, surfacing a
/// `FatalHost` [`RouterError`] instead of panicking if it somehow doesn't.
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, RouterError> {
    serde_json::to_value(value).map_err(|e| RouterError::fatal_host(e.to_string()))
}
