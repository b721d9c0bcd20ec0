// SPDX-License-Identifier: MIT

//! Shared error taxonomy (spec §7). Every crate's local `thiserror` error
//! type exposes a `.kind()` -> [`ErrorKind`] so the command router can
//! classify any handler failure uniformly into a response frame.

use serde::Serialize;
use thiserror::Error;

/// The error kinds named in spec.md §7. This is a classification, not a
/// replacement for each subsystem's own error enum — subsystems keep their
/// own `thiserror` types and map into this taxonomy at the handler boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller-supplied payload is ill-formed.
    Validation,
    /// Operation refused due to current state.
    Conflict,
    /// Network/package-manager races; retryable.
    Transient,
    /// Authentication rejected; fatal to the process.
    AuthRejected,
    /// Privileged operation failed irrecoverably.
    FatalHost,
    /// Automation step exited nonzero or timed out.
    StepFailed,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Transient => "transient",
            ErrorKind::AuthRejected => "auth_rejected",
            ErrorKind::FatalHost => "fatal_host",
            ErrorKind::StepFailed => "step_failed",
        };
        f.write_str(s)
    }
}

/// Generic classified error used at the router boundary (command dispatch,
/// §4.2) so handlers across crates can all be collapsed into one response
/// shape without every crate depending on every other crate's error type.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct RouterError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RouterError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn fatal_host(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FatalHost, message)
    }
}

/// Implemented by every subsystem error enum so the router can classify it
/// without a manual match in every handler.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}
