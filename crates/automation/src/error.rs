// SPDX-License-Identifier: MIT

use portacode_core::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("instructions must be a non-empty list and task_id must be non-empty: {0}")]
    Validation(String),
    #[error("another automation task is active on device: {0}")]
    Conflict(String),
    #[error("storage error: {0}")]
    Storage(#[from] portacode_storage::StorageError),
}

impl Classify for AutomationError {
    fn kind(&self) -> ErrorKind {
        match self {
            AutomationError::Validation(_) => ErrorKind::Validation,
            AutomationError::Conflict(_) => ErrorKind::Conflict,
            AutomationError::Storage(_) => ErrorKind::FatalHost,
        }
    }
}
