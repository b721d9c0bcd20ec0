// SPDX-License-Identifier: MIT

//! Resumable shell/HTTP-probe automation pipelines (spec.md §4.3, C6).
//!
//! [`AutomationRuntime`] owns a single active [`AutomationTask`] at a time,
//! persisted atomically after every state transition, and driven forward by
//! a background runner task spawned from `start`/on startup-resume.

mod error;
mod runner;
mod runtime;
mod sink;
mod types;

pub use error::AutomationError;
pub use runtime::AutomationRuntime;
pub use sink::{EventSink, ExposedPortResolver, NoExposedPorts};
pub use types::{
    trim_stdio, AutomationDocument, AutomationTask, Step, StepResult, StepStatus, TaskStatus,
    DEFAULT_STEP_TIMEOUT_SECONDS, MAX_STDIO_CHARS, OUTPUT_FLUSH_INTERVAL_MS,
    WAIT_FOR_REQUEST_TIMEOUT_MS, WAIT_FOR_STEP_INTERVAL_MS,
};
