// SPDX-License-Identifier: MIT

use chrono::{DateTime, Utc};
use portacode_core::truncate_utf8;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MAX_STDIO_CHARS: usize = 8000;
pub const DEFAULT_STEP_TIMEOUT_SECONDS: f64 = 7200.0;
pub const OUTPUT_FLUSH_INTERVAL_MS: u64 = 1000;
pub const WAIT_FOR_STEP_INTERVAL_MS: u64 = 3000;
pub const WAIT_FOR_REQUEST_TIMEOUT_MS: u64 = 5000;

/// A single automation instruction, classified at construction time from
/// the loosely-typed wire payload (`portacode_wire::RawStep`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum Step {
    Shell { command: String, timeout: Option<f64> },
    WaitFor { target: String, timeout: Option<f64> },
    Noop,
}

impl Step {
    pub fn from_raw(command: Option<String>, wait_for: Option<String>, timeout: Option<f64>) -> Self {
        match (command, wait_for) {
            (Some(c), _) if !c.trim().is_empty() => Step::Shell { command: c, timeout },
            (_, Some(w)) if !w.trim().is_empty() => Step::WaitFor { target: w, timeout },
            _ => Step::Noop,
        }
    }

    pub fn timeout(&self) -> Option<f64> {
        match self {
            Step::Shell { timeout, .. } | Step::WaitFor { timeout, .. } => *timeout,
            Step::Noop => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub index: usize,
    pub command: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returncode: Option<i32>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    pub duration_s: f64,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_url: Option<String>,
}

impl StepResult {
    pub fn pending(index: usize) -> Self {
        Self {
            index,
            command: String::new(),
            status: StepStatus::Pending,
            returncode: None,
            stdout: String::new(),
            stderr: String::new(),
            duration_s: 0.0,
            completed_at: Utc::now(),
            error: None,
            wait_for_target: None,
            resolved_url: None,
        }
    }
}

/// Truncate stdout/stderr text to [`MAX_STDIO_CHARS`], matching the
/// teacher's "exactly N chars including the marker" invariant.
pub fn trim_stdio(text: &str) -> String {
    truncate_utf8(text, MAX_STDIO_CHARS)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
    Unknown,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed | TaskStatus::Cancelled)
    }

    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutomationTask {
    pub task_id: String,
    pub status: TaskStatus,
    pub instructions: Vec<Step>,
    pub default_timeout_seconds: f64,
    pub current_step_index: usize,
    pub current_step_status: StepStatus,
    pub steps: Vec<StepResult>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub cancel_requested: bool,
    pub state_seq: u64,
}

impl AutomationTask {
    pub fn new(task_id: String, instructions: Vec<Step>, default_timeout_seconds: f64) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            instructions,
            default_timeout_seconds,
            current_step_index: 0,
            current_step_status: StepStatus::Pending,
            steps: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            last_error: None,
            cancel_requested: false,
            state_seq: 1,
        }
    }

    /// Synthetic record returned for an unknown task id (spec.md §4.3).
    pub fn unknown(task_id: String) -> Self {
        Self {
            task_id,
            status: TaskStatus::Unknown,
            instructions: Vec::new(),
            default_timeout_seconds: DEFAULT_STEP_TIMEOUT_SECONDS,
            current_step_index: 0,
            current_step_status: StepStatus::Pending,
            steps: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            last_error: Some("task not found".into()),
            cancel_requested: false,
            state_seq: 0,
        }
    }

    pub fn bump_seq(&mut self) {
        self.state_seq += 1;
    }
}

/// Root persisted document (spec.md §4.3): `{active_task_id, tasks, updated_at}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AutomationDocument {
    #[serde(default)]
    pub active_task_id: Option<String>,
    #[serde(default)]
    pub tasks: HashMap<String, AutomationTask>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_from_raw_prefers_command_over_wait_for() {
        let step = Step::from_raw(Some("echo hi".into()), Some("http://x".into()), None);
        assert!(matches!(step, Step::Shell { .. }));
    }

    #[test]
    fn step_from_raw_blank_command_falls_through_to_wait_for() {
        let step = Step::from_raw(Some("   ".into()), Some("http://x".into()), None);
        assert!(matches!(step, Step::WaitFor { .. }));
    }

    #[test]
    fn step_from_raw_neither_is_noop() {
        let step = Step::from_raw(None, None, None);
        assert_eq!(step, Step::Noop);
    }

    #[test]
    fn terminal_status_classification() {
        assert!(TaskStatus::Success.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Pending.is_active());
    }
}
