// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    InProgress,
    Completed,
    Retrying,
    Failed,
}

/// `proxmox_container_progress` event payload (spec.md §4.6).
#[derive(Debug, Clone, Serialize)]
pub struct ContainerProgress {
    pub event: &'static str,
    pub phase: String,
    pub step_index: usize,
    pub total_steps: usize,
    pub status: ProgressStatus,
    pub message: String,
}

impl ContainerProgress {
    pub fn new(phase: impl Into<String>, step_index: usize, total_steps: usize, status: ProgressStatus, message: impl Into<String>) -> Self {
        Self { event: "proxmox_container_progress", phase: phase.into(), step_index, total_steps, status, message: message.into() }
    }
}

#[async_trait]
pub trait ProvisionerEventSink: Send + Sync {
    async fn send(&self, progress: ContainerProgress);
}

pub struct NoProvisionerEvents;

#[async_trait]
impl ProvisionerEventSink for NoProvisionerEvents {
    async fn send(&self, _progress: ContainerProgress) {}
}
