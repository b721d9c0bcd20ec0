// SPDX-License-Identifier: MIT

use crate::error::ProvisionerError;
use crate::sink::{ContainerProgress, ProgressStatus, ProvisionerEventSink};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A bootstrap step's boxed async body.
pub type StepFuture = Pin<Box<dyn Future<Output = Result<(), ProvisionerError>> + Send>>;

/// One ordered bootstrap step executed inside the freshly-created container
/// (spec.md §4.6 step 5). `run` is injected per step so the special
/// keypair-wait step can differ in kind from the rest without a variant
/// enum leaking into the pipeline driver.
pub struct BootstrapStep {
    pub name: String,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub retryable_substrings: Vec<String>,
    pub run: Box<dyn Fn() -> StepFuture + Send + Sync>,
}

fn is_retryable(message: &str, substrings: &[String]) -> bool {
    substrings.iter().any(|s| message.contains(s.as_str()))
}

/// Execute `steps` in order, retrying each per its own policy, and emitting
/// `proxmox_container_progress` at every attempt.
pub async fn run_pipeline(
    phase: &str,
    steps: Vec<BootstrapStep>,
    sink: &Arc<dyn ProvisionerEventSink>,
) -> Result<(), ProvisionerError> {
    let total = steps.len();
    for (index, step) in steps.into_iter().enumerate() {
        sink.send(ContainerProgress::new(phase, index, total, ProgressStatus::InProgress, format!("starting {}", step.name))).await;

        let mut attempt = 0;
        loop {
            match (step.run)().await {
                Ok(()) => {
                    sink.send(ContainerProgress::new(phase, index, total, ProgressStatus::Completed, format!("{} completed", step.name))).await;
                    break;
                }
                Err(e) if attempt < step.retry_count && is_retryable(&e.to_string(), &step.retryable_substrings) => {
                    attempt += 1;
                    warn!(step = %step.name, attempt, error = %e, "retryable bootstrap step failed, retrying");
                    sink.send(ContainerProgress::new(phase, index, total, ProgressStatus::Retrying, format!("{}: {e}", step.name))).await;
                    tokio::time::sleep(step.retry_delay).await;
                }
                Err(e) => {
                    sink.send(ContainerProgress::new(phase, index, total, ProgressStatus::Failed, format!("{}: {e}", step.name))).await;
                    return Err(ProvisionerError::BootstrapFailed { step: step.name, attempts: attempt + 1, message: e.to_string() });
                }
            }
        }
    }
    Ok(())
}

/// Poll `keypair_path` until its size appears and is stable across two
/// consecutive reads (the agent inside the container has finished writing
/// its device keypair).
pub async fn wait_for_keypair_stable(keypair_path: &PathBuf, poll_interval: Duration, timeout: Duration) -> Result<(), ProvisionerError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut last_size: Option<u64> = None;

    loop {
        let size = tokio::fs::metadata(keypair_path).await.ok().map(|m| m.len()).filter(|s| *s > 0);
        if let (Some(size), Some(prev)) = (size, last_size) {
            if size == prev {
                return Ok(());
            }
        }
        last_size = size;

        if tokio::time::Instant::now() >= deadline {
            return Err(ProvisionerError::BootstrapFailed {
                step: "wait_for_keypair".into(),
                attempts: 1,
                message: "keypair did not stabilize within timeout".into(),
            });
        }
        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_substring_matching_is_case_sensitive_substring() {
        let substrings = vec!["Could not get lock".to_string(), "Temporary failure".to_string()];
        assert!(is_retryable("E: Could not get lock /var/lib/dpkg/lock", &substrings));
        assert!(!is_retryable("permission denied", &substrings));
    }

    #[tokio::test]
    async fn wait_for_keypair_stable_succeeds_once_size_settles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_key.pem");
        std::fs::write(&path, "stable-bytes").unwrap();
        wait_for_keypair_stable(&path, Duration::from_millis(50), Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn wait_for_keypair_stable_times_out_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_key.pem");
        let err = wait_for_keypair_stable(&path, Duration::from_millis(20), Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, ProvisionerError::BootstrapFailed { .. }));
    }
}
