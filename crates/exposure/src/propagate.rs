// SPDX-License-Identifier: MIT

use crate::error::ExposureError;
use async_trait::async_trait;
use std::path::Path;
use tracing::warn;

/// Copies a locally-staged file into a container and fixes its ownership
/// and mode. Implemented against the hypervisor's `pct push` in production;
/// kept as a trait so propagation logic is unit-testable without a real
/// container.
#[async_trait]
pub trait ContainerPusher: Send + Sync {
    async fn push(&self, device_id: &str, local: &Path, remote: &str, mode: u32) -> Result<(), ExposureError>;
}

/// Reads a file already inside the container back out, so merge-style
/// propagation (`/etc/environment`, global shell hooks) can strip its own
/// previously-written managed block before appending a fresh one. Returns
/// `Ok(None)` if the remote file doesn't exist yet.
#[async_trait]
pub trait ContainerPuller: Send + Sync {
    async fn pull(&self, device_id: &str, remote: &str) -> Result<Option<String>, ExposureError>;
}

pub struct PctPusher;

pub struct PctPuller;

#[async_trait]
impl ContainerPuller for PctPuller {
    async fn pull(&self, device_id: &str, remote: &str) -> Result<Option<String>, ExposureError> {
        let out = portacode_hostops::run(&["pct", "exec", device_id, "--", "cat", remote]).await?;
        if out.success() {
            Ok(Some(out.stdout))
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl ContainerPusher for PctPusher {
    async fn push(&self, device_id: &str, local: &Path, remote: &str, mode: u32) -> Result<(), ExposureError> {
        let local_str = local.to_string_lossy().into_owned();
        portacode_hostops::run_checked(&["pct", "push", device_id, &local_str, remote]).await.map_err(|source| {
            ExposureError::Push { device_id: device_id.to_string(), local: local_str.clone(), remote: remote.to_string(), source }
        })?;
        portacode_hostops::run_checked(&["pct", "exec", device_id, "--", "chown", "root:root", remote]).await?;
        portacode_hostops::run_checked(&["pct", "exec", device_id, "--", "chmod", &format!("{mode:o}"), remote])
            .await?;
        Ok(())
    }
}

/// One file to stage locally then push, with its destination path inside
/// the container and its final mode.
pub struct StagedFile {
    pub remote_path: &'static str,
    pub mode: u32,
    pub contents: String,
}

/// Write every staged file under `local_staging_dir`, then push each one
/// into `device_id` via `pusher`.
pub async fn propagate(
    pusher: &dyn ContainerPusher,
    device_id: &str,
    local_staging_dir: &Path,
    files: &[StagedFile],
) -> Result<(), ExposureError> {
    tokio::fs::create_dir_all(local_staging_dir).await?;
    for file in files {
        let file_name = file.remote_path.trim_start_matches('/').replace('/', "_");
        let local_path = local_staging_dir.join(file_name);
        tokio::fs::write(&local_path, &file.contents).await?;
        pusher.push(device_id, &local_path, file.remote_path, file.mode).await?;
    }
    Ok(())
}

/// Best-effort daemon reload inside the container: failures are logged and
/// ignored (spec.md §4.5).
pub async fn best_effort_reexec(device_id: &str) {
    for argv in [&["systemctl", "daemon-reexec"][..], &["env-update"][..]] {
        let mut full = vec!["pct", "exec", device_id, "--"];
        full.extend_from_slice(argv);
        if let Err(e) = portacode_hostops::run_checked(&full).await {
            warn!(command = ?argv, device_id, error = %e, "best-effort reexec/env-update failed, ignoring");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingPusher {
        pushed: Arc<Mutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl ContainerPusher for RecordingPusher {
        async fn push(&self, _device_id: &str, local: &Path, remote: &str, _mode: u32) -> Result<(), ExposureError> {
            self.pushed.lock().unwrap().push((local.to_string_lossy().into_owned(), remote.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn propagate_pushes_every_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let pushed = Arc::new(Mutex::new(Vec::new()));
        let pusher = RecordingPusher { pushed: Arc::clone(&pushed) };

        let files = vec![
            StagedFile { remote_path: "/etc/portacode/exposed_services.json", mode: 0o644, contents: "{}".into() },
            StagedFile { remote_path: "/etc/profile.d/portacode_exposed_services.sh", mode: 0o755, contents: "#".into() },
        ];

        propagate(&pusher, "42", dir.path(), &files).await.unwrap();
        assert_eq!(pushed.lock().unwrap().len(), 2);
    }
}
