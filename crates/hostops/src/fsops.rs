// SPDX-License-Identifier: MIT

use crate::exec::{is_root, run_checked, HostOpsError};
use std::path::Path;

/// Create `path` (and parents) with `mode`, escalating if direct creation
/// fails with a permission error.
pub async fn ensure_dir(path: &Path, mode: u32) -> Result<(), HostOpsError> {
    match tokio::fs::create_dir_all(path).await {
        Ok(()) => {
            set_mode(path, mode).await?;
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            run_checked(&["mkdir", "-p", &path.to_string_lossy()]).await?;
            run_checked(&["chmod", &format!("{mode:o}"), &path.to_string_lossy()]).await?;
            Ok(())
        }
        Err(e) => Err(HostOpsError::SpawnFailed { command: "mkdir".into(), source: e }),
    }
}

/// Write `content` to `path` atomically (temp file + rename), with `mode`
/// applied after the rename. Falls back to an escalated `install`
/// invocation if a direct write hits a permission error (spec.md §4.8).
pub async fn write_text(path: &Path, content: &str, mode: u32) -> Result<(), HostOpsError> {
    match write_text_direct(path, content, mode).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            write_text_escalated(path, content, mode).await
        }
        Err(e) => Err(HostOpsError::SpawnFailed { command: "write".into(), source: e }),
    }
}

async fn write_text_direct(path: &Path, content: &str, mode: u32) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, content.as_bytes()).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    set_mode(path, mode).await
}

/// Escalated fallback: write to a world-readable temp file, then `install`
/// it into place with the right owner/mode under the escalation helper.
async fn write_text_escalated(path: &Path, content: &str, mode: u32) -> Result<(), HostOpsError> {
    if !is_root() {
        // run_checked escalates automatically when a helper exists; if
        // none exists the underlying command will fail and surface as
        // NonZeroExit, which callers classify as FatalHostError.
    }
    let tmp = std::env::temp_dir().join(format!(
        "portacode-write-{}.tmp",
        portacode_core::new_id()
    ));
    tokio::fs::write(&tmp, content.as_bytes())
        .await
        .map_err(|source| HostOpsError::SpawnFailed { command: "write".into(), source })?;

    if let Some(parent) = path.parent() {
        let _ = run_checked(&["mkdir", "-p", &parent.to_string_lossy()]).await;
    }

    let result = run_checked(&[
        "install",
        "-m",
        &format!("{mode:o}"),
        &tmp.to_string_lossy(),
        &path.to_string_lossy(),
    ])
    .await;

    let _ = tokio::fs::remove_file(&tmp).await;
    result.map(|_| ())
}

/// Copy `src` to `dest`, applying `mode` to the destination.
pub async fn copy_file(src: &Path, dest: &Path, mode: u32) -> Result<(), HostOpsError> {
    let content = tokio::fs::read(src)
        .await
        .map_err(|source| HostOpsError::SpawnFailed { command: "read".into(), source })?;
    let content = String::from_utf8_lossy(&content).into_owned();
    write_text(dest, &content, mode).await
}

async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_text_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        write_text(&path, "hello", 0o600).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn write_text_leaves_no_tmp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        write_text(&path, "hello", 0o600).await.unwrap();
        assert!(!dir.path().join("f.tmp").exists());
    }
}
