// SPDX-License-Identifier: MIT

//! Single-instance enforcement via a PID file (spec.md §5: "single-instance
//! enforcement at the process level via a PID file checked at startup").
//!
//! Unlike the teacher's hard `fs2::try_lock_exclusive` (fail immediately if
//! someone else holds the lock), the original agent prompts the operator to
//! confirm taking over an already-running connection before proceeding --
//! grounded in the original CLI's `connect()` command, which treats a live
//! PID file as something to negotiate rather than a hard conflict.

use crate::error::DaemonError;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Something that can ask the operator a yes/no question. A trait so the
/// takeover prompt is exercised in tests without real stdin.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Reads a line from stdin; anything starting with `y`/`Y` is yes.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{prompt} [y/N] ");
        if std::io::stdout().flush().is_err() {
            return false;
        }
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().chars().next(), Some('y') | Some('Y'))
    }
}

#[cfg(unix)]
fn process_alive(pid: i32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid), None).is_ok()
}

#[cfg(not(unix))]
fn process_alive(_pid: i32) -> bool {
    false
}

#[cfg(unix)]
fn terminate(pid: i32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
}

#[cfg(not(unix))]
fn terminate(_pid: i32) {}

/// Guards exclusive ownership of `path` for the lifetime of the running
/// agent process; removed on `Drop`.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check for a live competing instance, prompting `confirm` to take it
    /// over (SIGTERM, then wait briefly) if one is found. A stale file
    /// (process no longer running) is removed silently. Writes this
    /// process's own pid on success.
    pub fn claim(path: PathBuf, confirm: &dyn Confirm) -> Result<Self, DaemonError> {
        if let Some(existing_pid) = read_pid(&path)? {
            if process_alive(existing_pid) {
                if !confirm.confirm(&format!(
                    "an agent connection is already running (pid {existing_pid}); terminate it and take over?"
                )) {
                    return Err(DaemonError::TakeoverDeclined);
                }
                terminate(existing_pid);
                for _ in 0..20 {
                    if !process_alive(existing_pid) {
                        break;
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
                if process_alive(existing_pid) {
                    return Err(DaemonError::AlreadyRunning(existing_pid));
                }
            }
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| DaemonError::Io { path: parent.to_path_buf(), source })?;
        }
        std::fs::write(&path, std::process::id().to_string())
            .map_err(|source| DaemonError::Io { path: path.clone(), source })?;
        Ok(Self { path })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn read_pid(path: &Path) -> Result<Option<i32>, DaemonError> {
    match std::fs::read_to_string(path) {
        Ok(body) => Ok(body.trim().parse().ok()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(DaemonError::Io { path: path.to_path_buf(), source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysYes;
    impl Confirm for AlwaysYes {
        fn confirm(&self, _prompt: &str) -> bool {
            true
        }
    }

    struct AlwaysNo;
    impl Confirm for AlwaysNo {
        fn confirm(&self, _prompt: &str) -> bool {
            false
        }
    }

    #[test]
    fn claims_a_fresh_path_and_writes_own_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.pid");
        let guard = PidFile::claim(path.clone(), &AlwaysNo).unwrap();
        let written: i32 = std::fs::read_to_string(&path).unwrap().trim().parse().unwrap();
        assert_eq!(written, std::process::id() as i32);
        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn stale_pidfile_referencing_a_dead_process_is_silently_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.pid");
        // PID 2^31-2: exists as a valid pid_t but is exceedingly unlikely
        // to be a live process in a test sandbox.
        std::fs::write(&path, "2147483646").unwrap();
        let guard = PidFile::claim(path.clone(), &AlwaysNo).unwrap();
        drop(guard);
    }

    #[test]
    fn declining_takeover_of_a_live_process_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.pid");
        std::fs::write(&path, std::process::id().to_string()).unwrap();
        let err = PidFile::claim(path, &AlwaysNo).unwrap_err();
        assert!(matches!(err, DaemonError::TakeoverDeclined));
    }
}
