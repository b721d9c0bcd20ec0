// SPDX-License-Identifier: MIT

use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum HostOpsError {
    #[error("command not found: {0}")]
    NotFound(String),
    #[error("failed to spawn {command}: {source}")]
    SpawnFailed { command: String, #[source] source: std::io::Error },
    #[error("command failed ({code:?}): {command} -- {stderr}")]
    NonZeroExit { command: String, code: Option<i32>, stderr: String },
    #[error("privileged operation unavailable: not root and no escalation helper present")]
    NoEscalation,
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }
}

/// Whether the current process is running as root (uid 0).
#[cfg(unix)]
pub fn is_root() -> bool {
    // SAFETY-free: geteuid() takes no arguments and only reads process state.
    nix_like_geteuid() == 0
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}

#[cfg(unix)]
fn nix_like_geteuid() -> u32 {
    // Avoid pulling in the `nix` crate just for geteuid; libc-free lookup
    // via the `/proc` self status line, falling back to "not root" if
    // unavailable (e.g. sandboxed environments without /proc).
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|body| {
            body.lines().find_map(|line| {
                line.strip_prefix("Uid:").and_then(|rest| {
                    rest.split_whitespace().next().and_then(|s| s.parse::<u32>().ok())
                })
            })
        })
        .unwrap_or(u32::MAX)
}

/// Whether `cmd` is resolvable on `$PATH`.
pub fn have(cmd: &str) -> bool {
    let Ok(path_var) = std::env::var("PATH") else { return false };
    std::env::split_paths(&path_var).any(|dir| dir.join(cmd).is_file())
}

/// The preferred non-interactive escalation helper, if any.
fn escalation_helper() -> Option<&'static str> {
    if have("sudo") {
        Some("sudo")
    } else if have("doas") {
        Some("doas")
    } else {
        None
    }
}

/// Run `argv` (argv[0] is the binary, rest are arguments), escalating with a
/// non-interactive prefix (`sudo -n` / `doas`) if the process is not root
/// and a helper is available. Never fails on nonzero exit -- inspect
/// `CommandOutput::success()`.
pub async fn run(argv: &[&str]) -> Result<CommandOutput, HostOpsError> {
    let Some((bin, args)) = argv.split_first() else {
        return Err(HostOpsError::NotFound(String::new()));
    };

    let mut command = build_command(bin, args);
    let output = command
        .output()
        .await
        .map_err(|source| HostOpsError::SpawnFailed { command: bin.to_string(), source })?;

    Ok(CommandOutput {
        status_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Like [`run`] but returns [`HostOpsError::NonZeroExit`] on a nonzero exit code.
pub async fn run_checked(argv: &[&str]) -> Result<CommandOutput, HostOpsError> {
    let out = run(argv).await?;
    if out.success() {
        Ok(out)
    } else {
        Err(HostOpsError::NonZeroExit {
            command: argv.join(" "),
            code: out.status_code,
            stderr: out.stderr,
        })
    }
}

fn build_command(bin: &str, args: &[&str]) -> Command {
    if is_root() {
        let mut c = Command::new(bin);
        c.args(args);
        return c;
    }
    match escalation_helper() {
        Some("sudo") => {
            let mut c = Command::new("sudo");
            c.arg("-n").arg(bin).args(args);
            c
        }
        Some(helper) => {
            let mut c = Command::new(helper);
            c.arg(bin).args(args);
            c
        }
        None => {
            // No escalation available; run unprivileged and let the
            // downstream permission error surface naturally.
            let mut c = Command::new(bin);
            c.args(args);
            c
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_captures_stdout_and_exit_code() {
        let out = run(&["echo", "hello"]).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn run_checked_surfaces_nonzero_exit() {
        let err = run_checked(&["false"]).await.unwrap_err();
        assert!(matches!(err, HostOpsError::NonZeroExit { .. }));
    }

    #[test]
    fn have_finds_a_real_binary() {
        assert!(have("echo") || have("cat"));
    }
}
