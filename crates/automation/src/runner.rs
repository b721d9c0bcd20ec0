// SPDX-License-Identifier: MIT

use crate::runtime::{AutomationRuntime, LiveProcess};
use crate::types::{
    trim_stdio, Step, StepResult, StepStatus, TaskStatus, DEFAULT_STEP_TIMEOUT_SECONDS,
    OUTPUT_FLUSH_INTERVAL_MS, WAIT_FOR_REQUEST_TIMEOUT_MS, WAIT_FOR_STEP_INTERVAL_MS,
};
use chrono::Utc;
use serde_json::json;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, warn};

/// Drive task `task_id` to completion, one step at a time, per spec.md
/// §4.3's runner algorithm. Runs as its own `tokio::spawn`ed task; never
/// panics outward -- failures are recorded in task state.
pub(crate) async fn run_task(runtime: Arc<AutomationRuntime>, task_id: String) {
    loop {
        let (step, step_index, command_text, timeout_seconds) = {
            let mut doc = runtime.document.lock().await;
            let Some(task) = doc.tasks.get_mut(&task_id) else { return };

            if task.cancel_requested {
                task.status = TaskStatus::Cancelled;
                task.current_step_status = StepStatus::Failed;
                task.completed_at = Some(Utc::now());
                task.bump_seq();
                doc.active_task_id = None;
                let _ = runtime.store.save(&doc);
                runtime.notify.notify_waiters();
                return;
            }
            if task.status.is_terminal() {
                doc.active_task_id = None;
                let _ = runtime.store.save(&doc);
                runtime.notify.notify_waiters();
                return;
            }

            let index = task.current_step_index;
            if index >= task.instructions.len() {
                task.status = TaskStatus::Success;
                task.current_step_status = StepStatus::Success;
                task.completed_at = Some(Utc::now());
                task.bump_seq();
                doc.active_task_id = None;
                let _ = runtime.store.save(&doc);
                runtime.notify.notify_waiters();
                return;
            }

            let step = task.instructions[index].clone();
            if matches!(step, Step::Noop) {
                task.current_step_index = index + 1;
                task.current_step_status = StepStatus::Success;
                let _ = runtime.store.save(&doc);
                continue;
            }

            if task.started_at.is_none() {
                task.started_at = Some(Utc::now());
            }
            task.status = TaskStatus::Running;
            task.current_step_status = StepStatus::Running;
            task.bump_seq();
            let default_timeout =
                if task.default_timeout_seconds > 0.0 { task.default_timeout_seconds } else { DEFAULT_STEP_TIMEOUT_SECONDS };
            let timeout = step.timeout().filter(|t| *t > 0.0).unwrap_or(default_timeout);
            let _ = runtime.store.save(&doc);
            runtime.notify.notify_waiters();

            let command_text = match &step {
                Step::Shell { command, .. } => command.clone(),
                Step::WaitFor { target, .. } => target.clone(),
                Step::Noop => unreachable!(),
            };
            (step, index, command_text, timeout)
        };

        let result = match &step {
            Step::Shell { command, .. } => {
                run_shell_step(&runtime, &task_id, step_index, command, timeout_seconds).await
            }
            Step::WaitFor { target, .. } => {
                run_wait_for_step(&runtime, &task_id, step_index, target, timeout_seconds).await
            }
            Step::Noop => unreachable!(),
        };
        let _ = command_text;

        let mut doc = runtime.document.lock().await;
        let Some(task) = doc.tasks.get_mut(&task_id) else { return };

        while task.steps.len() <= step_index {
            let pad_index = task.steps.len();
            task.steps.push(StepResult::pending(pad_index));
        }
        let failed = result.status == StepStatus::Failed;
        let error_text = result.error.clone();
        task.steps[step_index] = result;

        if task.cancel_requested {
            task.status = TaskStatus::Cancelled;
            task.current_step_status = StepStatus::Failed;
            task.completed_at = Some(Utc::now());
            task.bump_seq();
            doc.active_task_id = None;
            let _ = runtime.store.save(&doc);
            runtime.notify.notify_waiters();
            return;
        }

        if failed {
            task.status = TaskStatus::Failed;
            task.current_step_status = StepStatus::Failed;
            task.completed_at = Some(Utc::now());
            task.last_error = error_text;
            task.bump_seq();
            doc.active_task_id = None;
            let _ = runtime.store.save(&doc);
            runtime.notify.notify_waiters();
            return;
        }

        task.current_step_index = step_index + 1;
        task.current_step_status = StepStatus::Pending;
        task.bump_seq();
        let _ = runtime.store.save(&doc);
        runtime.notify.notify_waiters();
    }
}

async fn run_shell_step(
    runtime: &Arc<AutomationRuntime>,
    task_id: &str,
    step_index: usize,
    command: &str,
    timeout_seconds: f64,
) -> StepResult {
    let start = Instant::now();

    let mut child = match Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            error!(task_id, step_index, error = %e, "failed to spawn automation step");
            return StepResult {
                index: step_index,
                command: command.to_string(),
                status: StepStatus::Failed,
                returncode: None,
                stdout: String::new(),
                stderr: String::new(),
                duration_s: start.elapsed().as_secs_f64(),
                completed_at: Utc::now(),
                error: Some(format!("failed to spawn step: {e}")),
                wait_for_target: None,
                resolved_url: None,
            };
        }
    };

    if let Some(pid) = child.id() {
        *runtime.live_process.lock().await = Some(LiveProcess { task_id: task_id.to_string(), pid });
    }

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let final_stdout = Arc::new(AsyncMutex::new(String::new()));
    let final_stderr = Arc::new(AsyncMutex::new(String::new()));
    let pending_stdout = Arc::new(AsyncMutex::new(String::new()));
    let pending_stderr = Arc::new(AsyncMutex::new(String::new()));

    let stdout_task = tokio::spawn(read_stream_into(
        stdout_pipe.take(),
        Arc::clone(&pending_stdout),
        Arc::clone(&final_stdout),
    ));
    let stderr_task = tokio::spawn(read_stream_into(
        stderr_pipe.take(),
        Arc::clone(&pending_stderr),
        Arc::clone(&final_stderr),
    ));

    let flusher_runtime = Arc::clone(runtime);
    let flusher_task_id = task_id.to_string();
    let flusher_command = command.to_string();
    let flusher_pending_stdout = Arc::clone(&pending_stdout);
    let flusher_pending_stderr = Arc::clone(&pending_stderr);
    let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();
    let flusher_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(OUTPUT_FLUSH_INTERVAL_MS));
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    flush_pending(
                        &flusher_runtime, &flusher_task_id, step_index, &flusher_command,
                        &flusher_pending_stdout, &flusher_pending_stderr,
                    ).await;
                }
                _ = &mut stop_rx => {
                    flush_pending(
                        &flusher_runtime, &flusher_task_id, step_index, &flusher_command,
                        &flusher_pending_stdout, &flusher_pending_stderr,
                    ).await;
                    break;
                }
            }
        }
    });

    let timed_out;
    let returncode;
    match tokio::time::timeout(Duration::from_secs_f64(timeout_seconds), child.wait()).await {
        Ok(Ok(status)) => {
            timed_out = false;
            returncode = status.code();
        }
        Ok(Err(e)) => {
            warn!(task_id, step_index, error = %e, "error waiting on automation step");
            timed_out = false;
            returncode = None;
        }
        Err(_) => {
            timed_out = true;
            let _ = child.start_kill();
            returncode = child.wait().await.ok().and_then(|s| s.code());
        }
    }

    let _ = stop_tx.send(());
    let _ = tokio::join!(stdout_task, stderr_task, flusher_task);
    *runtime.live_process.lock().await = None;

    let duration_s = (start.elapsed().as_secs_f64() * 1000.0).round() / 1000.0;
    let stdout_text = trim_stdio(&final_stdout.lock().await);
    let stderr_text = trim_stdio(&final_stderr.lock().await);

    runtime
        .emit(json!({
            "event": "terminal_exec_result",
            "command": command,
            "returncode": returncode,
            "stdout": stdout_text,
            "stderr": stderr_text,
            "duration_s": duration_s,
            "automation_task_id": task_id,
            "automation_step_index": step_index,
        }))
        .await;

    let failed = timed_out || returncode != Some(0);
    StepResult {
        index: step_index,
        command: command.to_string(),
        status: if failed { StepStatus::Failed } else { StepStatus::Success },
        returncode,
        stdout: stdout_text,
        stderr: stderr_text,
        duration_s,
        completed_at: Utc::now(),
        error: if timed_out { Some(format!("step timed out after {timeout_seconds}s")) } else { None },
        wait_for_target: None,
        resolved_url: None,
    }
}

async fn read_stream_into(
    stream: Option<impl tokio::io::AsyncRead + Unpin>,
    pending: Arc<AsyncMutex<String>>,
    archive: Arc<AsyncMutex<String>>,
) {
    let Some(mut stream) = stream else { return };
    let mut buf = [0u8; 1024];
    loop {
        let read = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let text = String::from_utf8_lossy(&buf[..read]).into_owned();
        pending.lock().await.push_str(&text);
        archive.lock().await.push_str(&text);
    }
}

async fn flush_pending(
    runtime: &Arc<AutomationRuntime>,
    task_id: &str,
    step_index: usize,
    command: &str,
    pending_stdout: &Arc<AsyncMutex<String>>,
    pending_stderr: &Arc<AsyncMutex<String>>,
) {
    let stdout_chunk = std::mem::take(&mut *pending_stdout.lock().await);
    let stderr_chunk = std::mem::take(&mut *pending_stderr.lock().await);
    if stdout_chunk.is_empty() && stderr_chunk.is_empty() {
        return;
    }
    let mut payload = json!({
        "event": "terminal_exec_output",
        "command": command,
        "automation_task_id": task_id,
        "automation_step_index": step_index,
    });
    if !stdout_chunk.is_empty() {
        payload["stdout"] = json!(stdout_chunk);
    }
    if !stderr_chunk.is_empty() {
        payload["stderr"] = json!(stderr_chunk);
    }
    runtime.emit(payload).await;
}

async fn run_wait_for_step(
    runtime: &Arc<AutomationRuntime>,
    task_id: &str,
    step_index: usize,
    target: &str,
    timeout_seconds: f64,
) -> StepResult {
    let start = Instant::now();
    let resolved_url = resolve_exposed_placeholder(runtime, target).await;

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_millis(WAIT_FOR_REQUEST_TIMEOUT_MS))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            return StepResult {
                index: step_index,
                command: target.to_string(),
                status: StepStatus::Failed,
                returncode: None,
                stdout: String::new(),
                stderr: String::new(),
                duration_s: start.elapsed().as_secs_f64(),
                completed_at: Utc::now(),
                error: Some(format!("failed to build HTTP client: {e}")),
                wait_for_target: Some(target.to_string()),
                resolved_url: Some(resolved_url),
            };
        }
    };

    let deadline = start + Duration::from_secs_f64(timeout_seconds);
    let mut succeeded = false;

    loop {
        let attempt_result = client.get(&resolved_url).send().await;
        let ok = matches!(&attempt_result, Ok(resp) if resp.status().as_u16() >= 200 && resp.status().as_u16() < 300);

        runtime
            .emit(json!({
                "event": "terminal_exec_output",
                "command": target,
                "automation_task_id": task_id,
                "automation_step_index": step_index,
                "stdout": if ok { "wait_for success\n" } else { "wait_for pending\n" },
            }))
            .await;

        if ok {
            succeeded = true;
            break;
        }
        if Instant::now() >= deadline {
            break;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        let sleep_for = Duration::from_millis(WAIT_FOR_STEP_INTERVAL_MS).min(remaining);
        if sleep_for.is_zero() {
            break;
        }
        tokio::time::sleep(sleep_for).await;
    }

    let duration_s = start.elapsed().as_secs_f64();
    StepResult {
        index: step_index,
        command: target.to_string(),
        status: if succeeded { StepStatus::Success } else { StepStatus::Failed },
        returncode: None,
        stdout: if succeeded { "wait_for success".to_string() } else { String::new() },
        stderr: String::new(),
        duration_s,
        completed_at: Utc::now(),
        error: if succeeded { None } else { Some(format!("step timed out after {timeout_seconds}s")) },
        wait_for_target: Some(target.to_string()),
        resolved_url: Some(resolved_url),
    }
}

/// Substitute `[exposed:<port>]` against the injected exposure table.
/// Unresolvable placeholders are left verbatim (the request then simply
/// fails against a literal, invalid host).
async fn resolve_exposed_placeholder(runtime: &Arc<AutomationRuntime>, target: &str) -> String {
    let Some(start) = target.find("[exposed:") else { return target.to_string() };
    let Some(end_rel) = target[start..].find(']') else { return target.to_string() };
    let end = start + end_rel;
    let port_str = &target[start + "[exposed:".len()..end];
    let Ok(port) = port_str.parse::<u16>() else { return target.to_string() };

    match runtime.resolve_exposed_port(port).await {
        Some(resolved) => format!("{}{}{}", &target[..start], resolved, &target[end + 1..]),
        None => target.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::AutomationRuntime;

    #[tokio::test]
    async fn shell_step_happy_path_reports_success() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = AutomationRuntime::new(dir.path().join("state.json")).await.unwrap();
        let result = run_shell_step(&runtime, "t1", 0, "echo hello", 10.0).await;
        assert_eq!(result.status, StepStatus::Success);
        assert_eq!(result.returncode, Some(0));
        assert!(result.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn shell_step_timeout_reports_failure_with_message() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = AutomationRuntime::new(dir.path().join("state.json")).await.unwrap();
        let result = run_shell_step(&runtime, "t1", 0, "sleep 5", 1.0).await;
        assert_eq!(result.status, StepStatus::Failed);
        assert!(result.error.as_deref().unwrap_or_default().contains("timed out after 1"));
    }

    #[tokio::test]
    async fn placeholder_with_no_resolver_is_left_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = AutomationRuntime::new(dir.path().join("state.json")).await.unwrap();
        let resolved = resolve_exposed_placeholder(&runtime, "http://[exposed:8080]/health").await;
        assert_eq!(resolved, "http://[exposed:8080]/health");
    }
}
