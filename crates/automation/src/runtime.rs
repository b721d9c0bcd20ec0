// SPDX-License-Identifier: MIT

use crate::error::AutomationError;
use crate::runner;
use crate::sink::{EventSink, ExposedPortResolver, NoExposedPorts};
use crate::types::{AutomationDocument, AutomationTask, Step, TaskStatus};
use chrono::Utc;
use portacode_storage::AtomicJsonStore;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// pid of the subprocess currently running for a task, so `cancel` can
/// signal it without holding the state lock during the signal syscall.
pub(crate) struct LiveProcess {
    pub task_id: String,
    pub pid: u32,
}

/// Single-active-task automation orchestrator (spec.md §4.3, C6). One
/// instance per agent process; owns the in-memory state map, the
/// persistence handle, and the notifier `wait_for_change` blocks on.
pub struct AutomationRuntime {
    pub(crate) document: Mutex<AutomationDocument>,
    pub(crate) store: AtomicJsonStore<AutomationDocument>,
    pub(crate) notify: Notify,
    pub(crate) event_sink: RwLock<Option<Arc<dyn EventSink>>>,
    pub(crate) exposed_ports: RwLock<Arc<dyn ExposedPortResolver>>,
    pub(crate) live_process: Mutex<Option<LiveProcess>>,
    pub(crate) runner_handle: Mutex<Option<JoinHandle<()>>>,
    pub(crate) runner_generation: AtomicU32,
}

impl AutomationRuntime {
    /// Load persisted state from `store_path` (or start empty) and, if the
    /// active task is non-terminal, resume its runner immediately.
    pub async fn new(store_path: impl Into<std::path::PathBuf>) -> Result<Arc<Self>, AutomationError> {
        let store: AtomicJsonStore<AutomationDocument> = AtomicJsonStore::new(store_path, 0o600);
        let document = store.load()?.unwrap_or_default();

        let runtime = Arc::new(Self {
            document: Mutex::new(document),
            store,
            notify: Notify::new(),
            event_sink: RwLock::new(None),
            exposed_ports: RwLock::new(Arc::new(NoExposedPorts)),
            live_process: Mutex::new(None),
            runner_handle: Mutex::new(None),
            runner_generation: AtomicU32::new(0),
        });

        runtime.resume_active_task_on_startup().await;
        Ok(runtime)
    }

    async fn resume_active_task_on_startup(self: &Arc<Self>) {
        let active = {
            let doc = self.document.lock().await;
            doc.active_task_id.clone()
        };
        let Some(task_id) = active else { return };
        let non_terminal = {
            let doc = self.document.lock().await;
            doc.tasks.get(&task_id).map(|t| !t.status.is_terminal()).unwrap_or(false)
        };
        if non_terminal {
            info!(task_id = %task_id, "resuming automation task from persisted state");
            self.spawn_runner(task_id).await;
        }
    }

    pub async fn set_event_sink(&self, sink: Arc<dyn EventSink>) {
        *self.event_sink.write().await = Some(sink);
    }

    pub async fn set_exposed_port_resolver(&self, resolver: Arc<dyn ExposedPortResolver>) {
        *self.exposed_ports.write().await = resolver;
    }

    async fn persist_locked(&self, doc: &mut AutomationDocument) -> Result<(), AutomationError> {
        doc.updated_at = Some(Utc::now());
        self.store.save(doc)?;
        Ok(())
    }

    fn notify_change(&self) {
        self.notify.notify_waiters();
    }

    /// Start a new task, or idempotently return the current state of an
    /// existing `task_id` (spec.md §4.3, §8 idempotence law).
    pub async fn start(
        self: &Arc<Self>,
        task_id: String,
        instructions: Vec<Step>,
        default_timeout_seconds: f64,
    ) -> Result<AutomationTask, AutomationError> {
        let task_key = task_id.trim().to_string();
        if task_key.is_empty() {
            return Err(AutomationError::Validation("task_id is required".into()));
        }

        let mut needs_runner = false;
        let snapshot = {
            let mut doc = self.document.lock().await;

            if let Some(active_id) = doc.active_task_id.clone() {
                if active_id != task_key {
                    if let Some(active) = doc.tasks.get(&active_id) {
                        if active.status.is_active() {
                            return Err(AutomationError::Conflict(active_id));
                        }
                    }
                }
            }

            if let Some(existing) = doc.tasks.get_mut(&task_key) {
                existing.bump_seq();
                doc.active_task_id =
                    if existing.status.is_active() { Some(task_key.clone()) } else { None };
                needs_runner = existing.status.is_active();
                let snapshot = existing.clone();
                self.persist_locked(&mut doc).await?;
                snapshot
            } else {
                let task = AutomationTask::new(task_key.clone(), instructions, default_timeout_seconds);
                doc.tasks.insert(task_key.clone(), task.clone());
                doc.active_task_id = Some(task_key.clone());
                needs_runner = true;
                self.persist_locked(&mut doc).await?;
                task
            }
        };

        self.notify_change();

        if needs_runner {
            self.spawn_runner(task_key).await;
        }

        Ok(snapshot)
    }

    /// The task id currently occupying the single active slot, if any
    /// (spec.md §4.3 `status` reporting).
    pub async fn active_task_id(&self) -> Option<String> {
        self.document.lock().await.active_task_id.clone()
    }

    pub async fn state(&self, task_id: &str) -> AutomationTask {
        let task_key = task_id.trim().to_string();
        let doc = self.document.lock().await;
        doc.tasks.get(&task_key).cloned().unwrap_or_else(|| AutomationTask::unknown(task_key))
    }

    pub async fn cancel(&self, task_id: &str) -> AutomationTask {
        let task_key = task_id.trim().to_string();

        let (snapshot, should_signal) = {
            let mut doc = self.document.lock().await;
            let Some(task) = doc.tasks.get_mut(&task_key) else {
                return AutomationTask::unknown(task_key);
            };
            task.cancel_requested = true;
            if task.status.is_active() {
                task.status = TaskStatus::Cancelled;
                task.completed_at = Some(Utc::now());
                task.current_step_status = crate::types::StepStatus::Failed;
            }
            task.bump_seq();
            let snapshot = task.clone();
            if let Err(e) = self.persist_locked(&mut doc).await {
                warn!(task_id = %task_key, error = %e, "failed to persist cancellation");
            }
            (snapshot, true)
        };

        self.notify_change();

        if should_signal {
            let live = self.live_process.lock().await;
            if let Some(live) = live.as_ref() {
                if live.task_id == task_key {
                    terminate_process(live.pid);
                }
            }
        }

        self.state(&task_key).await
    }

    /// Block until `task_id`'s `state_seq` exceeds `since_seq` or the task
    /// becomes terminal.
    pub async fn wait_for_change(&self, task_id: &str, since_seq: u64) -> AutomationTask {
        let task_key = task_id.trim().to_string();
        loop {
            {
                let doc = self.document.lock().await;
                match doc.tasks.get(&task_key) {
                    None => return AutomationTask::unknown(task_key),
                    Some(task) if task.state_seq > since_seq || task.status.is_terminal() => {
                        return task.clone();
                    }
                    _ => {}
                }
            }
            self.notify.notified().await;
        }
    }

    pub(crate) async fn spawn_runner(self: &Arc<Self>, task_id: String) {
        let mut handle_guard = self.runner_handle.lock().await;
        if let Some(handle) = handle_guard.as_ref() {
            if !handle.is_finished() {
                return;
            }
        }
        let runtime = Arc::clone(self);
        *handle_guard = Some(tokio::spawn(async move {
            runner::run_task(runtime, task_id).await;
        }));
    }

    pub(crate) async fn emit(&self, payload: serde_json::Value) {
        let sink = self.event_sink.read().await;
        if let Some(sink) = sink.as_ref() {
            sink.send(payload).await;
        }
    }

    pub(crate) async fn resolve_exposed_port(&self, port: u16) -> Option<String> {
        self.exposed_ports.read().await.resolve(port)
    }
}

#[cfg(unix)]
fn terminate_process(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
}

#[cfg(not(unix))]
fn terminate_process(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn state_of_unknown_task_is_synthetic() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = AutomationRuntime::new(dir.path().join("state.json")).await.unwrap();
        let state = runtime.state("nope").await;
        assert_eq!(state.status, TaskStatus::Unknown);
        assert_eq!(state.last_error.as_deref(), Some("task not found"));
    }

    #[tokio::test]
    async fn cancel_of_unknown_task_is_synthetic() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = AutomationRuntime::new(dir.path().join("state.json")).await.unwrap();
        let state = runtime.cancel("nope").await;
        assert_eq!(state.status, TaskStatus::Unknown);
    }

    #[tokio::test]
    async fn start_rejects_empty_task_id() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = AutomationRuntime::new(dir.path().join("state.json")).await.unwrap();
        let err = runtime.start("  ".into(), vec![], 10.0).await.unwrap_err();
        assert!(matches!(err, AutomationError::Validation(_)));
    }
}
