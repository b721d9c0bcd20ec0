// SPDX-License-Identifier: MIT

//! Plain piped-subprocess terminals (spec.md [HANDLERS]): a login shell
//! wired to stdin/stdout pipes. This is explicitly not a real PTY -- no job
//! control, no resize ioctl, no termios -- just line/byte plumbing to a
//! child process, which is all the spec asks for.

use crate::context::OutboundSink;
use crate::error::HandlersError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdin};

struct OpenTerminal {
    child: Child,
    stdin: ChildStdin,
}

/// Tracks the set of terminals this agent currently has open, keyed by an
/// id the client chooses when it sends `terminal_open`.
pub struct TerminalRegistry {
    outbound: Arc<dyn OutboundSink>,
    open: Mutex<HashMap<String, OpenTerminal>>,
}

impl TerminalRegistry {
    pub fn new(outbound: Arc<dyn OutboundSink>) -> Self {
        Self { outbound, open: Mutex::new(HashMap::new()) }
    }

    /// Spawn a login shell for `terminal_id`, wiring its stdout/stderr to
    /// `terminal_output` events tagged with that id as they arrive.
    pub fn open(&self, terminal_id: &str, shell: &str, cwd: Option<&str>) -> Result<(), HandlersError> {
        let mut command = tokio::process::Command::new(shell);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        command.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
        let mut child = command.spawn().map_err(|e| HandlersError::Io { path: shell.to_string(), source: e })?;
        let stdin = child.stdin.take().ok_or_else(|| HandlersError::Io {
            path: shell.to_string(),
            source: std::io::Error::other("child stdin was not piped"),
        })?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        self.spawn_reader(terminal_id.to_string(), stdout);
        self.spawn_reader(terminal_id.to_string(), stderr);

        self.open.lock().insert(terminal_id.to_string(), OpenTerminal { child, stdin });
        Ok(())
    }

    fn spawn_reader(&self, terminal_id: String, pipe: Option<impl tokio::io::AsyncRead + Unpin + Send + 'static>) {
        let Some(mut pipe) = pipe else { return };
        let outbound = self.outbound.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                match pipe.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                        outbound
                            .send("terminal_output", serde_json::json!({ "terminal_id": terminal_id, "data": chunk }))
                            .await;
                    }
                }
            }
        });
    }

    pub async fn write(&self, terminal_id: &str, data: &str) -> Result<(), HandlersError> {
        let mut open = self.open.lock();
        let terminal = open.get_mut(terminal_id).ok_or_else(|| HandlersError::UnknownTerminal(terminal_id.to_string()))?;
        terminal
            .stdin
            .try_write(data.as_bytes())
            .map(|_| ())
            .map_err(|e| HandlersError::Io { path: format!("terminal {terminal_id} stdin"), source: e })
    }

    pub fn close(&self, terminal_id: &str) -> Result<(), HandlersError> {
        let terminal = self.open.lock().remove(terminal_id);
        let Some(mut terminal) = terminal else {
            return Err(HandlersError::UnknownTerminal(terminal_id.to_string()));
        };
        let _ = terminal.child.start_kill();
        Ok(())
    }
}

pub struct TerminalOpenHandler;

#[async_trait::async_trait]
impl crate::traits::AsyncHandler for TerminalOpenHandler {
    async fn handle(
        &self,
        ctx: &HandlerContext,
        frame: portacode_wire::CommandFrame,
    ) -> Result<crate::traits::HandlerResponse, portacode_core::RouterError> {
        let portacode_wire::CommandFrame::TerminalOpen(p) = frame else {
            return Err(portacode_core::RouterError::validation("terminal_open handler received a different frame"));
        };
        let shell = p.shell.unwrap_or_else(|| "/bin/sh".to_string());
        ctx.terminals.open(&p.terminal_id, &shell, p.cwd.as_deref()).map_err(crate::error::classify)?;
        Ok(crate::traits::HandlerResponse::new(
            "terminal_open_response",
            serde_json::json!({ "terminal_id": p.terminal_id }),
        ))
    }
}

pub struct TerminalInputHandler;

#[async_trait::async_trait]
impl crate::traits::AsyncHandler for TerminalInputHandler {
    async fn handle(
        &self,
        ctx: &HandlerContext,
        frame: portacode_wire::CommandFrame,
    ) -> Result<crate::traits::HandlerResponse, portacode_core::RouterError> {
        let portacode_wire::CommandFrame::TerminalInput(p) = frame else {
            return Err(portacode_core::RouterError::validation("terminal_input handler received a different frame"));
        };
        ctx.terminals.write(&p.terminal_id, &p.data).await.map_err(crate::error::classify)?;
        Ok(crate::traits::HandlerResponse::new(
            "terminal_input_response",
            serde_json::json!({ "terminal_id": p.terminal_id }),
        ))
    }
}

pub struct TerminalCloseHandler;

#[async_trait::async_trait]
impl crate::traits::AsyncHandler for TerminalCloseHandler {
    async fn handle(
        &self,
        ctx: &HandlerContext,
        frame: portacode_wire::CommandFrame,
    ) -> Result<crate::traits::HandlerResponse, portacode_core::RouterError> {
        let portacode_wire::CommandFrame::TerminalClose(p) = frame else {
            return Err(portacode_core::RouterError::validation("terminal_close handler received a different frame"));
        };
        ctx.terminals.close(&p.terminal_id).map_err(crate::error::classify)?;
        Ok(crate::traits::HandlerResponse::new(
            "terminal_close_response",
            serde_json::json!({ "terminal_id": p.terminal_id }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoOutbound;

    #[tokio::test]
    async fn open_write_close_round_trips_through_cat() {
        let registry = TerminalRegistry::new(Arc::new(NoOutbound));
        registry.open("t1", "cat", None).unwrap();
        registry.write("t1", "hello\n").await.unwrap();
        registry.close("t1").unwrap();
    }

    #[tokio::test]
    async fn write_to_unknown_terminal_fails() {
        let registry = TerminalRegistry::new(Arc::new(NoOutbound));
        let err = registry.write("missing", "x").await.unwrap_err();
        assert!(matches!(err, HandlersError::UnknownTerminal(_)));
    }
}
