// SPDX-License-Identifier: MIT

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("io error at {path:?}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("another agent instance is already running (pid {0})")]
    AlreadyRunning(i32),
    #[error("refused to take over the running instance")]
    TakeoverDeclined,
    #[error("websocket dial failed: {0}")]
    Dial(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("gateway rejected authentication: {0}")]
    AuthRejected(String),
    #[error("gateway connection closed unexpectedly")]
    ConnectionClosed,
}
