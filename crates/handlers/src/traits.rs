// SPDX-License-Identifier: MIT

use crate::context::HandlerContext;
use async_trait::async_trait;
use portacode_core::RouterError;
use portacode_wire::CommandFrame;
use std::sync::Arc;

/// A handler's successful result: the outbound event name plus its
/// flattened JSON payload. The router stamps `request_id`/`client_sessions`
/// on top (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct HandlerResponse {
    pub event: String,
    pub payload: serde_json::Value,
}

impl HandlerResponse {
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { event: event.into(), payload }
    }
}

/// May suspend on I/O (network, subprocess, async filesystem). The router
/// awaits these directly on the ingest loop's task (spec.md §4.2).
#[async_trait]
pub trait AsyncHandler: Send + Sync {
    async fn handle(&self, ctx: &HandlerContext, frame: CommandFrame) -> Result<HandlerResponse, RouterError>;
}

/// CPU-bound or blocking work. The router runs these on a worker thread via
/// `spawn_blocking` so they never stall the frame-ingest loop (spec.md
/// §4.2's "executed on a worker" requirement).
pub trait SyncHandler: Send + Sync {
    fn handle(&self, ctx: &HandlerContext, frame: CommandFrame) -> Result<HandlerResponse, RouterError>;
}

/// One registered command: either polymorphic shape named in spec.md §4.2.
pub enum RegisteredHandler {
    Async(Box<dyn AsyncHandler>),
    Sync(Arc<dyn SyncHandler>),
}

impl RegisteredHandler {
    /// Run the handler, routing sync handlers onto a blocking worker
    /// thread. `ctx` must be cheaply cloneable since a sync handler's
    /// closure has to own it across the `spawn_blocking` boundary.
    pub async fn dispatch(&self, ctx: Arc<HandlerContext>, frame: CommandFrame) -> Result<HandlerResponse, RouterError> {
        match self {
            RegisteredHandler::Async(handler) => handler.handle(&ctx, frame).await,
            RegisteredHandler::Sync(handler) => {
                let handler = Arc::clone(handler);
                tokio::task::spawn_blocking(move || handler.handle(&ctx, frame))
                    .await
                    .map_err(|e| RouterError::fatal_host(format!("handler panicked: {e}")))?
            }
        }
    }
}
