// SPDX-License-Identifier: MIT

use crate::context::HandlerContext;
use crate::error::to_json;
use crate::traits::{AsyncHandler, HandlerResponse};
use async_trait::async_trait;
use portacode_core::RouterError;
use portacode_wire::CommandFrame;

pub struct StatusHandler;

#[async_trait]
impl AsyncHandler for StatusHandler {
    async fn handle(&self, ctx: &HandlerContext, frame: CommandFrame) -> Result<HandlerResponse, RouterError> {
        if !matches!(frame, CommandFrame::Status(_)) {
            return Err(RouterError::validation("status handler received a different frame"));
        }
        let active_task_id = ctx.automation.active_task_id().await;
        Ok(HandlerResponse::new(
            "status_response",
            to_json(&serde_json::json!({
                "uptime_seconds": ctx.uptime_seconds(),
                "fingerprint": ctx.fingerprint,
                "active_task_id": active_task_id,
                "connected": ctx.connection.is_connected(),
            }))?,
        ))
    }
}

/// Replies with `update_portacode_response` and exits the process with
/// code 42 so the process supervisor relaunches into the freshly-updated
/// binary (spec.md [HANDLERS]). The reply is sent directly through
/// `ctx.outbound` because a handler that merely returns a response can't
/// guarantee it reaches the wire before the process is gone.
pub struct UpdatePortacodeCliHandler;

#[async_trait]
impl AsyncHandler for UpdatePortacodeCliHandler {
    async fn handle(&self, ctx: &HandlerContext, frame: CommandFrame) -> Result<HandlerResponse, RouterError> {
        if !matches!(frame, CommandFrame::UpdatePortacodeCli(_)) {
            return Err(RouterError::validation("update_portacode_cli handler received a different frame"));
        }
        ctx.outbound.send("update_portacode_response", serde_json::json!({ "accepted": true })).await;
        ctx.process.exit(42);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::tests::test_ctx;
    use portacode_wire::{CommandEnvelope, StatusPayload};

    #[tokio::test]
    async fn status_reports_uptime_and_connection() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;
        let frame = CommandFrame::Status(StatusPayload { envelope: CommandEnvelope::default() });
        let response = StatusHandler.handle(&ctx, frame).await.unwrap();
        assert_eq!(response.payload["connected"], true);
        assert!(response.payload["active_task_id"].is_null());
    }
}
