// SPDX-License-Identifier: MIT

use crate::context::HandlerContext;
use crate::error::{classify, to_json, HandlersError};
use crate::traits::{AsyncHandler, HandlerResponse};
use async_trait::async_trait;
use portacode_core::RouterError;
use portacode_hostops::write_text;
use portacode_wire::CommandFrame;
use serde::Serialize;

#[derive(Serialize)]
struct DirEntryDto {
    name: String,
    is_dir: bool,
}

pub struct FsReadHandler;

#[async_trait]
impl AsyncHandler for FsReadHandler {
    async fn handle(&self, _ctx: &HandlerContext, frame: CommandFrame) -> Result<HandlerResponse, RouterError> {
        let CommandFrame::FsRead(p) = frame else {
            return Err(RouterError::validation("fs_read handler received a different frame"));
        };
        let content = tokio::fs::read(&p.path)
            .await
            .map_err(|e| HandlersError::Io { path: p.path.clone(), source: e })
            .map_err(classify)?;
        let content = String::from_utf8(content).map_err(|_| classify(HandlersError::NotUtf8(p.path.clone())))?;
        Ok(HandlerResponse::new("fs_read_response", to_json(&serde_json::json!({ "path": p.path, "content": content }))?))
    }
}

pub struct FsListHandler;

#[async_trait]
impl AsyncHandler for FsListHandler {
    async fn handle(&self, _ctx: &HandlerContext, frame: CommandFrame) -> Result<HandlerResponse, RouterError> {
        let CommandFrame::FsList(p) = frame else {
            return Err(RouterError::validation("fs_list handler received a different frame"));
        };
        let mut reader =
            tokio::fs::read_dir(&p.path).await.map_err(|e| HandlersError::Io { path: p.path.clone(), source: e }).map_err(classify)?;
        let mut entries = Vec::new();
        loop {
            let next = reader.next_entry().await.map_err(|e| HandlersError::Io { path: p.path.clone(), source: e }).map_err(classify)?;
            let Some(entry) = next else { break };
            let file_type = entry.file_type().await.map_err(|e| HandlersError::Io { path: p.path.clone(), source: e }).map_err(classify)?;
            let name = entry.file_name().into_string().map_err(|_| classify(HandlersError::NotUtf8(p.path.clone())))?;
            entries.push(DirEntryDto { name, is_dir: file_type.is_dir() });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(HandlerResponse::new("fs_list_response", to_json(&serde_json::json!({ "path": p.path, "entries": entries }))?))
    }
}

pub struct FsWriteHandler;

#[async_trait]
impl AsyncHandler for FsWriteHandler {
    async fn handle(&self, _ctx: &HandlerContext, frame: CommandFrame) -> Result<HandlerResponse, RouterError> {
        let CommandFrame::FsWrite(p) = frame else {
            return Err(RouterError::validation("fs_write handler received a different frame"));
        };
        write_text(std::path::Path::new(&p.path), &p.content, 0o644).await.map_err(HandlersError::from).map_err(classify)?;
        Ok(HandlerResponse::new("fs_write_response", to_json(&serde_json::json!({ "path": p.path }))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::tests::test_ctx;
    use portacode_wire::{CommandEnvelope, FsListPayload, FsReadPayload, FsWritePayload};

    #[tokio::test]
    async fn write_then_read_round_trips_content() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;
        let file_path = dir.path().join("note.txt");

        let write_frame = CommandFrame::FsWrite(FsWritePayload {
            envelope: CommandEnvelope::default(),
            path: file_path.to_string_lossy().into_owned(),
            content: "hello world".into(),
        });
        FsWriteHandler.handle(&ctx, write_frame).await.unwrap();

        let read_frame = CommandFrame::FsRead(FsReadPayload {
            envelope: CommandEnvelope::default(),
            path: file_path.to_string_lossy().into_owned(),
        });
        let response = FsReadHandler.handle(&ctx, read_frame).await.unwrap();
        assert_eq!(response.payload["content"], "hello world");
    }

    #[tokio::test]
    async fn list_reports_sorted_entries() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();

        let frame =
            CommandFrame::FsList(FsListPayload { envelope: CommandEnvelope::default(), path: dir.path().to_string_lossy().into_owned() });
        let response = FsListHandler.handle(&ctx, frame).await.unwrap();
        let names: Vec<String> =
            response.payload["entries"].as_array().unwrap().iter().map(|e| e["name"].as_str().unwrap().to_string()).collect();
        assert!(names.contains(&"a.txt".to_string()));
        assert!(names.contains(&"b.txt".to_string()));
    }
}
