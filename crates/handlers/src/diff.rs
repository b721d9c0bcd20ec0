// SPDX-License-Identifier: MIT

use crate::context::HandlerContext;
use crate::error::{classify, to_json, HandlersError};
use crate::traits::{HandlerResponse, SyncHandler};
use portacode_core::RouterError;
use portacode_wire::CommandFrame;

/// `apply_diff` runs synchronously (context-matching a hand-authored patch
/// is CPU work, not I/O) so it is registered as a [`SyncHandler`] and run on
/// a blocking worker thread (spec.md §4.2).
pub struct ApplyDiffHandler;

impl SyncHandler for ApplyDiffHandler {
    fn handle(&self, _ctx: &HandlerContext, frame: CommandFrame) -> Result<HandlerResponse, RouterError> {
        let CommandFrame::ApplyDiff(p) = frame else {
            return Err(RouterError::validation("apply_diff handler received a different frame"));
        };
        let original = std::fs::read_to_string(&p.path).map_err(|e| HandlersError::Io { path: p.path.clone(), source: e }).map_err(classify)?;
        let updated = apply_unified_diff(&original, &p.diff).map_err(classify)?;
        std::fs::write(&p.path, &updated).map_err(|e| HandlersError::Io { path: p.path.clone(), source: e }).map_err(classify)?;
        Ok(HandlerResponse::new("apply_diff_response", to_json(&serde_json::json!({ "path": p.path }))?))
    }
}

/// Apply a single-file unified diff to `original`. Each hunk's context and
/// removed lines must match the corresponding slice of `original` exactly;
/// a mismatch is rejected rather than guessed at (spec.md [HANDLERS]).
pub fn apply_unified_diff(original: &str, diff: &str) -> Result<String, HandlersError> {
    let source_lines: Vec<&str> = original.lines().collect();
    let mut output: Vec<String> = Vec::new();
    let mut cursor = 0usize;

    let mut lines = diff.lines().peekable();
    while let Some(line) = lines.next() {
        let Some(header) = parse_hunk_header(line) else { continue };
        let start = header.old_start.saturating_sub(1);
        if start < cursor || start > source_lines.len() {
            return Err(HandlersError::DiffMismatch(format!("hunk starting at line {} is out of order or out of range", header.old_start)));
        }
        output.extend(source_lines[cursor..start].iter().map(|s| s.to_string()));
        cursor = start;

        while let Some(&next) = lines.peek() {
            if parse_hunk_header(next).is_some() {
                break;
            }
            let body_line = lines.next().unwrap();
            if body_line.is_empty() {
                continue;
            }
            let (marker, text) = body_line.split_at(1);
            match marker {
                " " => {
                    let expected = source_lines.get(cursor).copied().unwrap_or_default();
                    if expected != text {
                        return Err(HandlersError::DiffMismatch(format!(
                            "context mismatch at line {}: expected {:?}, found {:?}",
                            cursor + 1,
                            expected,
                            text
                        )));
                    }
                    output.push(text.to_string());
                    cursor += 1;
                }
                "-" => {
                    let expected = source_lines.get(cursor).copied().unwrap_or_default();
                    if expected != text {
                        return Err(HandlersError::DiffMismatch(format!(
                            "removed-line mismatch at line {}: expected {:?}, found {:?}",
                            cursor + 1,
                            expected,
                            text
                        )));
                    }
                    cursor += 1;
                }
                "+" => {
                    output.push(text.to_string());
                }
                _ => return Err(HandlersError::DiffMismatch(format!("unrecognized diff line: {body_line:?}"))),
            }
        }
    }

    output.extend(source_lines[cursor..].iter().map(|s| s.to_string()));
    let mut result = output.join("\n");
    if original.ends_with('\n') {
        result.push('\n');
    }
    Ok(result)
}

struct HunkHeader {
    old_start: usize,
}

/// `@@ -old_start,old_count +new_start,new_count @@`. Only `old_start` is
/// needed to locate the hunk in `original`; counts are implied by the body.
fn parse_hunk_header(line: &str) -> Option<HunkHeader> {
    let rest = line.strip_prefix("@@ -")?;
    let old_part = rest.split(|c| c == ' ' || c == ',').next()?;
    let old_start: usize = old_part.parse().ok()?;
    Some(HunkHeader { old_start })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_a_simple_single_hunk_replacement() {
        let original = "line1\nline2\nline3\n";
        let diff = "@@ -2,1 +2,1 @@\n-line2\n+line2 changed\n";
        let result = apply_unified_diff(original, diff).unwrap();
        assert_eq!(result, "line1\nline2 changed\nline3\n");
    }

    #[test]
    fn rejects_a_diff_whose_context_does_not_match() {
        let original = "line1\nline2\nline3\n";
        let diff = "@@ -2,1 +2,1 @@\n-nope\n+line2 changed\n";
        let err = apply_unified_diff(original, diff).unwrap_err();
        assert!(matches!(err, HandlersError::DiffMismatch(_)));
    }

    #[test]
    fn pure_insertion_hunk_keeps_surrounding_lines() {
        let original = "a\nb\nc\n";
        let diff = "@@ -2,0 +2,1 @@\n+inserted\n";
        let result = apply_unified_diff(original, diff).unwrap();
        assert_eq!(result, "a\ninserted\nb\nc\n");
    }

    #[tokio::test]
    async fn handler_applies_a_diff_to_a_real_file() {
        use crate::automation::tests::test_ctx;
        use portacode_wire::{ApplyDiffPayload, CommandEnvelope};

        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "line1\nline2\nline3\n").unwrap();

        let frame = CommandFrame::ApplyDiff(ApplyDiffPayload {
            envelope: CommandEnvelope::default(),
            path: path.to_string_lossy().into_owned(),
            diff: "@@ -2,1 +2,1 @@\n-line2\n+line2 changed\n".into(),
        });
        ApplyDiffHandler.handle(&ctx, frame).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line1\nline2 changed\nline3\n");
    }
}
