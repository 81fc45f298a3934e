//! File reading tool, confined to the working set.

use async_trait::async_trait;
use std::path::PathBuf;

use talon_core::{CallContext, Error, Result, Tool, ToolResult};
use talon_security::resolve_path;

const MAX_READ_BYTES: usize = 128 * 1024;

pub struct FileReadTool {
    working_set: Vec<PathBuf>,
}

impl FileReadTool {
    pub fn new(working_set: Vec<PathBuf>) -> Self {
        Self { working_set }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read a text file from the working set and return its contents."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file, absolute or relative to the working set"
                }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, _call: &CallContext, input: serde_json::Value) -> Result<ToolResult> {
        let raw = input["path"].as_str().ok_or_else(|| Error::InvalidToolArgs {
            tool: "file_read".into(),
            reason: "missing 'path'".into(),
        })?;
        let path = resolve_path(raw, &self.working_set)?;

        let content = std::fs::read_to_string(&path).map_err(|e| Error::ToolExecutionFailed {
            tool: "file_read".into(),
            reason: format!("{}: {e}", path.display()),
        })?;

        let truncated = content.len() > MAX_READ_BYTES;
        let mut text = if truncated {
            let mut end = MAX_READ_BYTES;
            while !content.is_char_boundary(end) {
                end -= 1;
            }
            content[..end].to_string()
        } else {
            content
        };
        if truncated {
            text.push_str("\n[... truncated]");
        }

        Ok(ToolResult::ok("", "file_read", text)
            .with_metadata("path", path.display().to_string().into())
            .with_metadata("truncated", truncated.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reads_file_in_working_set() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("note.txt"), "remember the milk").unwrap();
        let tool = FileReadTool::new(vec![dir.path().to_path_buf()]);
        let result = tool
            .execute(
                &CallContext::unbounded(),
                serde_json::json!({"path": "note.txt"}),
            )
            .await
            .unwrap();
        assert_eq!(result.output, "remember the milk");
    }

    #[tokio::test]
    async fn escape_refused() {
        let dir = TempDir::new().unwrap();
        let tool = FileReadTool::new(vec![dir.path().to_path_buf()]);
        let err = tool
            .execute(
                &CallContext::unbounded(),
                serde_json::json!({"path": "../../etc/passwd"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PathEscape { .. }));
    }

    #[tokio::test]
    async fn missing_file_is_execution_failure() {
        let dir = TempDir::new().unwrap();
        let tool = FileReadTool::new(vec![dir.path().to_path_buf()]);
        let err = tool
            .execute(
                &CallContext::unbounded(),
                serde_json::json!({"path": "ghost.txt"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolExecutionFailed { .. }));
    }
}
