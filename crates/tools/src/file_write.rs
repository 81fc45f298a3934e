//! File writing tool, confined to the working set.

use async_trait::async_trait;
use std::path::PathBuf;

use talon_core::{CallContext, Error, Result, Tool, ToolResult};
use talon_security::resolve_path;

pub struct FileWriteTool {
    working_set: Vec<PathBuf>,
}

impl FileWriteTool {
    pub fn new(working_set: Vec<PathBuf>) -> Self {
        Self { working_set }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file in the working set, creating parent directories as needed. \
         Overwrites existing content."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Target file path" },
                "content": { "type": "string", "description": "Content to write" }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, _call: &CallContext, input: serde_json::Value) -> Result<ToolResult> {
        let raw = input["path"].as_str().ok_or_else(|| Error::InvalidToolArgs {
            tool: "file_write".into(),
            reason: "missing 'path'".into(),
        })?;
        let content = input["content"].as_str().ok_or_else(|| Error::InvalidToolArgs {
            tool: "file_write".into(),
            reason: "missing 'content'".into(),
        })?;
        let path = resolve_path(raw, &self.working_set)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::ToolExecutionFailed {
                tool: "file_write".into(),
                reason: format!("create {}: {e}", parent.display()),
            })?;
        }
        std::fs::write(&path, content).map_err(|e| Error::ToolExecutionFailed {
            tool: "file_write".into(),
            reason: format!("write {}: {e}", path.display()),
        })?;

        Ok(ToolResult::ok(
            "",
            "file_write",
            format!("wrote {} bytes to {}", content.len(), path.display()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn writes_and_creates_parents() {
        let dir = TempDir::new().unwrap();
        let tool = FileWriteTool::new(vec![dir.path().to_path_buf()]);
        tool.execute(
            &CallContext::unbounded(),
            serde_json::json!({"path": "deep/nested/file.txt", "content": "data"}),
        )
        .await
        .unwrap();
        let written = std::fs::read_to_string(dir.path().join("deep/nested/file.txt")).unwrap();
        assert_eq!(written, "data");
    }

    #[tokio::test]
    async fn escape_refused() {
        let dir = TempDir::new().unwrap();
        let tool = FileWriteTool::new(vec![dir.path().to_path_buf()]);
        let err = tool
            .execute(
                &CallContext::unbounded(),
                serde_json::json!({"path": "/etc/evil.txt", "content": "x"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PathEscape { .. }));
    }
}
