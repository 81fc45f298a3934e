//! Exact-match file editing tool.

use async_trait::async_trait;
use std::path::PathBuf;

use talon_core::{CallContext, Error, Result, Tool, ToolResult};
use talon_security::resolve_path;

pub struct FileEditTool {
    working_set: Vec<PathBuf>,
}

impl FileEditTool {
    pub fn new(working_set: Vec<PathBuf>) -> Self {
        Self { working_set }
    }
}

#[async_trait]
impl Tool for FileEditTool {
    fn name(&self) -> &str {
        "file_edit"
    }

    fn description(&self) -> &str {
        "Replace an exact text fragment in a file. The fragment must match exactly once \
         unless replace_all is set."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File to edit" },
                "old_text": { "type": "string", "description": "Exact text to replace" },
                "new_text": { "type": "string", "description": "Replacement text" },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence (default: false)"
                }
            },
            "required": ["path", "old_text", "new_text"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, _call: &CallContext, input: serde_json::Value) -> Result<ToolResult> {
        let raw = input["path"].as_str().ok_or_else(|| Error::InvalidToolArgs {
            tool: "file_edit".into(),
            reason: "missing 'path'".into(),
        })?;
        let old_text = input["old_text"].as_str().ok_or_else(|| Error::InvalidToolArgs {
            tool: "file_edit".into(),
            reason: "missing 'old_text'".into(),
        })?;
        let new_text = input["new_text"].as_str().unwrap_or_default();
        let replace_all = input["replace_all"].as_bool().unwrap_or(false);
        if old_text.is_empty() {
            return Err(Error::InvalidToolArgs {
                tool: "file_edit".into(),
                reason: "'old_text' must not be empty".into(),
            });
        }

        let path = resolve_path(raw, &self.working_set)?;
        let content = std::fs::read_to_string(&path).map_err(|e| Error::ToolExecutionFailed {
            tool: "file_edit".into(),
            reason: format!("{}: {e}", path.display()),
        })?;

        let occurrences = content.matches(old_text).count();
        if occurrences == 0 {
            return Err(Error::ToolExecutionFailed {
                tool: "file_edit".into(),
                reason: "old_text not found in file".into(),
            });
        }
        if occurrences > 1 && !replace_all {
            return Err(Error::ToolExecutionFailed {
                tool: "file_edit".into(),
                reason: format!(
                    "old_text matches {occurrences} times; pass replace_all to replace every occurrence"
                ),
            });
        }

        let updated = if replace_all {
            content.replace(old_text, new_text)
        } else {
            content.replacen(old_text, new_text, 1)
        };
        std::fs::write(&path, updated).map_err(|e| Error::ToolExecutionFailed {
            tool: "file_edit".into(),
            reason: format!("write {}: {e}", path.display()),
        })?;

        let replaced = if replace_all { occurrences } else { 1 };
        Ok(ToolResult::ok(
            "",
            "file_edit",
            format!("replaced {replaced} occurrence(s) in {}", path.display()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(content: &str) -> (TempDir, FileEditTool) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f.txt"), content).unwrap();
        let tool = FileEditTool::new(vec![dir.path().to_path_buf()]);
        (dir, tool)
    }

    #[tokio::test]
    async fn single_replacement() {
        let (dir, tool) = setup("hello world");
        tool.execute(
            &CallContext::unbounded(),
            serde_json::json!({"path": "f.txt", "old_text": "world", "new_text": "talon"}),
        )
        .await
        .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("f.txt")).unwrap(),
            "hello talon"
        );
    }

    #[tokio::test]
    async fn ambiguous_match_requires_replace_all() {
        let (dir, tool) = setup("a a a");
        let err = tool
            .execute(
                &CallContext::unbounded(),
                serde_json::json!({"path": "f.txt", "old_text": "a", "new_text": "b"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolExecutionFailed { .. }));

        tool.execute(
            &CallContext::unbounded(),
            serde_json::json!({"path": "f.txt", "old_text": "a", "new_text": "b", "replace_all": true}),
        )
        .await
        .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("f.txt")).unwrap(),
            "b b b"
        );
    }

    #[tokio::test]
    async fn missing_fragment_fails() {
        let (_dir, tool) = setup("content");
        let err = tool
            .execute(
                &CallContext::unbounded(),
                serde_json::json!({"path": "f.txt", "old_text": "absent", "new_text": "x"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolExecutionFailed { .. }));
    }
}
