//! Filename pattern matching over the working set.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use talon_core::{CallContext, Error, Result, Tool, ToolResult};
use talon_security::resolve_path;

const MAX_RESULTS: usize = 100;

pub struct GlobTool {
    working_set: Vec<PathBuf>,
}

impl GlobTool {
    pub fn new(working_set: Vec<PathBuf>) -> Self {
        Self { working_set }
    }
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (e.g. \"**/*.rs\"). Returns paths relative to \
         the searched directory, capped at 100 results. Hidden files are skipped."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Glob pattern to match" },
                "path": {
                    "type": "string",
                    "description": "Base directory (default: the working set root)"
                }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, _call: &CallContext, input: serde_json::Value) -> Result<ToolResult> {
        let pattern = input["pattern"].as_str().ok_or_else(|| Error::InvalidToolArgs {
            tool: "glob".into(),
            reason: "missing 'pattern'".into(),
        })?;
        let pattern = ::glob::Pattern::new(pattern).map_err(|e| Error::InvalidToolArgs {
            tool: "glob".into(),
            reason: format!("invalid pattern: {e}"),
        })?;

        let root = match input["path"].as_str() {
            Some(raw) => resolve_path(raw, &self.working_set)?,
            None => self
                .working_set
                .first()
                .cloned()
                .ok_or_else(|| Error::PathEscape { path: ".".into() })?,
        };

        let matches = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            walk(&root, &root, &pattern, &mut out);
            out.sort();
            out
        })
        .await
        .map_err(|e| Error::ToolExecutionFailed {
            tool: "glob".into(),
            reason: format!("walk task failed: {e}"),
        })?;

        let total = matches.len();
        let output = if matches.is_empty() {
            "no matches".to_string()
        } else {
            matches.join("\n")
        };
        Ok(ToolResult::ok("", "glob", output).with_metadata("matches", total.into()))
    }
}

fn walk(root: &Path, dir: &Path, pattern: &::glob::Pattern, out: &mut Vec<String>) {
    if out.len() >= MAX_RESULTS {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut children: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    children.sort();
    for child in children {
        if out.len() >= MAX_RESULTS {
            return;
        }
        if child
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'))
        {
            continue;
        }
        if child.is_dir() {
            walk(root, &child, pattern, out);
        } else if let Ok(relative) = child.strip_prefix(root) {
            let relative = relative.to_string_lossy().replace('\\', "/");
            if pattern.matches(&relative) {
                out.push(relative);
            }
        }
    }
}
