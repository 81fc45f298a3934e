//! Regex content search over the working set.

use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};

use talon_core::{CallContext, Error, Result, Tool, ToolResult};
use talon_security::resolve_path;

const MAX_MATCHES: usize = 100;
const MAX_FILE_BYTES: u64 = 1024 * 1024;

pub struct GrepTool {
    working_set: Vec<PathBuf>,
}

impl GrepTool {
    pub fn new(working_set: Vec<PathBuf>) -> Self {
        Self { working_set }
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents with a regex pattern. Returns matching lines as \
         path:line_number:line, capped at 100 matches."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Regex pattern to search for" },
                "path": {
                    "type": "string",
                    "description": "File or directory to search (default: the working set root)"
                },
                "include": {
                    "type": "string",
                    "description": "Only search files with this extension (e.g. \"rs\")"
                }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, _call: &CallContext, input: serde_json::Value) -> Result<ToolResult> {
        let pattern = input["pattern"].as_str().ok_or_else(|| Error::InvalidToolArgs {
            tool: "grep".into(),
            reason: "missing 'pattern'".into(),
        })?;
        let regex = Regex::new(pattern).map_err(|e| Error::InvalidToolArgs {
            tool: "grep".into(),
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
        let include = input["include"].as_str().map(str::to_string);

        let matches = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            search(&root, &regex, include.as_deref(), &mut out);
            out
        })
        .await
        .map_err(|e| Error::ToolExecutionFailed {
            tool: "grep".into(),
            reason: format!("search task failed: {e}"),
        })?;

        let total = matches.len();
        let output = if matches.is_empty() {
            "no matches".to_string()
        } else {
            matches.join("\n")
        };
        Ok(ToolResult::ok("", "grep", output).with_metadata("matches", total.into()))
    }
}

fn search(path: &Path, regex: &Regex, include: Option<&str>, out: &mut Vec<String>) {
    if out.len() >= MAX_MATCHES {
        return;
    }
    if path.is_dir() {
        let Ok(entries) = std::fs::read_dir(path) else {
            return;
        };
        let mut children: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        children.sort();
        for child in children {
            // Hidden entries (.git and friends) are skipped.
            if child
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'))
            {
                continue;
            }
            search(&child, regex, include, out);
        }
        return;
    }

    if let Some(ext) = include {
        if path.extension().and_then(|e| e.to_str()) != Some(ext) {
            return;
        }
    }
    if std::fs::metadata(path).map_or(true, |m| m.len() > MAX_FILE_BYTES) {
        return;
    }
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    for (number, line) in content.lines().enumerate() {
        if out.len() >= MAX_MATCHES {
            return;
        }
        if regex.is_match(line) {
            out.push(format!("{}:{}:{}", path.display(), number + 1, line));
        }
    }
}
