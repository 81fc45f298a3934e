//! Task delegation tool — records named sub-tasks for later pickup.
//!
//! The runtime core does not spawn nested agents; delegated tasks are
//! queued with an id so an orchestrating caller can schedule them as
//! follow-up runs.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Mutex;
use uuid::Uuid;

use talon_core::{CallContext, Error, Result, Tool, ToolResult};

#[derive(Debug, Clone, Serialize)]
struct TaskRecord {
    id: String,
    title: String,
    detail: String,
    status: String,
}

#[derive(Default)]
pub struct TaskTool {
    tasks: Mutex<Vec<TaskRecord>>,
}

impl TaskTool {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        "task"
    }

    fn description(&self) -> &str {
        "Delegate a named sub-task. Actions: add (title, detail), list. Queued tasks are \
         picked up by the caller as separate runs."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["add", "list"],
                    "description": "What to do"
                },
                "title": { "type": "string", "description": "Short task title (for add)" },
                "detail": { "type": "string", "description": "Full task description (for add)" }
            },
            "required": ["action"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, _call: &CallContext, input: serde_json::Value) -> Result<ToolResult> {
        let action = input["action"].as_str().unwrap_or("list");
        let mut tasks = self.tasks.lock().map_err(|_| Error::ToolExecutionFailed {
            tool: "task".into(),
            reason: "task state poisoned".into(),
        })?;

        match action {
            "add" => {
                let title = input["title"].as_str().ok_or_else(|| Error::InvalidToolArgs {
                    tool: "task".into(),
                    reason: "'add' requires 'title'".into(),
                })?;
                let record = TaskRecord {
                    id: Uuid::new_v4().to_string(),
                    title: title.into(),
                    detail: input["detail"].as_str().unwrap_or_default().into(),
                    status: "queued".into(),
                };
                let id = record.id.clone();
                tasks.push(record);
                Ok(
                    ToolResult::ok("", "task", format!("queued task '{title}'"))
                        .with_metadata("task_id", id.into()),
                )
            }
            _ => {
                let output = serde_json::to_string_pretty(&*tasks)?;
                Ok(ToolResult::ok("", "task", output)
                    .with_metadata("count", tasks.len().into()))
            }
        }
    }
}
