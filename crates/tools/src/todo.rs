//! In-run todo list tool — lets the model track its own plan.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Mutex;

use talon_core::{CallContext, Error, Result, Tool, ToolResult};

#[derive(Debug, Clone, Serialize)]
struct TodoItem {
    id: usize,
    text: String,
    done: bool,
}

#[derive(Default)]
pub struct TodoTool {
    items: Mutex<Vec<TodoItem>>,
}

impl TodoTool {
    pub fn new() -> Self {
        Self::default()
    }

    fn render(items: &[TodoItem]) -> String {
        if items.is_empty() {
            return "no todos".into();
        }
        items
            .iter()
            .map(|item| {
                format!(
                    "{} [{}] {}",
                    item.id,
                    if item.done { "x" } else { " " },
                    item.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl Tool for TodoTool {
    fn name(&self) -> &str {
        "todo"
    }

    fn description(&self) -> &str {
        "Track a todo list across iterations. Actions: add (text), done (id), list."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["add", "done", "list"],
                    "description": "What to do"
                },
                "text": { "type": "string", "description": "Todo text (for add)" },
                "id": { "type": "integer", "description": "Todo id (for done)" }
            },
            "required": ["action"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, _call: &CallContext, input: serde_json::Value) -> Result<ToolResult> {
        let action = input["action"].as_str().unwrap_or("list");
        let mut items = self.items.lock().map_err(|_| Error::ToolExecutionFailed {
            tool: "todo".into(),
            reason: "todo state poisoned".into(),
        })?;

        match action {
            "add" => {
                let text = input["text"].as_str().ok_or_else(|| Error::InvalidToolArgs {
                    tool: "todo".into(),
                    reason: "'add' requires 'text'".into(),
                })?;
                let id = items.len() + 1;
                items.push(TodoItem {
                    id,
                    text: text.into(),
                    done: false,
                });
                Ok(ToolResult::ok("", "todo", format!("added todo {id}: {text}")))
            }
            "done" => {
                let id = input["id"].as_u64().ok_or_else(|| Error::InvalidToolArgs {
                    tool: "todo".into(),
                    reason: "'done' requires 'id'".into(),
                })? as usize;
                match items.iter_mut().find(|item| item.id == id) {
                    Some(item) => {
                        item.done = true;
                        Ok(ToolResult::ok("", "todo", format!("todo {id} done")))
                    }
                    None => Err(Error::ToolExecutionFailed {
                        tool: "todo".into(),
                        reason: format!("no todo with id {id}"),
                    }),
                }
            }
            _ => Ok(ToolResult::ok("", "todo", Self::render(&items))),
        }
    }
}
