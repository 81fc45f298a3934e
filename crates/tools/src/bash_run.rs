//! Shell execution tool.
//!
//! The sandbox validates commands before the executor is reached; the tool
//! applies the same blocklist again so it stays safe when invoked directly.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use talon_core::{CallContext, Error, Result, Tool, ToolResult};
use talon_security::CommandPolicy;

pub struct BashRunTool {
    policy: CommandPolicy,
}

impl BashRunTool {
    pub fn new(policy: CommandPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for BashRunTool {
    fn name(&self) -> &str {
        "bash_run"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its stdout/stderr. Use for running programs, \
         inspecting files, and git operations."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, _call: &CallContext, input: serde_json::Value) -> Result<ToolResult> {
        let command = input["command"].as_str().ok_or_else(|| Error::InvalidToolArgs {
            tool: "bash_run".into(),
            reason: "missing 'command'".into(),
        })?;
        self.policy.validate(command)?;

        debug!(%command, "executing shell command");
        // The registry aborts this future at the run deadline; make sure the
        // child dies with it.
        let output = if cfg!(target_os = "windows") {
            Command::new("cmd")
                .args(["/C", command])
                .kill_on_drop(true)
                .output()
                .await
        } else {
            Command::new("sh")
                .args(["-c", command])
                .kill_on_drop(true)
                .output()
                .await
        };

        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let code = output.status.code().unwrap_or(-1);
                let text = if output.status.success() {
                    if stderr.is_empty() {
                        stdout.to_string()
                    } else {
                        format!("{stdout}\n[stderr]: {stderr}")
                    }
                } else {
                    warn!(%command, exit_code = code, "command failed");
                    format!("[exit code: {code}]\n{stdout}\n{stderr}")
                };
                Ok(ToolResult::ok("", "bash_run", text.trim())
                    .with_metadata("exit_code", code.into()))
            }
            Err(e) => Err(Error::ToolExecutionFailed {
                tool: "bash_run".into(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_runs() {
        let tool = BashRunTool::new(CommandPolicy::permissive());
        let result = tool
            .execute(
                &CallContext::unbounded(),
                serde_json::json!({"command": "echo hello"}),
            )
            .await
            .unwrap();
        assert!(result.output.contains("hello"));
        assert_eq!(result.metadata["exit_code"], 0);
    }

    #[tokio::test]
    async fn blocked_phrase_refused() {
        let tool = BashRunTool::new(CommandPolicy::default());
        let err = tool
            .execute(
                &CallContext::unbounded(),
                serde_json::json!({"command": "rm -rf /"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BlockedCommand(_)));
    }

    #[tokio::test]
    async fn failing_command_reports_exit_code() {
        let tool = BashRunTool::new(CommandPolicy::permissive());
        let result = tool
            .execute(
                &CallContext::unbounded(),
                serde_json::json!({"command": "exit 3"}),
            )
            .await
            .unwrap();
        assert!(result.output.contains("exit code: 3"));
    }
}
