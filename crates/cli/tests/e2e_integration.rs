//! End-to-end integration tests for the Talon runtime: full stack from a
//! settings record through the assembled runner, with durable sessions.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use talon_config::{Layer, Settings};
use talon_core::{
    AgentContext, CallContext, Model, ModelOutput, Result, RunMode, RunRequest, StopReason,
    ToolCall, KEY_PROMPT,
};
use talon_gateway::build_runtime;

/// Answers with a file-write tool call first, then summarises.
struct WriterModel;

#[async_trait]
impl Model for WriterModel {
    fn name(&self) -> &str {
        "writer"
    }

    async fn generate(&self, call: &CallContext, agent: &AgentContext) -> Result<ModelOutput> {
        call.check()?;
        match agent.iteration {
            0 => Ok(ModelOutput::with_tool_calls(
                "writing the note",
                vec![ToolCall {
                    id: "write-1".into(),
                    name: "file_write".into(),
                    input: serde_json::json!({
                        "path": "notes/answer.txt",
                        "content": "forty-two"
                    }),
                }],
            )),
            _ => {
                let prompt = agent
                    .values
                    .get(KEY_PROMPT)
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default();
                let wrote = agent
                    .tool_results
                    .last()
                    .map(|r| r.success())
                    .unwrap_or(false);
                Ok(ModelOutput::text(format!(
                    "prompt was '{prompt}'; note written: {wrote}"
                )))
            }
        }
    }
}

fn settings_for(workdir: &std::path::Path, session_dir: &std::path::Path) -> Settings {
    let mut settings = Settings::resolve(vec![(
        Layer::Runtime,
        serde_json::json!({
            "max_iterations": 5,
            "working_set": [workdir.display().to_string()],
            "session": {
                "backend": "file",
                "dir": session_dir.display().to_string()
            }
        }),
    )])
    .unwrap();
    settings.run_timeout_ms = 30_000;
    settings
}

#[tokio::test]
async fn full_stack_run_with_durable_sessions() {
    let workdir = tempfile::tempdir().unwrap();
    let session_dir = tempfile::tempdir().unwrap();
    let settings = settings_for(workdir.path(), session_dir.path());

    let runner = build_runtime(&settings, Arc::new(WriterModel)).unwrap();
    let response = runner
        .run(RunRequest::new("write the answer down", RunMode::Cli))
        .await
        .unwrap();

    assert_eq!(response.stop_reason, StopReason::Done);
    assert_eq!(response.iterations, 2);
    assert!(response.output.contains("note written: true"));
    assert!(response.sandbox_report.is_empty());

    // The tool actually wrote inside the working set.
    let note = std::fs::read_to_string(workdir.path().join("notes/answer.txt")).unwrap();
    assert_eq!(note, "forty-two");

    // The session survived to disk and can be reloaded by a fresh runner.
    let second = build_runtime(&settings, Arc::new(WriterModel)).unwrap();
    let session = second.store().load(&response.session_id).await.unwrap();
    assert!(!session.transcript.is_empty());
    assert!(session.bookmark("iteration-0").is_some());
}

#[tokio::test]
async fn escape_attempt_is_reported_not_fatal() {
    /// Tries to read outside the working set, then finishes.
    struct EscapeModel;

    #[async_trait]
    impl Model for EscapeModel {
        fn name(&self) -> &str {
            "escape"
        }
        async fn generate(
            &self,
            _call: &CallContext,
            agent: &AgentContext,
        ) -> Result<ModelOutput> {
            match agent.iteration {
                0 => Ok(ModelOutput::with_tool_calls(
                    "sneaking",
                    vec![ToolCall {
                        id: "read-1".into(),
                        name: "file_read".into(),
                        input: serde_json::json!({ "path": "/etc/shadow" }),
                    }],
                )),
                _ => Ok(ModelOutput::text("gave up")),
            }
        }
    }

    let workdir = tempfile::tempdir().unwrap();
    let session_dir = tempfile::tempdir().unwrap();
    let settings = settings_for(workdir.path(), session_dir.path());

    let runner = build_runtime(&settings, Arc::new(EscapeModel)).unwrap();
    let response = runner
        .run(RunRequest::new("try to escape", RunMode::Ci))
        .await
        .unwrap();

    assert_eq!(response.stop_reason, StopReason::Done);
    assert_eq!(response.sandbox_report.len(), 1);
    assert_eq!(
        response.sandbox_report[0].kind,
        talon_core::ErrorKind::PathEscape
    );
}

#[tokio::test]
async fn run_timeout_is_enforced() {
    /// Never returns within the run budget.
    struct StallModel;

    #[async_trait]
    impl Model for StallModel {
        fn name(&self) -> &str {
            "stall"
        }
        async fn generate(
            &self,
            call: &CallContext,
            _agent: &AgentContext,
        ) -> Result<ModelOutput> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            call.check()?;
            Ok(ModelOutput::text("too late"))
        }
    }

    let workdir = tempfile::tempdir().unwrap();
    let session_dir = tempfile::tempdir().unwrap();
    let settings = settings_for(workdir.path(), session_dir.path());

    let runner = build_runtime(&settings, Arc::new(StallModel)).unwrap();
    let request = RunRequest::new("hang", RunMode::Http).with_timeout(Duration::from_millis(100));
    let err = runner.run(request).await.unwrap_err();
    assert_eq!(err.kind(), talon_core::ErrorKind::Timeout);
}
