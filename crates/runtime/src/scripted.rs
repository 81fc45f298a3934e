//! Scripted model adapter — iteration-indexed canned outputs.
//!
//! Used by the CLI when no real provider is wired up, and by tests that
//! need deterministic model behaviour.

use async_trait::async_trait;

use talon_core::{AgentContext, CallContext, Error, Model, ModelOutput, Result};

/// Replays a fixed list of outputs, one per iteration. Iterations past the
/// end of the script return a final `done` output.
pub struct ScriptedModel {
    name: String,
    outputs: Vec<ModelOutput>,
    repeat_last: bool,
}

impl ScriptedModel {
    pub fn new(outputs: Vec<ModelOutput>) -> Self {
        Self {
            name: "scripted".into(),
            outputs,
            repeat_last: false,
        }
    }

    /// A model that always answers with the same final text.
    pub fn always_text(content: impl Into<String>) -> Self {
        Self::new(vec![ModelOutput::text(content)])
    }

    /// Replay the last scripted output verbatim (tool calls included) for
    /// every iteration past the end, instead of forcing termination.
    pub fn repeating(mut self) -> Self {
        self.repeat_last = true;
        self
    }
}

#[async_trait]
impl Model for ScriptedModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, call: &CallContext, agent: &AgentContext) -> Result<ModelOutput> {
        call.check()?;
        let index = agent.iteration as usize;
        match self.outputs.get(index) {
            Some(output) => Ok(output.clone()),
            None if self.repeat_last => Ok(self
                .outputs
                .last()
                .cloned()
                .unwrap_or_else(|| ModelOutput::text("script exhausted"))),
            None => Ok(self
                .outputs
                .last()
                .cloned()
                .map(|mut last| {
                    last.done = true;
                    last.tool_calls.clear();
                    last
                })
                .unwrap_or_else(|| ModelOutput::text("script exhausted"))),
        }
    }
}

/// A model that always fails; for exercising the error path.
pub struct FailingModel;

#[async_trait]
impl Model for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _call: &CallContext, _agent: &AgentContext) -> Result<ModelOutput> {
        Err(Error::ModelError("synthetic provider failure".into()))
    }
}
