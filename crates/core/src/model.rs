//! Model adapter trait — the abstraction over language-model backends.
//!
//! The runtime never speaks a provider wire format itself; it hands the
//! accumulated [`AgentContext`] to a [`Model`] and receives a
//! [`ModelOutput`] per iteration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::{AgentContext, CallContext};
use crate::error::Result;
use crate::tool::ToolCall;

/// Token usage for one model call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Accumulate another call's usage into this one.
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// One iteration's worth of model output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelOutput {
    /// Textual content for the user.
    #[serde(default)]
    pub content: String,

    /// Tool invocations the model is requesting this iteration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// The model considers the task finished; the loop terminates with
    /// stop reason `done` even if tool calls are present.
    #[serde(default)]
    pub done: bool,

    /// Token accounting, when the adapter reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Provider-reported stop reason, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<String>,
}

impl ModelOutput {
    /// A plain final text answer.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            done: true,
            ..Self::default()
        }
    }

    /// An intermediate output requesting tool calls.
    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            ..Self::default()
        }
    }
}

/// The model adapter contract.
///
/// Adapters may be invoked concurrently across runs and must honour the
/// [`CallContext`] cancellation/deadline.
#[async_trait]
pub trait Model: Send + Sync {
    /// A short human-readable adapter name, used in logs and events.
    fn name(&self) -> &str;

    /// Produce the next [`ModelOutput`] given everything accumulated so far.
    async fn generate(&self, call: &CallContext, agent: &AgentContext) -> Result<ModelOutput>;
}
