//! Run request/response types and the closed set of stop reasons.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::error::{Error, ErrorKind, Result};
use crate::model::Usage;
use crate::tool::ToolCall;

/// Where a run request originated. Carried for logging and policy only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Cli,
    Http,
    Platform,
    Ci,
}

/// A validated request for one end-to-end run of the agent loop.
///
/// Immutable once accepted by the admission gate.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// The user prompt. Must be non-empty after trimming.
    pub prompt: String,

    /// Attach to an existing session, or create a fresh one when `None`.
    pub session_id: Option<String>,

    /// Per-run wall-clock budget.
    pub timeout: Option<Duration>,

    /// Free-form labels echoed into the response.
    pub tags: HashMap<String, String>,

    /// Ordered trait names (routing hints for middlewares).
    pub traits: Vec<String>,

    /// Ordered channel names the caller wants events mirrored to.
    pub channels: Vec<String>,

    /// Arbitrary caller metadata.
    pub metadata: Map<String, Value>,

    /// When non-empty, only these tool names may execute.
    pub tool_whitelist: HashSet<String>,

    pub mode: RunMode,
}

impl RunRequest {
    pub fn new(prompt: impl Into<String>, mode: RunMode) -> Self {
        Self {
            prompt: prompt.into(),
            session_id: None,
            timeout: None,
            tags: HashMap::new(),
            traits: Vec::new(),
            channels: Vec::new(),
            metadata: Map::new(),
            tool_whitelist: HashSet::new(),
            mode,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_whitelist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_whitelist = names
            .into_iter()
            .map(|s| crate::tool::normalize_name(&s.into()))
            .collect();
        self
    }

    /// Reject structurally invalid requests before admission.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(Error::InvalidRequest("prompt must not be empty".into()));
        }
        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                return Err(Error::InvalidRequest("timeout must be positive".into()));
            }
        }
        Ok(())
    }
}

/// Why a run stopped. Closed set; `max_iterations` is a normal stop, not an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Done,
    MaxIterations,
    ModelError,
    ToolErrorFatal,
    Cancelled,
    Timeout,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::MaxIterations => "max_iterations",
            Self::ModelError => "model_error",
            Self::ToolErrorFatal => "tool_error_fatal",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sandbox refusal recorded for the response's security report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxIncident {
    pub call_id: String,
    pub tool: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Aggregated result of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub session_id: String,
    /// Final model content (the last iteration's text).
    pub output: String,
    pub stop_reason: StopReason,
    /// Number of model calls made.
    pub iterations: u32,
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    /// Every tool call the model requested, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Sandbox refusals encountered during the run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sandbox_report: Vec<SandboxIncident>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_prompt_rejected() {
        let req = RunRequest::new("", RunMode::Cli);
        assert!(matches!(req.validate(), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn whitespace_prompt_rejected() {
        let req = RunRequest::new("   \n\t ", RunMode::Http);
        assert!(matches!(req.validate(), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn zero_timeout_rejected() {
        let req = RunRequest::new("hi", RunMode::Cli).with_timeout(Duration::ZERO);
        assert!(req.validate().is_err());
    }

    #[test]
    fn whitelist_is_normalised() {
        let req = RunRequest::new("hi", RunMode::Cli).with_whitelist(["File-Read", "bash run"]);
        assert!(req.tool_whitelist.contains("file_read"));
        assert!(req.tool_whitelist.contains("bash_run"));
    }

    #[test]
    fn stop_reason_strings() {
        assert_eq!(StopReason::Done.as_str(), "done");
        assert_eq!(StopReason::MaxIterations.as_str(), "max_iterations");
        assert_eq!(
            serde_json::to_string(&StopReason::ToolErrorFatal).unwrap(),
            r#""tool_error_fatal""#
        );
    }
}
