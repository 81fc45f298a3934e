//! Per-run scratch state and the deadline-bearing call context.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::ModelOutput;
use crate::tool::ToolResult;

/// Well-known keys inside [`AgentContext::values`].
///
/// Middlewares own their private keys by prefix convention
/// (`"<middleware-name>."`); the runtime itself uses these two.
pub const KEY_CORRELATION_ID: &str = "correlation_id";
pub const KEY_STARTED_AT: &str = "started_at";
pub const KEY_PROMPT: &str = "prompt";

/// Mutable per-run scratch: iteration counter, a shared key/value map, and
/// the accumulated model outputs and tool results.
///
/// Created at loop entry, snapshotted into the session at loop exit. The
/// agent loop is sequential within a run, so no locking is needed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    /// Current iteration (0-based; one iteration = one model call plus its
    /// tool executions).
    pub iteration: u32,

    /// Shared scratch values. The runtime stores the correlation id and the
    /// start timestamp here; middlewares store their private state under
    /// their own key prefix.
    #[serde(default)]
    pub values: Map<String, Value>,

    /// Model outputs accumulated this run, in iteration order.
    #[serde(default)]
    pub model_outputs: Vec<ModelOutput>,

    /// Tool results accumulated this run, in execution order.
    #[serde(default)]
    pub tool_results: Vec<ToolResult>,
}

impl AgentContext {
    /// Create a fresh context with a new correlation id and start timestamp.
    pub fn new() -> Self {
        let mut values = Map::new();
        values.insert(
            KEY_CORRELATION_ID.into(),
            Value::String(Uuid::new_v4().to_string()),
        );
        values.insert(
            KEY_STARTED_AT.into(),
            Value::String(Utc::now().to_rfc3339()),
        );
        Self {
            iteration: 0,
            values,
            model_outputs: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    /// The correlation id assigned at construction.
    pub fn correlation_id(&self) -> &str {
        self.values
            .get(KEY_CORRELATION_ID)
            .and_then(Value::as_str)
            .unwrap_or("unknown")
    }
}

impl Default for AgentContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Deadline-bearing context handed to every suspension point: model calls,
/// tool executions, session writes, event-bus sends, and the admission
/// gate's refill poll.
///
/// Cancellation and timeout unwind identically; they only differ in the
/// error kind reported.
#[derive(Debug, Clone)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl CallContext {
    /// A context with neither deadline nor external cancellation.
    pub fn unbounded() -> Self {
        Self {
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn new(deadline: Option<Instant>, cancel: CancellationToken) -> Self {
        Self { deadline, cancel }
    }

    /// Derive a context expiring after `timeout` from now.
    pub fn with_timeout(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancel,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Time left until the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fail fast if the run was cancelled or the deadline passed.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_has_correlation_id() {
        let ctx = AgentContext::new();
        assert_eq!(ctx.iteration, 0);
        assert_ne!(ctx.correlation_id(), "unknown");
        assert!(ctx.values.contains_key(KEY_STARTED_AT));
    }

    #[test]
    fn context_serde_roundtrip() {
        let mut ctx = AgentContext::new();
        ctx.values.insert("log.request_id".into(), "r-1".into());
        let json = serde_json::to_string(&ctx).unwrap();
        let back: AgentContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back.values["log.request_id"], "r-1");
        assert_eq!(back.correlation_id(), ctx.correlation_id());
    }

    #[test]
    fn unbounded_call_context_passes_check() {
        assert!(CallContext::unbounded().check().is_ok());
    }

    #[test]
    fn expired_deadline_is_timeout() {
        let ctx = CallContext::with_timeout(Duration::ZERO, CancellationToken::new());
        assert!(matches!(ctx.check(), Err(Error::Timeout)));
    }

    #[test]
    fn cancellation_beats_deadline() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = CallContext::with_timeout(Duration::ZERO, token);
        assert!(matches!(ctx.check(), Err(Error::Cancelled)));
    }
}
