//! Built-in middlewares: structured request logging and latency monitoring.
//!
//! Both store their per-run state under their own key prefix in the shared
//! values map (`log.*`, `monitoring.*`).

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use talon_core::{Result, KEY_CORRELATION_ID};

use crate::middleware::{HookState, Middleware};

const KEY_REQUEST_ID: &str = "log.request_id";
const KEY_RUN_START: &str = "log.started_unix_ms";

fn read_str<'a>(state: &'a HookState<'_>, key: &str) -> &'a str {
    state
        .agent
        .values
        .get(key)
        .and_then(serde_json::Value::as_str)
        .unwrap_or("")
}

/// Logs run/model/tool transitions with a per-run request id.
pub struct LoggingMiddleware {
    priority: i32,
}

impl LoggingMiddleware {
    pub fn new(priority: i32) -> Self {
        Self { priority }
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "log"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn before_agent(&self, state: &mut HookState<'_>) -> Result<()> {
        let request_id = Uuid::new_v4().to_string();
        state
            .agent
            .values
            .insert(KEY_REQUEST_ID.into(), request_id.clone().into());
        state
            .agent
            .values
            .insert(KEY_RUN_START.into(), Utc::now().timestamp_millis().into());
        info!(
            request_id = %request_id,
            correlation_id = %read_str(state, KEY_CORRELATION_ID),
            "agent run start"
        );
        Ok(())
    }

    async fn before_model(&self, state: &mut HookState<'_>) -> Result<()> {
        info!(
            request_id = %read_str(state, KEY_REQUEST_ID),
            iteration = state.iteration,
            "before model"
        );
        Ok(())
    }

    async fn after_model(&self, state: &mut HookState<'_>) -> Result<()> {
        match (state.model_output, state.error) {
            (Some(output), _) => info!(
                request_id = %read_str(state, KEY_REQUEST_ID),
                iteration = state.iteration,
                tool_calls = output.tool_calls.len(),
                done = output.done,
                "after model"
            ),
            (None, Some(error)) => warn!(
                request_id = %read_str(state, KEY_REQUEST_ID),
                iteration = state.iteration,
                %error,
                "model call failed"
            ),
            (None, None) => {}
        }
        Ok(())
    }

    async fn before_tool(&self, state: &mut HookState<'_>) -> Result<()> {
        if let Some(call) = state.tool_call {
            info!(
                request_id = %read_str(state, KEY_REQUEST_ID),
                tool = %call.name,
                call_id = %call.id,
                "before tool"
            );
        }
        Ok(())
    }

    async fn after_tool(&self, state: &mut HookState<'_>) -> Result<()> {
        if let Some(result) = state.tool_result {
            info!(
                request_id = %read_str(state, KEY_REQUEST_ID),
                tool = %result.name,
                success = result.success(),
                "after tool"
            );
        }
        Ok(())
    }

    async fn after_agent(&self, state: &mut HookState<'_>) -> Result<()> {
        let started = state
            .agent
            .values
            .get(KEY_RUN_START)
            .and_then(serde_json::Value::as_i64)
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        let elapsed_ms = (Utc::now().timestamp_millis() - started).max(0);
        info!(
            request_id = %read_str(state, KEY_REQUEST_ID),
            iterations = state.iteration,
            elapsed_ms,
            failed = state.error.is_some(),
            "agent run done"
        );
        Ok(())
    }
}

/// Aggregate latency metrics captured by [`MonitoringMiddleware`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MonitorSnapshot {
    pub total_runs: u64,
    pub slow_runs: u64,
    pub max_latency: Duration,
    pub last_latency: Duration,
}

#[derive(Default)]
struct MonitorState {
    snapshot: MonitorSnapshot,
}

/// Tracks per-run latency and counts runs slower than a threshold.
pub struct MonitoringMiddleware {
    priority: i32,
    threshold: Duration,
    state: Mutex<MonitorState>,
}

const KEY_MON_START: &str = "monitoring.run_start_unix_ms";

impl MonitoringMiddleware {
    pub fn new(priority: i32, threshold: Duration) -> Self {
        Self {
            priority,
            threshold,
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.state.lock().expect("monitor mutex poisoned").snapshot
    }
}

#[async_trait]
impl Middleware for MonitoringMiddleware {
    fn name(&self) -> &str {
        "monitoring"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn before_agent(&self, state: &mut HookState<'_>) -> Result<()> {
        state
            .agent
            .values
            .insert(KEY_MON_START.into(), Utc::now().timestamp_millis().into());
        Ok(())
    }

    async fn after_agent(&self, state: &mut HookState<'_>) -> Result<()> {
        let started = state
            .agent
            .values
            .get(KEY_MON_START)
            .and_then(serde_json::Value::as_i64)
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        let latency =
            Duration::from_millis((Utc::now().timestamp_millis() - started).max(0) as u64);
        let slow = latency > self.threshold;

        let mut guard = self.state.lock().expect("monitor mutex poisoned");
        guard.snapshot.total_runs += 1;
        guard.snapshot.last_latency = latency;
        if latency > guard.snapshot.max_latency {
            guard.snapshot.max_latency = latency;
        }
        if slow {
            guard.snapshot.slow_runs += 1;
            warn!(?latency, threshold = ?self.threshold, "run flagged as slow");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::MiddlewareChain;
    use std::sync::Arc;
    use talon_core::AgentContext;

    #[tokio::test]
    async fn logging_assigns_request_id() {
        let chain = MiddlewareChain::new(vec![Arc::new(LoggingMiddleware::new(90))]);
        let mut agent = AgentContext::new();
        let scope = chain.before_agent(&mut agent).await.unwrap();
        assert!(agent.values.contains_key(KEY_REQUEST_ID));
        assert!(chain.after_agent(&scope, &mut agent, 0, None).await.is_none());
    }

    #[tokio::test]
    async fn monitoring_counts_runs() {
        let monitor = Arc::new(MonitoringMiddleware::new(50, Duration::from_secs(3600)));
        let chain = MiddlewareChain::new(vec![monitor.clone()]);
        let mut agent = AgentContext::new();
        for _ in 0..3 {
            let scope = chain.before_agent(&mut agent).await.unwrap();
            chain.after_agent(&scope, &mut agent, 1, None).await;
        }
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.total_runs, 3);
        assert_eq!(snapshot.slow_runs, 0);
    }
}
