//! The agent loop — the bounded iteration driver composing the sandbox,
//! registry, middleware chain, event bus, session store, and admission gate.
//!
//! One run: admission → session lock → `before_agent` → iterate
//! (model call → transcript append → tool calls) until the model is done,
//! the iteration cap is reached, or a terminal error occurs → `after_agent`
//! → final persist. Sandbox refusals and per-call tool failures feed back
//! to the model as error-typed results; model errors, cancellation, and
//! middleware failures terminate the run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use talon_core::{
    normalize_name, AgentContext, Bookmark, CallContext, Error, ErrorKind, EventBus, EventPayload,
    Model, Result, RunRequest, RunResponse, SandboxIncident, Session, SessionStore, StopReason,
    ToolCall, ToolRegistry, ToolResult, TranscriptEntry, Usage, KEY_CORRELATION_ID, KEY_PROMPT,
};
use talon_security::SandboxPolicy;

use crate::admission::AdmissionGate;
use crate::middleware::MiddlewareChain;

/// Loop-level knobs.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Hard cap on iterations per run. Must be positive.
    pub max_iterations: u32,
    /// Applied when the request carries no timeout.
    pub default_timeout: Option<Duration>,
    /// Record an `iteration-N` bookmark after every successful model call.
    pub auto_bookmark: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            default_timeout: None,
            auto_bookmark: true,
        }
    }
}

/// The assembled runtime for executing runs.
pub struct AgentRunner {
    model: Arc<dyn Model>,
    tools: Arc<ToolRegistry>,
    chain: Arc<MiddlewareChain>,
    sandbox: Arc<SandboxPolicy>,
    store: Arc<dyn SessionStore>,
    gate: Arc<AdmissionGate>,
    config: RunnerConfig,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AgentRunner {
    pub fn new(
        model: Arc<dyn Model>,
        tools: Arc<ToolRegistry>,
        chain: Arc<MiddlewareChain>,
        sandbox: Arc<SandboxPolicy>,
        store: Arc<dyn SessionStore>,
        gate: Arc<AdmissionGate>,
    ) -> Self {
        Self {
            model,
            tools,
            chain,
            sandbox,
            store,
            gate,
            config: RunnerConfig::default(),
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        assert!(config.max_iterations > 0, "max_iterations must be positive");
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Run to completion with an internally owned event bus.
    pub async fn run(&self, request: RunRequest) -> Result<RunResponse> {
        let (bus, streams) = EventBus::new(Uuid::new_v4().to_string());
        let result = self
            .run_streaming(request, &bus, CancellationToken::new())
            .await;
        drop(streams);
        result
    }

    /// Run while the caller consumes the bus streams (SSE, CLI progress).
    pub async fn run_streaming(
        &self,
        request: RunRequest,
        bus: &EventBus,
        cancel: CancellationToken,
    ) -> Result<RunResponse> {
        request.validate()?;
        let call = self.call_context(&request, cancel);
        let _permit = self.gate.acquire(&call).await?;

        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let lock = self.session_lock(&session_id).await;
        let _exclusive = lock.lock().await;

        let mut session = match self.store.load(&session_id).await {
            Ok(session) => session,
            Err(Error::SessionNotFound(_)) => Session::new(session_id.clone()),
            Err(e) => return Err(e),
        };
        session.push_prompt(&request.prompt);
        self.continue_sequence(&session_id, bus).await;

        let mut agent = AgentContext::new();
        seed_values(&mut agent, &request, bus);

        self.run_loop(&request, &call, bus, &mut session, agent).await
    }

    /// Resume a session from a named bookmark and continue the loop.
    ///
    /// The agent context is rebuilt by replaying the recorded model/tool
    /// events up to the bookmark; iteration continues after the bookmarked
    /// one. An empty prompt is allowed here (the run continues prior work).
    pub async fn resume(
        &self,
        request: RunRequest,
        bookmark_name: &str,
        bus: &EventBus,
        cancel: CancellationToken,
    ) -> Result<RunResponse> {
        let session_id = request
            .session_id
            .clone()
            .ok_or_else(|| Error::InvalidRequest("resume requires a session id".into()))?;

        let call = self.call_context(&request, cancel);
        let _permit = self.gate.acquire(&call).await?;
        let lock = self.session_lock(&session_id).await;
        let _exclusive = lock.lock().await;

        let mut session = self.store.load(&session_id).await?;
        let bookmark = session
            .bookmark(bookmark_name)
            .cloned()
            .ok_or_else(|| Error::InvalidRequest(format!("unknown bookmark '{bookmark_name}'")))?;

        let events = self.store.events(&session_id).await?;
        let last_recorded = events.iter().map(|e| e.sequence).max();
        if last_recorded.is_none_or(|last| last < bookmark.sequence) {
            return Err(Error::ResumeTruncated(format!(
                "bookmark '{}' points at sequence {} but the log ends earlier",
                bookmark.name, bookmark.sequence
            )));
        }
        bus.advance_to(last_recorded.unwrap_or(0) + 1);

        let mut agent = AgentContext::new();
        seed_values(&mut agent, &request, bus);
        for event in events.iter().filter(|e| e.sequence <= bookmark.sequence) {
            match &event.payload {
                EventPayload::ModelCallEnd { output, .. } => {
                    agent.model_outputs.push(output.clone());
                }
                EventPayload::ToolCallEnd { result, .. } => {
                    agent.tool_results.push(result.clone());
                }
                _ => {}
            }
        }
        agent.iteration = bookmark.iteration + 1;
        info!(
            session = %session_id,
            bookmark = %bookmark.name,
            resume_iteration = agent.iteration,
            replayed_outputs = agent.model_outputs.len(),
            replayed_results = agent.tool_results.len(),
            "resuming from bookmark"
        );

        if !request.prompt.trim().is_empty() {
            session.push_prompt(&request.prompt);
        }

        self.run_loop(&request, &call, bus, &mut session, agent).await
    }

    fn call_context(&self, request: &RunRequest, cancel: CancellationToken) -> CallContext {
        match request.timeout.or(self.config.default_timeout) {
            Some(timeout) => CallContext::with_timeout(timeout, cancel),
            None => CallContext::new(None, cancel),
        }
    }

    async fn session_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Keep event sequences monotonic across runs of the same session.
    async fn continue_sequence(&self, session_id: &str, bus: &EventBus) {
        if let Ok(events) = self.store.events(session_id).await {
            if let Some(last) = events.iter().map(|e| e.sequence).max() {
                bus.advance_to(last + 1);
            }
        }
    }

    async fn persist_event(&self, session_id: &str, event: talon_core::RunEvent) {
        if let Err(e) = self.store.append_event(session_id, &event).await {
            warn!(session = %session_id, error = %e, "event append failed");
        }
    }

    async fn run_loop(
        &self,
        request: &RunRequest,
        call: &CallContext,
        bus: &EventBus,
        session: &mut Session,
        mut agent: AgentContext,
    ) -> Result<RunResponse> {
        let session_id = session.id.clone();
        for warning in self.tools.warnings() {
            bus.monitor(
                "tool_registry_warning",
                serde_json::json!({ "message": warning }),
            );
        }

        let scope = match self.chain.before_agent(&mut agent).await {
            Ok(scope) => scope,
            Err(e) => {
                let event = bus.emit(EventPayload::Stopped {
                    reason: stop_reason_for(&e, StopReason::ModelError),
                });
                self.persist_event(&session_id, event).await;
                if let Err(save_err) = self.store.save(session).await {
                    warn!(session = %session_id, error = %save_err, "session save failed");
                }
                return Err(e);
            }
        };

        let mut stop = StopReason::Done;
        let mut terminal: Option<Error> = None;
        let mut iterations_executed: u32 = 0;
        let mut usage = Usage::default();
        let mut requested_calls: Vec<ToolCall> = Vec::new();
        let mut incidents: Vec<SandboxIncident> = Vec::new();
        let mut final_output = String::new();

        'run: while agent.iteration < self.config.max_iterations {
            if let Err(e) = call.check() {
                stop = stop_reason_for(&e, StopReason::Timeout);
                terminal = Some(e);
                break 'run;
            }

            let iteration = agent.iteration;
            let event = bus.emit(EventPayload::ModelCallStart { iteration });
            self.persist_event(&session_id, event).await;

            let output = match self
                .chain
                .execute_model_call(call, &mut agent, self.model.as_ref())
                .await
            {
                Ok(output) => output,
                Err(e) => {
                    stop = stop_reason_for(&e, StopReason::ModelError);
                    terminal = Some(e);
                    break 'run;
                }
            };
            iterations_executed += 1;
            if let Some(u) = &output.usage {
                usage.add(u);
            }
            if !output.content.is_empty() {
                final_output = output.content.clone();
                let event = bus.emit(EventPayload::ProgressDelta {
                    text: output.content.clone(),
                });
                self.persist_event(&session_id, event).await;
            }

            agent.model_outputs.push(output.clone());
            session.push(TranscriptEntry::ModelOutput {
                iteration,
                output: output.clone(),
            });
            let event = bus.emit(EventPayload::ModelCallEnd {
                iteration,
                output: output.clone(),
            });
            self.persist_event(&session_id, event).await;

            if output.done || output.tool_calls.is_empty() {
                stop = StopReason::Done;
                break 'run;
            }

            for tool_call in &output.tool_calls {
                if let Err(e) = call.check() {
                    stop = stop_reason_for(&e, StopReason::Timeout);
                    terminal = Some(e);
                    break 'run;
                }
                requested_calls.push(tool_call.clone());
                let event = bus.emit(EventPayload::ToolCallStart {
                    iteration,
                    call: tool_call.clone(),
                });
                self.persist_event(&session_id, event).await;

                let result = match self.sandbox.inspect(tool_call, &request.tool_whitelist) {
                    Err(refusal) => {
                        debug_assert!(refusal.is_security());
                        warn!(
                            tool = %tool_call.name,
                            kind = %refusal.kind(),
                            "sandbox refused tool call"
                        );
                        incidents.push(SandboxIncident {
                            call_id: tool_call.id.clone(),
                            tool: normalize_name(&tool_call.name),
                            kind: refusal.kind(),
                            message: refusal.to_string(),
                        });
                        ToolResult::failure(
                            &tool_call.id,
                            normalize_name(&tool_call.name),
                            refusal.kind(),
                            refusal.to_string(),
                        )
                    }
                    Ok(_resolved) => {
                        match self
                            .chain
                            .execute_tool_call(call, &mut agent, &self.tools, tool_call)
                            .await
                        {
                            Ok(result) => result,
                            Err(e) => match e.kind() {
                                ErrorKind::Cancelled | ErrorKind::Timeout => {
                                    stop = stop_reason_for(&e, StopReason::Timeout);
                                    terminal = Some(e);
                                    break 'run;
                                }
                                ErrorKind::MiddlewareError | ErrorKind::MiddlewareTimeout => {
                                    stop = StopReason::ToolErrorFatal;
                                    terminal = Some(e);
                                    break 'run;
                                }
                                kind => ToolResult::failure(
                                    &tool_call.id,
                                    normalize_name(&tool_call.name),
                                    kind,
                                    e.to_string(),
                                ),
                            },
                        }
                    }
                };

                agent.tool_results.push(result.clone());
                session.push(TranscriptEntry::ToolResult {
                    iteration,
                    result: result.clone(),
                });
                let event = bus.emit(EventPayload::ToolCallEnd { iteration, result });
                self.persist_event(&session_id, event).await;
            }

            if self.config.auto_bookmark {
                // Covers the whole iteration: the model output and every
                // tool result just committed.
                let bookmark = Bookmark {
                    name: format!("iteration-{iteration}"),
                    sequence: bus.last_sequence().unwrap_or(0),
                    iteration,
                };
                session.set_bookmark(bookmark.clone());
                let event = bus.emit(EventPayload::Bookmark { bookmark });
                self.persist_event(&session_id, event).await;
            }

            agent.iteration += 1;
            if agent.iteration == self.config.max_iterations {
                stop = StopReason::MaxIterations;
                break 'run;
            }
        }

        debug!(
            session = %session_id,
            stop = %stop,
            iterations = iterations_executed,
            "loop finished"
        );
        let event = bus.emit(EventPayload::Stopped { reason: stop });
        self.persist_event(&session_id, event).await;

        let final_iteration = agent.iteration;
        terminal = self
            .chain
            .after_agent(&scope, &mut agent, final_iteration, terminal)
            .await;

        // Persistence failures at commit are reported, never retroactive.
        if let Err(e) = self.store.save(session).await {
            warn!(session = %session_id, error = %e, "final session save failed");
            bus.monitor(
                "session_save_failed",
                serde_json::json!({ "error": e.to_string() }),
            );
        }

        match terminal {
            Some(e) => Err(e),
            None => Ok(RunResponse {
                session_id,
                output: final_output,
                stop_reason: stop,
                iterations: iterations_executed,
                usage,
                tags: request.tags.clone(),
                tool_calls: requested_calls,
                sandbox_report: incidents,
            }),
        }
    }
}

/// Make the prompt, correlation id, and caller metadata visible to model
/// adapters and middlewares through the shared values map.
fn seed_values(agent: &mut AgentContext, request: &RunRequest, bus: &EventBus) {
    agent
        .values
        .insert(KEY_CORRELATION_ID.into(), bus.correlation_id().into());
    agent
        .values
        .insert(KEY_PROMPT.into(), request.prompt.clone().into());
    for (key, value) in &request.metadata {
        agent.values.insert(key.clone(), value.clone());
    }
}

/// Map a terminal error onto the closed stop-reason set.
fn stop_reason_for(error: &Error, fallback: StopReason) -> StopReason {
    match error.kind() {
        ErrorKind::Cancelled => StopReason::Cancelled,
        ErrorKind::Timeout => StopReason::Timeout,
        ErrorKind::ModelError => StopReason::ModelError,
        _ => fallback,
    }
}
