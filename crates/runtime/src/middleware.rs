//! Middleware chain — ordered onion wrapping around the agent, model, and
//! tool operations.
//!
//! A middleware exposes six hooks (Before/After × Agent/Model/Tool), a name,
//! and a priority. The chain orders middlewares by descending priority
//! (ties broken by registration order) and executes pre-hooks outermost
//! first, post-hooks innermost first:
//!
//! ```text
//! [H.pre] [M.pre] [L.pre]  core  [L.post] [M.post] [H.post]
//! ```
//!
//! Post-hooks run even when the core operation failed, in reverse of the
//! pre-hooks that succeeded, with the propagated error attached. A post-hook
//! may veto with its own error, which becomes the terminal error.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use talon_core::{
    AgentContext, CallContext, Error, Model, ModelOutput, Result, ToolCall, ToolRegistry,
    ToolResult,
};

/// Mutable view of the run handed to every hook.
///
/// `values` lives in the agent context and persists for the whole run;
/// middlewares own their keys by `"<name>."` prefix convention. The
/// operation fields are populated for the hooks where they apply.
pub struct HookState<'run> {
    pub agent: &'run mut AgentContext,
    pub iteration: u32,
    /// The model output, on `after_model`.
    pub model_output: Option<&'run ModelOutput>,
    /// The pending tool call, on `before_tool`/`after_tool`.
    pub tool_call: Option<&'run ToolCall>,
    /// The tool result, on `after_tool`.
    pub tool_result: Option<&'run ToolResult>,
    /// The propagated error, on post-hooks of a failed operation.
    pub error: Option<&'run Error>,
}

impl<'run> HookState<'run> {
    fn bare(agent: &'run mut AgentContext, iteration: u32) -> Self {
        Self {
            agent,
            iteration,
            model_output: None,
            tool_call: None,
            tool_result: None,
            error: None,
        }
    }
}

/// The six-hook middleware contract. All hooks default to no-ops.
#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    /// Higher priority wraps further outside.
    fn priority(&self) -> i32 {
        0
    }

    async fn before_agent(&self, _state: &mut HookState<'_>) -> Result<()> {
        Ok(())
    }
    async fn after_agent(&self, _state: &mut HookState<'_>) -> Result<()> {
        Ok(())
    }
    async fn before_model(&self, _state: &mut HookState<'_>) -> Result<()> {
        Ok(())
    }
    async fn after_model(&self, _state: &mut HookState<'_>) -> Result<()> {
        Ok(())
    }
    async fn before_tool(&self, _state: &mut HookState<'_>) -> Result<()> {
        Ok(())
    }
    async fn after_tool(&self, _state: &mut HookState<'_>) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Hook {
    BeforeAgent,
    AfterAgent,
    BeforeModel,
    AfterModel,
    BeforeTool,
    AfterTool,
}

/// Token proving `before_agent` ran; carries which hooks succeeded so the
/// paired `after_agent` set can be unwound exactly.
pub struct AgentScope {
    ran: Vec<usize>,
}

/// The assembled chain.
pub struct MiddlewareChain {
    ordered: Vec<Arc<dyn Middleware>>,
    hook_timeout: Option<Duration>,
}

impl MiddlewareChain {
    /// Build a chain; `middlewares` may arrive in any order.
    pub fn new(mut middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        // Stable sort keeps registration order among equal priorities.
        middlewares.sort_by_key(|m| std::cmp::Reverse(m.priority()));
        Self {
            ordered: middlewares,
            hook_timeout: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Bound every individual hook invocation; exceeding it yields
    /// `MiddlewareTimeout` and unwinds like any other hook error.
    pub fn with_hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout = Some(timeout);
        self
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    async fn invoke(
        &self,
        index: usize,
        hook: Hook,
        state: &mut HookState<'_>,
    ) -> Result<()> {
        let mw = &self.ordered[index];
        let fut = async {
            match hook {
                Hook::BeforeAgent => mw.before_agent(state).await,
                Hook::AfterAgent => mw.after_agent(state).await,
                Hook::BeforeModel => mw.before_model(state).await,
                Hook::AfterModel => mw.after_model(state).await,
                Hook::BeforeTool => mw.before_tool(state).await,
                Hook::AfterTool => mw.after_tool(state).await,
            }
        };
        match self.hook_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(Error::MiddlewareTimeout(mw.name().to_string())),
            },
            None => fut.await,
        }
    }

    /// Run the pre-hook phase for `hook`, recording which hooks succeeded.
    ///
    /// On the first failure the remaining pre-hooks are skipped and the
    /// error is returned alongside the indices that did run.
    async fn pre_phase(
        &self,
        hook: Hook,
        agent: &mut AgentContext,
        iteration: u32,
        tool_call: Option<&ToolCall>,
    ) -> (Vec<usize>, Option<Error>) {
        let mut ran = Vec::with_capacity(self.ordered.len());
        for index in 0..self.ordered.len() {
            let mut state = HookState::bare(agent, iteration);
            state.tool_call = tool_call;
            match self.invoke(index, hook, &mut state).await {
                Ok(()) => ran.push(index),
                Err(e) => return (ran, Some(e)),
            }
        }
        (ran, None)
    }

    /// Run the paired post-hooks in reverse, attaching the current error.
    /// A post-hook error replaces the propagated one (outermost wins).
    #[allow(clippy::too_many_arguments)]
    async fn post_phase(
        &self,
        hook: Hook,
        ran: &[usize],
        agent: &mut AgentContext,
        iteration: u32,
        model_output: Option<&ModelOutput>,
        tool_call: Option<&ToolCall>,
        tool_result: Option<&ToolResult>,
        mut error: Option<Error>,
    ) -> Option<Error> {
        for &index in ran.iter().rev() {
            let mut state = HookState::bare(agent, iteration);
            state.model_output = model_output;
            state.tool_call = tool_call;
            state.tool_result = tool_result;
            state.error = error.as_ref();
            if let Err(veto) = self.invoke(index, hook, &mut state).await {
                warn!(
                    middleware = %self.ordered[index].name(),
                    error = %veto,
                    "post-hook vetoed"
                );
                error = Some(veto);
            }
        }
        error
    }

    /// Run the `before_agent` hooks once at loop entry.
    ///
    /// If a pre-hook errors, the hooks that already ran receive their paired
    /// `after_agent` invocation with the error attached before this returns.
    pub async fn before_agent(&self, agent: &mut AgentContext) -> Result<AgentScope> {
        let (ran, failure) = self.pre_phase(Hook::BeforeAgent, agent, 0, None).await;
        match failure {
            None => Ok(AgentScope { ran }),
            Some(error) => {
                let terminal = self
                    .post_phase(
                        Hook::AfterAgent,
                        &ran,
                        agent,
                        0,
                        None,
                        None,
                        None,
                        Some(error),
                    )
                    .await;
                Err(terminal.unwrap_or_else(|| {
                    Error::Internal("before_agent unwound without an error".into())
                }))
            }
        }
    }

    /// Run the `after_agent` hooks at loop exit (always paired with a
    /// successful [`MiddlewareChain::before_agent`]). Returns the terminal
    /// error, which post-hooks may replace.
    pub async fn after_agent(
        &self,
        scope: &AgentScope,
        agent: &mut AgentContext,
        iteration: u32,
        error: Option<Error>,
    ) -> Option<Error> {
        self.post_phase(
            Hook::AfterAgent,
            &scope.ran,
            agent,
            iteration,
            None,
            None,
            None,
            error,
        )
        .await
    }

    /// Onion-wrap one model call.
    pub async fn execute_model_call(
        &self,
        call: &CallContext,
        agent: &mut AgentContext,
        model: &dyn Model,
    ) -> Result<ModelOutput> {
        let iteration = agent.iteration;
        let (ran, pre_failure) = self
            .pre_phase(Hook::BeforeModel, agent, iteration, None)
            .await;

        let core_result = match pre_failure {
            Some(e) => Err(e),
            // Adapters are required to honour the call context themselves;
            // the select is the backstop for ones that don't.
            None => {
                let generate = model.generate(call, agent);
                if let Some(remaining) = call.remaining() {
                    tokio::select! {
                        biased;
                        _ = call.cancellation().cancelled() => Err(Error::Cancelled),
                        _ = tokio::time::sleep(remaining) => Err(Error::Timeout),
                        result = generate => result,
                    }
                } else {
                    tokio::select! {
                        biased;
                        _ = call.cancellation().cancelled() => Err(Error::Cancelled),
                        result = generate => result,
                    }
                }
            }
        };

        let (output, error) = match core_result {
            Ok(output) => (Some(output), None),
            Err(e) => (None, Some(e)),
        };
        let terminal = self
            .post_phase(
                Hook::AfterModel,
                &ran,
                agent,
                iteration,
                output.as_ref(),
                None,
                None,
                error,
            )
            .await;

        match terminal {
            Some(e) => Err(e),
            None => output.ok_or_else(|| {
                Error::Internal("model call unwound without output or error".into())
            }),
        }
    }

    /// Onion-wrap one tool execution.
    pub async fn execute_tool_call(
        &self,
        call: &CallContext,
        agent: &mut AgentContext,
        registry: &ToolRegistry,
        tool_call: &ToolCall,
    ) -> Result<ToolResult> {
        let iteration = agent.iteration;
        let (ran, pre_failure) = self
            .pre_phase(Hook::BeforeTool, agent, iteration, Some(tool_call))
            .await;

        let core_result = match pre_failure {
            Some(e) => Err(e),
            None => registry.execute(call, tool_call).await,
        };

        let (result, error) = match core_result {
            Ok(result) => (Some(result), None),
            Err(e) => (None, Some(e)),
        };
        let terminal = self
            .post_phase(
                Hook::AfterTool,
                &ran,
                agent,
                iteration,
                None,
                Some(tool_call),
                result.as_ref(),
                error,
            )
            .await;

        match terminal {
            Some(e) => Err(e),
            None => result.ok_or_else(|| {
                Error::Internal("tool call unwound without result or error".into())
            }),
        }
    }
}
