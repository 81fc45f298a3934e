//! The Talon runtime — middleware chain, agent loop, and admission gate.
//!
//! The agent follows a bounded **model → tools** cycle:
//!
//! 1. Admission gate (token bucket + concurrency semaphore)
//! 2. Session load/create under the per-session mutex
//! 3. `before_agent` hooks, then the iteration loop:
//!    model call (onion-wrapped) → transcript append → sandbox + tool
//!    execution (onion-wrapped) per requested call
//! 4. `after_agent` hooks, final persist, aggregated response
//!
//! Every stage emits sequenced events to the run's bus; `ModelCallEnd` and
//! `ToolCallEnd` carry enough state to rebuild a run from a bookmark.

pub mod admission;
pub mod builtin;
pub mod loop_runner;
pub mod middleware;
pub mod scripted;

pub use admission::{AdmissionGate, AdmissionPermit, GateConfig};
pub use builtin::{LoggingMiddleware, MonitorSnapshot, MonitoringMiddleware};
pub use loop_runner::{AgentRunner, RunnerConfig};
pub use middleware::{AgentScope, HookState, Middleware, MiddlewareChain};
pub use scripted::{FailingModel, ScriptedModel};
