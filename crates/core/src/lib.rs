//! # Talon Core
//!
//! Domain types, traits, and error definitions for the Talon agent runtime.
//! This crate defines the model that every other crate implements against:
//! the run request/response shapes, the agent scratch context, the model and
//! tool contracts, the event stream, the session store contract, and the
//! closed error taxonomy.
//!
//! ## Design Philosophy
//!
//! Every subsystem seam is a trait here ([`Model`], [`Tool`],
//! [`SessionStore`]); implementations live in their respective crates. This
//! keeps the dependency graph pointing inward and makes every collaborator
//! mockable in tests.

pub mod context;
pub mod error;
pub mod event;
pub mod model;
pub mod run;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use context::{AgentContext, CallContext, KEY_CORRELATION_ID, KEY_PROMPT, KEY_STARTED_AT};
pub use error::{Error, ErrorKind, Result};
pub use event::{Bookmark, EventBus, EventChannel, EventPayload, EventStreams, RunEvent};
pub use model::{Model, ModelOutput, Usage};
pub use run::{RunMode, RunRequest, RunResponse, SandboxIncident, StopReason};
pub use session::{Session, SessionStore, TranscriptEntry};
pub use tool::{
    normalize_name, Tool, ToolCall, ToolDefinition, ToolRegistry, ToolRegistryBuilder, ToolResult,
};
