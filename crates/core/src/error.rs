//! Error types for the Talon runtime.
//!
//! The taxonomy is a closed set: every failure the runtime can surface maps
//! to exactly one variant here, and every variant has a stable kind string
//! that callers (HTTP gateway, CLI) can rely on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable machine-readable classification of an [`Error`].
///
/// Serialised as `snake_case` strings; these are part of the public API
/// surface and must not change between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // Input
    InvalidRequest,
    InvalidToolArgs,
    // Admission
    RateLimited,
    ConcurrencyExceeded,
    // Security
    PathEscape,
    SymlinkLoop,
    BlockedCommand,
    ToolNotPermitted,
    // Execution
    ModelError,
    ToolExecutionFailed,
    MiddlewareError,
    MiddlewareTimeout,
    // Lifecycle
    Cancelled,
    Timeout,
    // Persistence
    SessionNotFound,
    ResumeTruncated,
    StorageUnavailable,
    // Anything that escaped the taxonomy above
    Internal,
}

impl ErrorKind {
    /// The stable kind string surfaced to callers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidToolArgs => "invalid_tool_args",
            Self::RateLimited => "rate_limited",
            Self::ConcurrencyExceeded => "concurrency_exceeded",
            Self::PathEscape => "path_escape",
            Self::SymlinkLoop => "symlink_loop",
            Self::BlockedCommand => "blocked_command",
            Self::ToolNotPermitted => "tool_not_permitted",
            Self::ModelError => "model_error",
            Self::ToolExecutionFailed => "tool_execution_failed",
            Self::MiddlewareError => "middleware_error",
            Self::MiddlewareTimeout => "middleware_timeout",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::SessionNotFound => "session_not_found",
            Self::ResumeTruncated => "resume_truncated",
            Self::StorageUnavailable => "storage_unavailable",
            Self::Internal => "internal",
        }
    }

    /// Whether this kind belongs to the sandbox/validator family.
    ///
    /// Security refusals for a single tool call never abort the run; they
    /// are fed back to the model as error-typed tool results.
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            Self::PathEscape | Self::SymlinkLoop | Self::BlockedCommand | Self::ToolNotPermitted
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The top-level error type for all Talon operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Input ---
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid tool arguments for '{tool}': {reason}")]
    InvalidToolArgs { tool: String, reason: String },

    // --- Admission ---
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("concurrency limit exceeded: {0}")]
    ConcurrencyExceeded(String),

    // --- Security ---
    #[error("path '{path}' escapes the working set")]
    PathEscape { path: String },

    #[error("symlink refused or loop detected at '{path}'")]
    SymlinkLoop { path: String },

    #[error("blocked command: {0}")]
    BlockedCommand(String),

    #[error("tool '{0}' is not permitted by the run whitelist")]
    ToolNotPermitted(String),

    // --- Execution ---
    #[error("model error: {0}")]
    ModelError(String),

    #[error("tool '{tool}' execution failed: {reason}")]
    ToolExecutionFailed { tool: String, reason: String },

    #[error("middleware '{middleware}' failed: {reason}")]
    MiddlewareError { middleware: String, reason: String },

    #[error("middleware '{0}' exceeded its hook deadline")]
    MiddlewareTimeout(String),

    // --- Lifecycle ---
    #[error("run cancelled")]
    Cancelled,

    #[error("run deadline exceeded")]
    Timeout,

    // --- Persistence ---
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("resume point unavailable: {0}")]
    ResumeTruncated(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    // --- Generic ---
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to its stable [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::InvalidToolArgs { .. } => ErrorKind::InvalidToolArgs,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::ConcurrencyExceeded(_) => ErrorKind::ConcurrencyExceeded,
            Self::PathEscape { .. } => ErrorKind::PathEscape,
            Self::SymlinkLoop { .. } => ErrorKind::SymlinkLoop,
            Self::BlockedCommand(_) => ErrorKind::BlockedCommand,
            Self::ToolNotPermitted(_) => ErrorKind::ToolNotPermitted,
            Self::ModelError(_) => ErrorKind::ModelError,
            Self::ToolExecutionFailed { .. } => ErrorKind::ToolExecutionFailed,
            Self::MiddlewareError { .. } => ErrorKind::MiddlewareError,
            Self::MiddlewareTimeout(_) => ErrorKind::MiddlewareTimeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Timeout => ErrorKind::Timeout,
            Self::SessionNotFound(_) => ErrorKind::SessionNotFound,
            Self::ResumeTruncated(_) => ErrorKind::ResumeTruncated,
            Self::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error belongs to the sandbox/validator family.
    pub fn is_security(&self) -> bool {
        self.kind().is_security()
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("serialization: {e}"))
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
