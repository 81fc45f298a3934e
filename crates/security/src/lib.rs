//! Sandbox and validator pipeline for Talon tool calls.
//!
//! Three synchronous layers run between tool-call intent and execution:
//!
//! 1. path resolver — confines path arguments to the working set, refusing
//!    symlinks (`PathEscape` / `SymlinkLoop`)
//! 2. command validator — blocklist over shell-style arguments
//!    (`BlockedCommand`)
//! 3. whitelist gate — the run's tool whitelist (`ToolNotPermitted`)
//!
//! All layers are pure functions of `(ToolCall, policy)`; the only I/O is
//! path stat.

pub mod command;
pub mod path;

pub use command::CommandPolicy;
pub use path::resolve_path;

use std::collections::HashSet;
use std::path::PathBuf;

use serde_json::Value;
use tracing::debug;

use talon_core::{normalize_name, Error, Result, ToolCall};

/// Input-object keys inspected as filesystem paths.
const PATH_KEYS: &[&str] = &["path", "file_path", "dir", "directory", "target"];

/// Input-object keys inspected as command lines.
const COMMAND_KEYS: &[&str] = &["command", "cmd", "script"];

/// The assembled sandbox policy applied to every tool call before execution.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    /// Allow-listed filesystem roots a tool may touch.
    pub working_set: Vec<PathBuf>,
    pub command: CommandPolicy,
}

impl SandboxPolicy {
    pub fn new(working_set: Vec<PathBuf>) -> Self {
        Self {
            working_set,
            command: CommandPolicy::default(),
        }
    }

    pub fn with_command_policy(mut self, command: CommandPolicy) -> Self {
        self.command = command;
        self
    }

    /// Run all three layers over one tool call.
    ///
    /// Returns the resolved form of every path argument so the executor can
    /// hand tools canonical paths. The first failing layer wins.
    pub fn inspect(
        &self,
        call: &ToolCall,
        whitelist: &HashSet<String>,
    ) -> Result<Vec<PathBuf>> {
        let mut resolved = Vec::new();

        // Layer 1: path resolution + confinement.
        if let Value::Object(input) = &call.input {
            for key in PATH_KEYS {
                if let Some(raw) = input.get(*key).and_then(Value::as_str) {
                    let path = resolve_path(raw, &self.working_set)?;
                    debug!(tool = %call.name, %key, path = %path.display(), "path argument resolved");
                    resolved.push(path);
                }
            }

            // Layer 2: command/argument blocklist.
            for key in COMMAND_KEYS {
                if let Some(cmd) = input.get(*key).and_then(Value::as_str) {
                    self.command.validate(cmd)?;
                }
            }
        }

        // Layer 3: whitelist gate.
        check_whitelist(&call.name, whitelist)?;

        Ok(resolved)
    }
}

/// The whitelist gate: when the run's whitelist is non-empty, only listed
/// tool names may execute.
pub fn check_whitelist(name: &str, whitelist: &HashSet<String>) -> Result<()> {
    if whitelist.is_empty() {
        return Ok(());
    }
    let normalized = normalize_name(name);
    if whitelist.contains(&normalized) {
        Ok(())
    } else {
        Err(Error::ToolNotPermitted(normalized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn call(name: &str, input: Value) -> ToolCall {
        ToolCall {
            id: "c-1".into(),
            name: name.into(),
            input,
        }
    }

    #[test]
    fn traversal_refused_before_execution() {
        let dir = TempDir::new().unwrap();
        let policy = SandboxPolicy::new(vec![dir.path().to_path_buf()]);
        let err = policy
            .inspect(
                &call("file_read", json!({"path": "../../etc/passwd"})),
                &HashSet::new(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::PathEscape { .. }));
    }

    #[test]
    fn blocked_command_refused() {
        let dir = TempDir::new().unwrap();
        let policy = SandboxPolicy::new(vec![dir.path().to_path_buf()]);
        let err = policy
            .inspect(
                &call("bash_run", json!({"command": "rm -rf /"})),
                &HashSet::new(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::BlockedCommand(_)));
    }

    #[test]
    fn whitelist_gate_restricts_names() {
        let dir = TempDir::new().unwrap();
        let policy = SandboxPolicy::new(vec![dir.path().to_path_buf()]);
        let whitelist: HashSet<String> = ["echo".to_string()].into();

        assert!(policy
            .inspect(&call("echo", json!({"text": "hi"})), &whitelist)
            .is_ok());
        let err = policy
            .inspect(&call("bash_run", json!({"command": "ls"})), &whitelist)
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotPermitted(_)));
    }

    #[test]
    fn whitelist_matches_normalised_names() {
        let whitelist: HashSet<String> = ["file_read".to_string()].into();
        assert!(check_whitelist("File-Read", &whitelist).is_ok());
        assert!(check_whitelist("file read", &whitelist).is_ok());
        assert!(check_whitelist("file_write", &whitelist).is_err());
    }

    #[test]
    fn clean_call_returns_resolved_paths() {
        let dir = TempDir::new().unwrap();
        let policy = SandboxPolicy::new(vec![dir.path().to_path_buf()]);
        let resolved = policy
            .inspect(
                &call("file_read", json!({"path": "docs/readme.md"})),
                &HashSet::new(),
            )
            .unwrap();
        assert_eq!(resolved, vec![dir.path().join("docs/readme.md")]);
    }

    #[test]
    fn non_object_input_skips_path_and_command_layers() {
        let policy = SandboxPolicy::new(vec![PathBuf::from("/work")]);
        assert!(policy
            .inspect(&call("todo", json!("plain string")), &HashSet::new())
            .is_ok());
    }
}
