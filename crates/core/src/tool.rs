//! Tool trait, tool call/result types, and the registry/executor.
//!
//! Tools are the agent's capabilities. The registry maps normalised names
//! to descriptors, validates inputs against each tool's declared schema,
//! and converts panics inside tool implementations into typed errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::context::CallContext;
use crate::error::{Error, ErrorKind, Result};

/// A request to execute a tool, as produced by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call id; pairs the call with its result.
    pub id: String,

    /// Tool name as the model emitted it (normalised on lookup).
    pub name: String,

    /// Arguments object, shaped by the tool's schema.
    pub input: Value,
}

/// The result of a tool execution (or of a refusal before execution).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call id this result answers.
    pub call_id: String,

    /// Tool name.
    pub name: String,

    /// Output text fed back to the model.
    pub output: String,

    /// Tool-specific structured metadata.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,

    /// Set when the call failed; the kind tells the model (and the caller)
    /// what class of failure occurred.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            output: output.into(),
            metadata: Map::new(),
            error: None,
        }
    }

    /// An error-typed result; `output` carries the message shown to the model.
    pub fn failure(
        call_id: impl Into<String>,
        name: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            output: message.into(),
            metadata: Map::new(),
            error: Some(kind),
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A tool definition as advertised to the model adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's input object.
    pub parameters: Value,
}

/// The core Tool trait.
///
/// Implementations must be safe to invoke concurrently across runs and must
/// honour the [`CallContext`] deadline/cancellation at their own suspension
/// points.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Canonical tool name (already in normalised form, e.g. `file_read`).
    fn name(&self) -> &str;

    /// Description sent to the model.
    fn description(&self) -> &str;

    /// JSON Schema describing the input object.
    fn schema(&self) -> Value;

    /// Execute with validated input.
    async fn execute(&self, call: &CallContext, input: Value) -> Result<ToolResult>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.schema(),
        }
    }
}

/// Normalise a tool name: case-insensitive, `-` and space become `_`.
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .to_ascii_lowercase()
        .replace(['-', ' '], "_")
}

struct ToolEntry {
    tool: Arc<dyn Tool>,
    validator: jsonschema::Validator,
}

/// Builder for [`ToolRegistry`]. Registration is closed once `build` runs.
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Compile schemas and freeze the registry.
    ///
    /// Name collisions keep the first registrant; each collision is recorded
    /// as a warning for the runtime to surface as a `Monitor` event.
    pub fn build(self) -> Result<ToolRegistry> {
        let mut entries: HashMap<String, ToolEntry> = HashMap::new();
        let mut warnings = Vec::new();
        for tool in self.tools {
            let name = normalize_name(tool.name());
            if entries.contains_key(&name) {
                warn!(tool = %name, "duplicate tool registration ignored");
                warnings.push(format!("duplicate tool registration ignored: {name}"));
                continue;
            }
            let validator = jsonschema::Validator::new(&tool.schema()).map_err(|e| {
                Error::Internal(format!("tool '{name}' declares an invalid schema: {e}"))
            })?;
            entries.insert(name, ToolEntry { tool, validator });
        }
        Ok(ToolRegistry { entries, warnings })
    }
}

/// Immutable name→tool mapping with schema validation and panic isolation.
pub struct ToolRegistry {
    entries: HashMap<String, ToolEntry>,
    warnings: Vec<String>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    /// An empty registry (no tools registered).
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.entries
            .get(&normalize_name(name))
            .map(|e| e.tool.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&normalize_name(name))
    }

    /// Definitions for advertising to the model, sorted by name for
    /// deterministic request bodies.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.entries.values().map(|e| e.tool.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registration-time warnings (duplicate names).
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Execute a tool call: schema-validate, then run the implementation
    /// under the call deadline with panic isolation.
    pub async fn execute(&self, call: &CallContext, tool_call: &ToolCall) -> Result<ToolResult> {
        let name = normalize_name(&tool_call.name);
        let entry = self
            .entries
            .get(&name)
            .ok_or_else(|| Error::ToolExecutionFailed {
                tool: name.clone(),
                reason: "tool is not registered".into(),
            })?;

        if !entry.validator.is_valid(&tool_call.input) {
            let violations: Vec<String> = entry
                .validator
                .iter_errors(&tool_call.input)
                .map(|e| e.to_string())
                .collect();
            return Err(Error::InvalidToolArgs {
                tool: name,
                reason: violations.join("; "),
            });
        }

        let tool = entry.tool.clone();
        let input = tool_call.input.clone();
        let child_ctx = call.clone();
        let mut handle = tokio::spawn(async move { tool.execute(&child_ctx, input).await });

        let outcome = if let Some(remaining) = call.remaining() {
            tokio::select! {
                biased;
                _ = call.cancellation().cancelled() => {
                    handle.abort();
                    return Err(Error::Cancelled);
                }
                _ = tokio::time::sleep(remaining) => {
                    handle.abort();
                    return Err(Error::Timeout);
                }
                joined = &mut handle => joined,
            }
        } else {
            tokio::select! {
                biased;
                _ = call.cancellation().cancelled() => {
                    handle.abort();
                    return Err(Error::Cancelled);
                }
                joined = &mut handle => joined,
            }
        };

        match outcome {
            Ok(result) => result.map(|mut r| {
                r.call_id = tool_call.id.clone();
                r.name = name;
                r
            }),
            Err(join_err) if join_err.is_panic() => Err(Error::ToolExecutionFailed {
                tool: name,
                reason: "tool implementation panicked".into(),
            }),
            Err(_) => Err(Error::Cancelled),
        }
    }
}
