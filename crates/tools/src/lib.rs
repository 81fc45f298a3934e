//! Built-in tool implementations for the Talon runtime.
//!
//! Tools give the agent its capabilities: shell execution, file access
//! (confined to the working set), content search, HTTP fetch, web search,
//! and plan/delegation tracking. [`builtin_registry`] assembles a registry
//! builder from an optional selection so deployments register only what
//! they allow; custom tools are appended before `build()`.

pub mod bash_run;
pub mod file_edit;
pub mod file_read;
pub mod file_write;
pub mod glob;
pub mod grep;
pub mod task;
pub mod todo;
pub mod web_fetch;
pub mod web_search;

pub use bash_run::BashRunTool;
pub use file_edit::FileEditTool;
pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use grep::GrepTool;
pub use self::glob::GlobTool;
pub use task::TaskTool;
pub use todo::TodoTool;
pub use web_fetch::WebFetchTool;
pub use web_search::WebSearchTool;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use talon_core::{normalize_name, Tool, ToolRegistryBuilder};
use talon_security::CommandPolicy;

/// Shared configuration for the built-in tool set.
#[derive(Debug, Clone)]
pub struct BuiltinConfig {
    /// Filesystem roots the file tools may touch.
    pub working_set: Vec<PathBuf>,
    /// Blocklist applied by the shell tool.
    pub command_policy: CommandPolicy,
}

/// Registry builder with the selected built-ins registered.
///
/// `selection == None` registers everything; otherwise only the named tools
/// (normalised) are included. Callers append custom tools before building.
pub fn builtin_registry(
    config: &BuiltinConfig,
    selection: Option<&HashSet<String>>,
) -> ToolRegistryBuilder {
    let wanted = |name: &str| {
        selection.is_none_or(|names| names.contains(&normalize_name(name)))
    };

    let all: Vec<Arc<dyn Tool>> = vec![
        Arc::new(BashRunTool::new(config.command_policy.clone())),
        Arc::new(FileReadTool::new(config.working_set.clone())),
        Arc::new(FileWriteTool::new(config.working_set.clone())),
        Arc::new(FileEditTool::new(config.working_set.clone())),
        Arc::new(GrepTool::new(config.working_set.clone())),
        Arc::new(GlobTool::new(config.working_set.clone())),
        Arc::new(WebFetchTool::new()),
        Arc::new(WebSearchTool),
        Arc::new(TodoTool::new()),
        Arc::new(TaskTool::new()),
    ];

    let mut builder = ToolRegistryBuilder::new();
    for tool in all {
        if wanted(tool.name()) {
            builder = builder.register(tool);
        }
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BuiltinConfig {
        BuiltinConfig {
            working_set: vec![std::env::temp_dir()],
            command_policy: CommandPolicy::default(),
        }
    }

    #[test]
    fn full_registry_has_all_builtins() {
        let registry = builtin_registry(&config(), None).build().unwrap();
        for name in [
            "bash_run",
            "file_read",
            "file_write",
            "file_edit",
            "grep",
            "glob",
            "web_fetch",
            "web_search",
            "todo",
            "task",
        ] {
            assert!(registry.contains(name), "missing builtin {name}");
        }
    }

    #[test]
    fn selection_filters_builtins() {
        let selection: HashSet<String> = ["file_read".to_string(), "Bash-Run".to_string()]
            .into_iter()
            .map(|s| normalize_name(&s))
            .collect();
        let registry = builtin_registry(&config(), Some(&selection))
            .build()
            .unwrap();
        assert!(registry.contains("file_read"));
        assert!(registry.contains("bash_run"));
        assert!(!registry.contains("web_search"));
        assert_eq!(registry.names().len(), 2);
    }
}
