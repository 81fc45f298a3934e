//! Command and argument validation for shell-style tools.
//!
//! A small, configurable blocklist: destructive phrases are matched
//! case-insensitively anywhere in the command line, and base commands can
//! be banned outright.

use serde::{Deserialize, Serialize};

use talon_core::{Error, Result};

/// Blocklist policy for shell-style tool arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandPolicy {
    /// Phrases rejected anywhere in the command line (case-insensitive).
    pub blocked_patterns: Vec<String>,

    /// Base commands (first word) rejected outright.
    pub blocked_commands: Vec<String>,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            blocked_patterns: vec![
                "rm -rf".into(),
                "rm -fr".into(),
                "drop table".into(),
                "drop database".into(),
                "truncate table".into(),
                "mkfs".into(),
                "dd if=".into(),
                ":(){".into(),
                "> /dev/sd".into(),
                "system.exit".into(),
            ],
            blocked_commands: vec![
                "shutdown".into(),
                "reboot".into(),
                "halt".into(),
                "poweroff".into(),
                "mkfs".into(),
            ],
        }
    }
}

impl CommandPolicy {
    /// An empty policy that blocks nothing. Useful in tests.
    pub fn permissive() -> Self {
        Self {
            blocked_patterns: Vec::new(),
            blocked_commands: Vec::new(),
        }
    }

    /// Validate one command line. Pure function, no I/O.
    pub fn validate(&self, command: &str) -> Result<()> {
        let lowered = command.to_lowercase();

        if let Some(hit) = self
            .blocked_patterns
            .iter()
            .find(|p| lowered.contains(&p.to_lowercase()))
        {
            return Err(Error::BlockedCommand(format!(
                "command contains blocked phrase '{hit}'"
            )));
        }

        let base = command.split_whitespace().next().unwrap_or("");
        if self
            .blocked_commands
            .iter()
            .any(|c| c.eq_ignore_ascii_case(base))
        {
            return Err(Error::BlockedCommand(format!(
                "command '{base}' is on the blocklist"
            )));
        }

        Ok(())
    }
}
