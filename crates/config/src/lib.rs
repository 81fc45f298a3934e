//! Validated settings record for the Talon runtime.
//!
//! The runtime consumes a [`Settings`] value assembled from up to five
//! layers (managed > runtime > local > project > user, deep-merged) plus a
//! closed set of environment overrides. File discovery and parsing beyond
//! the TOML helper here belongs to the hosting application.

pub mod merge;

pub use merge::{merge_layers, merge_values};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use talon_core::{Error, Result};

/// Environment keys the runtime consumes (closed set).
pub const ENV_PROJECT_ROOT: &str = "TALON_PROJECT_ROOT";
pub const ENV_API_KEY: &str = "TALON_API_KEY";
pub const ENV_BASE_URL: &str = "TALON_BASE_URL";
pub const ENV_MCP_SERVERS: &str = "TALON_MCP_SERVERS";

/// Configuration layers in ascending precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Layer {
    User,
    Project,
    Local,
    Runtime,
    Managed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8420
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// `memory` or `file`.
    #[serde(default = "default_session_backend")]
    pub backend: String,
    /// Directory for the file backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

fn default_session_backend() -> String {
    "memory".into()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: default_session_backend(),
            dir: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Default)]
pub struct ModelConfig {
    /// Adapter name the hosting application wires up.
    #[serde(default)]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// The root settings record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Token-bucket refill rate per second.
    #[serde(default = "default_rate")]
    pub rate: f64,

    /// Token-bucket burst capacity.
    #[serde(default = "default_burst")]
    pub burst: f64,

    /// Maximum concurrent runs.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-hook middleware deadline in milliseconds (0 = unbounded).
    #[serde(default)]
    pub hook_timeout_ms: u64,

    /// Default per-run timeout in milliseconds (0 = unbounded).
    #[serde(default = "default_run_timeout_ms")]
    pub run_timeout_ms: u64,

    /// Filesystem roots tools may touch.
    #[serde(default)]
    pub working_set: Vec<String>,

    /// Built-in tool selection; empty registers every built-in.
    #[serde(default)]
    pub tools: Vec<String>,

    /// Extra phrases for the command blocklist.
    #[serde(default)]
    pub blocked_patterns: Vec<String>,

    /// Extra base commands for the command blocklist.
    #[serde(default)]
    pub blocked_commands: Vec<String>,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub model: ModelConfig,

    /// MCP servers the hosting application may connect.
    #[serde(default)]
    pub mcp_servers: Vec<String>,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_rate() -> f64 {
    5.0
}
fn default_burst() -> f64 {
    10.0
}
fn default_concurrency() -> usize {
    8
}
fn default_run_timeout_ms() -> u64 {
    120_000
}

impl Default for Settings {
    fn default() -> Self {
        serde_json::from_value(Value::Object(serde_json::Map::new()))
            .expect("empty settings object must deserialize")
    }
}

impl Settings {
    /// Assemble settings from raw layer values.
    ///
    /// Layers may arrive in any order; they are merged in ascending
    /// precedence before deserialisation.
    pub fn resolve(mut layers: Vec<(Layer, Value)>) -> Result<Self> {
        layers.sort_by_key(|(layer, _)| *layer);
        let merged = merge_layers(layers.iter().map(|(_, value)| value));
        debug!(layers = layers.len(), "settings layers merged");
        let settings: Settings = serde_json::from_value(merged)
            .map_err(|e| Error::InvalidRequest(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply the closed set of environment overrides.
    pub fn apply_env<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = get(ENV_PROJECT_ROOT) {
            let root = root.trim().to_string();
            if !root.is_empty() && !self.working_set.contains(&root) {
                self.working_set.insert(0, root);
            }
        }
        if let Some(key) = get(ENV_API_KEY) {
            self.model.api_key = Some(key);
        }
        if let Some(url) = get(ENV_BASE_URL) {
            self.model.base_url = Some(url);
        }
        if let Some(servers) = get(ENV_MCP_SERVERS) {
            self.mcp_servers = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::InvalidRequest(
                "max_iterations must be positive".into(),
            ));
        }
        if self.rate <= 0.0 || self.burst < 1.0 {
            return Err(Error::InvalidRequest(
                "rate must be positive and burst at least 1".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(Error::InvalidRequest("concurrency must be positive".into()));
        }
        if self.session.backend != "memory" && self.session.backend != "file" {
            return Err(Error::InvalidRequest(format!(
                "unknown session backend '{}'",
                self.session.backend
            )));
        }
        if self.session.backend == "file" && self.session.dir.is_none() {
            return Err(Error::InvalidRequest(
                "file session backend requires session.dir".into(),
            ));
        }
        Ok(())
    }
}

/// Parse a TOML document into a raw layer value.
pub fn parse_toml_layer(text: &str) -> Result<Value> {
    let parsed: toml::Value = toml::from_str(text)
        .map_err(|e| Error::InvalidRequest(format!("invalid settings file: {e}")))?;
    serde_json::to_value(parsed).map_err(Into::into)
}

/// Read the closed environment key set from the process environment.
pub fn process_env(key: &str) -> Option<String> {
    match key {
        ENV_PROJECT_ROOT | ENV_API_KEY | ENV_BASE_URL | ENV_MCP_SERVERS => {
            std::env::var(key).ok()
        }
        _ => None,
    }
}

/// Convenience map-backed getter for tests and embedders.
pub fn env_from_map(map: HashMap<String, String>) -> impl Fn(&str) -> Option<String> {
    move |key| map.get(key).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert_eq!(settings.max_iterations, 10);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn layer_precedence_managed_wins() {
        let settings = Settings::resolve(vec![
            (Layer::Managed, json!({"max_iterations": 3})),
            (Layer::User, json!({"max_iterations": 25, "rate": 2.0})),
            (Layer::Project, json!({"max_iterations": 15})),
        ])
        .unwrap();
        assert_eq!(settings.max_iterations, 3);
        assert!((settings.rate - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn lists_accumulate_across_layers() {
        let settings = Settings::resolve(vec![
            (Layer::User, json!({"working_set": ["/home/dev/project"]})),
            (
                Layer::Project,
                json!({"working_set": ["/srv/data", "/home/dev/project"]}),
            ),
        ])
        .unwrap();
        assert_eq!(settings.working_set, vec!["/home/dev/project", "/srv/data"]);
    }

    #[test]
    fn invalid_settings_rejected() {
        let err = Settings::resolve(vec![(Layer::User, json!({"max_iterations": 0}))]).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        let err =
            Settings::resolve(vec![(Layer::User, json!({"session": {"backend": "redis"}}))])
                .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let mut settings = Settings::default();
        let env = env_from_map(HashMap::from([
            (ENV_PROJECT_ROOT.to_string(), "/work/repo".to_string()),
            (ENV_API_KEY.to_string(), "sk-test".to_string()),
            (
                ENV_MCP_SERVERS.to_string(),
                "http://a:1, http://b:2".to_string(),
            ),
        ]));
        settings.apply_env(env);
        assert_eq!(settings.working_set[0], "/work/repo");
        assert_eq!(settings.model.api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.mcp_servers, vec!["http://a:1", "http://b:2"]);
    }

    #[test]
    fn toml_layer_parses() {
        let value = parse_toml_layer(
            r#"
            max_iterations = 5

            [gateway]
            port = 9000
        "#,
        )
        .unwrap();
        let settings = Settings::resolve(vec![(Layer::User, value)]).unwrap();
        assert_eq!(settings.max_iterations, 5);
        assert_eq!(settings.gateway.port, 9000);
    }

    #[test]
    fn model_config_debug_redacts_key() {
        let config = ModelConfig {
            provider: "anthropic".into(),
            api_key: Some("sk-secret".into()),
            base_url: None,
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("REDACTED"));
    }
}
