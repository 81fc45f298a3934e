pub mod config_cmd;
pub mod run;
pub mod serve;

use std::path::Path;

use talon_config::{parse_toml_layer, process_env, Layer, Settings};
use talon_core::{Error, Result};

/// Resolve settings from the standard layers plus an optional runtime file.
///
/// Layers, lowest precedence first: `~/.talon/config.toml` (user),
/// `./talon.toml` (project), then `--config <file>` (runtime). The closed
/// environment key set is applied last.
pub fn load_settings(runtime_file: Option<&Path>) -> Result<Settings> {
    let mut layers = Vec::new();

    if let Some(home) = std::env::var_os("HOME") {
        let user_path = Path::new(&home).join(".talon").join("config.toml");
        if let Some(value) = read_layer(&user_path)? {
            layers.push((Layer::User, value));
        }
    }
    if let Some(value) = read_layer(Path::new("talon.toml"))? {
        layers.push((Layer::Project, value));
    }
    if let Some(path) = runtime_file {
        let value = read_layer(path)?.ok_or_else(|| {
            Error::InvalidRequest(format!("settings file not found: {}", path.display()))
        })?;
        layers.push((Layer::Runtime, value));
    }

    let mut settings = Settings::resolve(layers)?;
    settings.apply_env(process_env);
    if settings.working_set.is_empty() {
        // Without a configured working set, confine tools to the current
        // directory rather than refusing every path.
        if let Ok(cwd) = std::env::current_dir() {
            settings.working_set.push(cwd.display().to_string());
        }
    }
    Ok(settings)
}

fn read_layer(path: &Path) -> Result<Option<serde_json::Value>> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_toml_layer(&text).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Internal(format!("read {}: {e}", path.display()))),
    }
}
