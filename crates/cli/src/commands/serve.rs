//! `talon serve` — start the HTTP gateway.

use std::path::Path;
use std::sync::Arc;

use talon_core::Result;
use talon_runtime::ScriptedModel;

pub async fn run(config: Option<&Path>, port: Option<u16>) -> Result<()> {
    let mut settings = super::load_settings(config)?;
    if let Some(port) = port {
        settings.gateway.port = port;
    }

    // The gateway serves whatever model adapter the deployment wires in;
    // without one it answers from the scripted placeholder.
    let model = Arc::new(ScriptedModel::always_text(
        "no model provider configured; this is the placeholder adapter",
    ));
    talon_gateway::serve(settings, model).await
}
