//! `talon run` — execute one agent run and print the result.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use talon_core::{
    AgentContext, CallContext, Model, ModelOutput, Result, RunMode, RunRequest, KEY_PROMPT,
};
use talon_gateway::build_runtime;

/// Offline placeholder adapter: echoes the prompt back as a finished
/// answer. Deployments wire a real provider through the library API.
struct OfflineModel;

#[async_trait]
impl Model for OfflineModel {
    fn name(&self) -> &str {
        "offline"
    }

    async fn generate(&self, call: &CallContext, agent: &AgentContext) -> Result<ModelOutput> {
        call.check()?;
        let prompt = agent
            .values
            .get(KEY_PROMPT)
            .and_then(serde_json::Value::as_str)
            .unwrap_or("(no prompt)");
        Ok(ModelOutput::text(format!(
            "[offline model] no provider configured; echoing prompt: {prompt}"
        )))
    }
}

pub async fn run(
    config: Option<&Path>,
    prompt: String,
    session: Option<String>,
    timeout_ms: Option<u64>,
    tools: Vec<String>,
) -> Result<()> {
    let settings = super::load_settings(config)?;
    let runner = build_runtime(&settings, Arc::new(OfflineModel))?;

    let mut request = RunRequest::new(prompt, RunMode::Cli);
    request.session_id = session;
    request.timeout = timeout_ms.map(Duration::from_millis);
    if !tools.is_empty() {
        request = request.with_whitelist(tools);
    }

    let response = runner.run(request).await?;

    println!("{}", response.output);
    println!();
    println!(
        "session: {}  stop: {}  iterations: {}  tokens: {}",
        response.session_id,
        response.stop_reason,
        response.iterations,
        response.usage.total_tokens
    );
    if !response.sandbox_report.is_empty() {
        println!("sandbox refusals:");
        for incident in &response.sandbox_report {
            println!("  - {} ({}): {}", incident.tool, incident.kind, incident.message);
        }
    }
    Ok(())
}
