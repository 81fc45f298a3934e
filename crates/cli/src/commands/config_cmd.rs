//! `talon config` — print the resolved settings record.

use std::path::Path;

use talon_core::Result;

pub fn run(config: Option<&Path>, json: bool) -> Result<()> {
    let settings = super::load_settings(config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    println!("max_iterations: {}", settings.max_iterations);
    println!(
        "admission: rate={}/s burst={} concurrency={}",
        settings.rate, settings.burst, settings.concurrency
    );
    println!(
        "timeouts: run={}ms hook={}ms",
        settings.run_timeout_ms, settings.hook_timeout_ms
    );
    println!("working_set: {}", settings.working_set.join(", "));
    println!(
        "tools: {}",
        if settings.tools.is_empty() {
            "all builtins".to_string()
        } else {
            settings.tools.join(", ")
        }
    );
    println!(
        "session: backend={} dir={}",
        settings.session.backend,
        settings.session.dir.as_deref().unwrap_or("-")
    );
    println!(
        "gateway: {}:{}",
        settings.gateway.host, settings.gateway.port
    );
    if !settings.mcp_servers.is_empty() {
        println!("mcp_servers: {}", settings.mcp_servers.join(", "));
    }
    Ok(())
}
