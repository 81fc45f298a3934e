//! Talon CLI — the main entry point.
//!
//! Commands:
//! - `run`    — execute one agent run and print the result
//! - `serve`  — start the HTTP gateway
//! - `config` — print the resolved settings record
//!
//! Exit codes: 0 on success, 2 on validation failure, 1 on any other error.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use talon_core::ErrorKind;

mod commands;

#[derive(Parser)]
#[command(name = "talon", about = "Talon — agent runtime", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Extra settings file merged at runtime precedence
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one agent run
    Run {
        /// The user prompt
        #[arg(short, long)]
        prompt: String,

        /// Attach to an existing session id
        #[arg(long)]
        session: Option<String>,

        /// Per-run timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Restrict the run to these tools (repeatable)
        #[arg(long = "tool")]
        tools: Vec<String>,
    },

    /// Start the HTTP gateway
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the resolved settings
    Config {
        /// Emit JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Run {
            prompt,
            session,
            timeout_ms,
            tools,
        } => commands::run::run(cli.config.as_deref(), prompt, session, timeout_ms, tools).await,
        Commands::Serve { port } => commands::serve::run(cli.config.as_deref(), port).await,
        Commands::Config { json } => commands::config_cmd::run(cli.config.as_deref(), json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error [{}]: {e}", e.kind());
            match e.kind() {
                ErrorKind::InvalidRequest | ErrorKind::InvalidToolArgs => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}
