//! Agent supervisor binary
//!
//! Run with: cargo run -- --backend codex
//!
//! For help: cargo run -- --help

use std::io::IsTerminal;

use agent_supervisor::{cli::Cli, run_with_cli, shutdown_otel};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // SIGINT/SIGTERM end the input loop inside the runner, which kills the session
    let result = run_with_cli(&cli).await;

    // Shutdown OpenTelemetry to flush all pending spans
    shutdown_otel();

    if let Err(e) = result {
        eprintln!("Error: {e:#}");

        if std::io::stdin().is_terminal() {
            eprintln!("\nFor debugging, run with --diagnostic to log to a file.");
            eprintln!("Or use -v/-vv/-vvv for more verbose logging.");
        }

        std::process::exit(1);
    }

    Ok(())
}
