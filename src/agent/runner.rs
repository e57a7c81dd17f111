//! Terminal runner
//!
//! Entry point for the `agent-supervisor` binary: one supervised session
//! driven from stdin, with approvals answered by slash commands.

use std::path::Path;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::mpsc;

use super::{Agent, StartOptions, create_agent};
use crate::chat::{ChatBridge, ChatPlatform, TerminalPlatform};
use crate::cli::Cli;
use crate::logging::init_logging;
use crate::session::list_history;
use crate::types::{AgentError, SupervisorConfig};

pub use crate::logging::shutdown_otel;

const HELP: &str = "\
Commands:
  <text>                   send a message
  /image <path> [caption]  send an image with an optional caption
  /approve <id>            allow one pending request
  /deny <id> [reason]      deny one pending request
  /approve-all             allow everything until the turn ends
  /deny-all [reason]       deny everything pending
  /pending                 list pending requests
  /interrupt               abort the current turn
  /session                 show the session id
  /quit, /kill             stop the agent and exit";

/// One line of terminal input
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Prompt(String),
    Image { path: String, caption: Option<String> },
    Approve(String),
    Deny { id: String, reason: Option<String> },
    ApproveAll,
    DenyAll(Option<String>),
    Pending,
    Interrupt,
    Session,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

fn rest(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

pub(crate) fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(stripped) = line.strip_prefix('/') else {
        return Command::Prompt(line.to_string());
    };
    let (name, args) = stripped.split_once(char::is_whitespace).unwrap_or((stripped, ""));
    let (first, tail) = {
        let args = args.trim();
        args.split_once(char::is_whitespace).unwrap_or((args, ""))
    };

    match name {
        "approve" | "deny" if first.is_empty() => Command::Invalid(format!("/{name} needs a request id")),
        "approve" => Command::Approve(first.to_string()),
        "deny" => Command::Deny {
            id: first.to_string(),
            reason: rest(tail),
        },
        "approve-all" => Command::ApproveAll,
        "deny-all" => Command::DenyAll(rest(args)),
        "pending" => Command::Pending,
        "interrupt" | "stop" => Command::Interrupt,
        "session" => Command::Session,
        "help" => Command::Help,
        "quit" | "exit" | "kill" => Command::Quit,
        "image" if first.is_empty() => Command::Invalid("/image needs a file path".to_string()),
        "image" => Command::Image {
            path: first.to_string(),
            caption: rest(tail),
        },
        other => Command::Invalid(format!("Unknown command /{other}, try /help")),
    }
}

/// Run the supervisor with CLI arguments
///
/// Initializes logging, then either lists history or runs one interactive
/// session until `/quit` or end of input.
pub async fn run_with_cli(cli: &Cli) -> anyhow::Result<()> {
    let startup_time = std::time::Instant::now();

    // Initialize logging first (must happen before any tracing)
    init_logging(cli)?;

    let cwd = match &cli.cwd {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };

    {
        let startup_span = tracing::info_span!(
            "supervisor_startup",
            version = %env!("CARGO_PKG_VERSION"),
            pid = %std::process::id(),
            backend = %cli.backend,
            diagnostic = %cli.is_diagnostic(),
        );
        let _enter = startup_span.enter();

        tracing::info!("========== Agent Supervisor Starting ==========");
        tracing::info!(cwd = %cwd.display(), "Working directory");
        if cli.is_diagnostic() {
            tracing::info!(log_path = %cli.log_path().display(), "Diagnostic mode enabled");
        }
        if let Some(otel_endpoint) = &cli.otel_endpoint {
            tracing::info!(otel_endpoint = %otel_endpoint, "OpenTelemetry tracing enabled");
        }
        tracing::info!(
            init_elapsed_ms = startup_time.elapsed().as_millis(),
            "Logging initialized"
        );
    }

    if cli.history {
        print_history(cli, &cwd);
        return Ok(());
    }

    let mut config = SupervisorConfig::load(&cwd)?;
    cli.apply_to(&mut config);
    tracing::debug!(
        permission_mode = %config.permission_mode,
        model = ?config.model,
        loop_threshold = config.loop_threshold,
        "Configuration resolved"
    );

    let agent = create_agent(cli.backend, &config)?;
    let platform: Arc<dyn ChatPlatform> = Arc::new(TerminalPlatform::new(cwd));
    let bridge = ChatBridge::new(Arc::clone(&platform));

    agent.start(bridge.callbacks(), start_options(cli)).await;
    if let Err(e) = agent.wait_ready().await {
        agent.kill().await;
        bridge.close().await;
        anyhow::bail!("{} failed to start: {e}", cli.backend);
    }
    platform
        .send_welcome(agent.kind(), agent.current_session_id().as_deref())
        .await?;

    emit_ready_trace(startup_time.elapsed()).await;

    let result = repl(&agent, &bridge).await;

    agent.kill().await;
    bridge.close().await;
    emit_shutdown_trace(startup_time.elapsed()).await;

    result
}

fn start_options(cli: &Cli) -> StartOptions {
    match &cli.resume {
        Some(id) => StartOptions::resume(id.clone()),
        None if cli.continue_last => StartOptions::continue_last(),
        None => StartOptions::default(),
    }
}

fn print_history(cli: &Cli, cwd: &Path) {
    let entries = list_history(cli.backend, cwd, cli.history_limit);
    if entries.is_empty() {
        println!("No {} conversations for {}", cli.backend, cwd.display());
        return;
    }
    for entry in entries {
        println!(
            "{}  {}  {}",
            entry.modified.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
            entry.id,
            entry.preview.as_deref().unwrap_or("")
        );
    }
}

async fn repl(agent: &Arc<dyn Agent>, bridge: &ChatBridge) -> anyhow::Result<()> {
    let platform = Arc::clone(bridge.platform());
    let mut lines = stdin_lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
            signal = &mut shutdown => {
                eprintln!("Received {signal}, shutting down...");
                break;
            }
        };
        if !agent.is_alive() {
            platform.push_text("Agent is no longer running").await?;
            break;
        }
        match parse_command(&line) {
            Command::Empty => {}
            Command::Prompt(text) => match bridge.build_content(Some(&text), &[]).await {
                Ok(content) => spawn_send(agent, &platform, content),
                Err(e) => platform.push_text(&format!("⚠ {e}")).await?,
            },
            Command::Image { path, caption } => {
                match bridge.build_content(caption.as_deref(), &[path]).await {
                    Ok(content) => spawn_send(agent, &platform, content),
                    Err(e) => platform.push_text(&format!("⚠ {e}")).await?,
                }
            }
            Command::Approve(id) => {
                let found = agent.approve(&id, None);
                platform.push_text(&answered(&id, found, "Approved")).await?;
            }
            Command::Deny { id, reason } => {
                let found = agent.deny(&id, reason);
                platform.push_text(&answered(&id, found, "Denied")).await?;
            }
            Command::ApproveAll => {
                let count = agent.approve_all();
                platform
                    .push_text(&format!("Approved {count} pending, allowing the rest of this turn"))
                    .await?;
            }
            Command::DenyAll(reason) => {
                let count = agent.deny_all(reason);
                platform.push_text(&format!("Denied {count} pending")).await?;
            }
            Command::Pending => {
                let pending = agent.list_pending();
                if pending.is_empty() {
                    platform.push_text("Nothing pending").await?;
                }
                for request in pending {
                    platform
                        .push_text(&crate::chat::format::approval_prompt(&request))
                        .await?;
                }
            }
            Command::Interrupt => {
                if let Err(e) = agent.interrupt().await {
                    platform.push_text(&format!("⚠ {e}")).await?;
                }
            }
            Command::Session => {
                let id = agent.current_session_id();
                platform
                    .push_text(id.as_deref().unwrap_or("No session id yet"))
                    .await?;
            }
            Command::Help => platform.push_text(HELP).await?,
            Command::Quit => break,
            Command::Invalid(message) => platform.push_text(&message).await?,
        }
    }
    Ok(())
}

/// Lines from stdin, read on a plain thread so a pending read never holds
/// the runtime open at exit
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });
    rx
}

/// Resolves with the signal name on SIGINT or SIGTERM
#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to register SIGTERM handler");
            drop(signal::ctrl_c().await);
            return "SIGINT";
        }
    };
    tokio::select! {
        _ = signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    drop(signal::ctrl_c().await);
    "SIGINT"
}

fn answered(id: &str, found: bool, verb: &str) -> String {
    if found {
        format!("{verb} {id}")
    } else {
        format!("No pending request {id}")
    }
}

/// Sends run in the background so approvals can be answered mid-turn
fn spawn_send(agent: &Arc<dyn Agent>, platform: &Arc<dyn ChatPlatform>, content: crate::types::Content) {
    let agent = Arc::clone(agent);
    let platform = Arc::clone(platform);
    tokio::spawn(async move {
        match agent.send(content).await {
            Ok(()) | Err(AgentError::Cancelled) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Send failed");
                drop(platform.push_text(&format!("⚠ {e}")).await);
            }
        }
    });
}

/// Emit a short-lived trace to indicate the session is ready
#[tracing::instrument(name = "supervisor_ready", skip_all, fields(
    startup_ms = %startup_duration.as_millis(),
    version = %env!("CARGO_PKG_VERSION"),
))]
async fn emit_ready_trace(startup_duration: std::time::Duration) {
    tracing::info!(
        startup_ms = startup_duration.as_millis(),
        "Supervisor ready and waiting for input"
    );
    // Small delay to ensure span is exported before continuing
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
}

#[tracing::instrument(name = "supervisor_shutdown", skip_all, fields(
    uptime_secs = %total_uptime.as_secs(),
))]
async fn emit_shutdown_trace(total_uptime: std::time::Duration) {
    tracing::info!(
        uptime_secs = total_uptime.as_secs(),
        uptime_ms = total_uptime.as_millis(),
        "========== Supervisor Shutdown Complete =========="
    );
}
