//! Agent Supervisor
//!
//! Runs Claude Code or Codex as a child process and mediates every action
//! it wants to take, so a chat front end can drive either one through a
//! single [`Agent`] contract.
//!
//! ## Features
//!
//! - Claude Code over the stream-json line protocol, with tool approvals
//!   answered through `control_request` / `control_response`
//! - Codex over its MCP server, with approvals answered through
//!   `elicitation/create`
//! - Approval policy: safe read-only commands auto-approve, dangerous
//!   commands always ask
//! - Loop detection: a turn with 20 failed tool calls in a row is
//!   interrupted
//! - Session identity for resume, and on-disk conversation history
//!
//! ## Quick Start
//!
//! ```no_run
//! use agent_supervisor::{AgentCallbacks, BackendKind, Content, StartOptions, SupervisorConfig, create_agent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SupervisorConfig::load(".")?;
//!     let agent = create_agent(BackendKind::Codex, &config)?;
//!     let callbacks = AgentCallbacks::new(|event| println!("{event:?}"))
//!         .with_approval(|request| println!("needs approval: {}", request.request_id));
//!     agent.start(callbacks, StartOptions::default()).await;
//!     agent.wait_ready().await?;
//!     agent.send(Content::Text("list the files here".into())).await?;
//!     agent.kill().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! - `AGENT_CLAUDE_PATH`: Claude Code executable (default: `claude`)
//! - `AGENT_CODEX_PATH`: Codex executable (default: `codex`)
//! - `AGENT_PERMISSION_MODE`: `default`, `read-only`, `safe-yolo`, `yolo`, ...
//! - `AGENT_MODEL`: Model to request from the backend
//! - `AGENT_LOOP_THRESHOLD`: Consecutive failures before a turn is interrupted
//! - `AGENT_AUTO_APPROVE_EDITS`: Auto-approve file edits (`true`/`false`)
//!
//! ## Configuration Loading Priority
//!
//! 1. **Environment Variables** - Override all other sources
//! 2. **Settings Files** - Merged, later files override earlier ones
//! 3. **Defaults**
//!
//! Settings files are loaded from:
//! - `~/.agent-supervisor/settings.json` (user settings)
//! - `.agent-supervisor/settings.json` (project settings)
//! - `.agent-supervisor/settings.local.json` (local settings, highest priority among settings files)

pub mod agent;
pub mod chat;
pub mod claude;
pub mod cli;
pub mod codex;
pub mod logging;
pub mod permissions;
pub mod process;
pub mod session;
pub mod settings;
pub mod types;

pub use agent::{Agent, AgentCallbacks, StartOptions, create_agent, run_with_cli, shutdown_otel};
pub use chat::{Attachment, ChatBridge, ChatPlatform, TerminalPlatform};
pub use claude::ClaudeAgent;
pub use cli::Cli;
pub use codex::CodexAgent;
pub use permissions::{ApprovalPolicy, PolicyConfig, PolicyVerdict};
pub use session::{
    CodexApprovalPolicy, HistoryEntry, LoopDetector, PermissionMode, SandboxMode, SessionManager,
    list_history,
};
pub use settings::{Settings, SettingsManager};
pub use types::{
    AgentError, ApprovalDecision, BackendKind, Content, ContentBlock, LoopDetected, OutputEvent,
    OutputKind, PendingApproval, Result, SupervisorConfig,
};
