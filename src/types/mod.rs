//! Public types shared across the crate

mod approval;
mod backend;
mod config;
mod content;
mod error;
mod output;

pub use approval::{ApprovalDecision, ApprovalOutcome, LoopDetected, PendingApproval};
pub use backend::BackendKind;
pub use config::{
    ENV_AUTO_APPROVE_EDITS, ENV_CLAUDE_PATH, ENV_CODEX_PATH, ENV_LOOP_THRESHOLD, ENV_MODEL,
    ENV_PERMISSION_MODE, SupervisorConfig,
};
pub use content::{Content, ContentBlock};
pub use error::{AgentError, ErrorCode, Result};
pub use output::{OutputEvent, OutputKind};
