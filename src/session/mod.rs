//! Session management
//!
//! This module handles:
//! - Per-session state shared by both backends (liveness, identity, loop counter)
//! - Approval requests waiting for the caller
//! - Permission modes and their backend translations
//! - The session manager and on-disk history

mod gate;
mod history;
mod identity;
mod loop_detector;
mod manager;
mod pending;
mod permission;
mod state;

pub use gate::{ApprovalGate, GateVerdict};
pub use history::{HistoryEntry, PREVIEW_MAX_CHARS, list_history, list_history_in, preview_line};
pub use identity::{ExtractedIds, SessionIdentity, extract_from_event, extract_from_response};
pub use loop_detector::{DEFAULT_LOOP_THRESHOLD, LoopDetector};
pub use manager::SessionManager;
pub use pending::{ParkResult, PendingRegistry, PendingTicket};
pub use permission::{CodexApprovalPolicy, PermissionMode, SandboxMode};
pub use state::SessionState;
