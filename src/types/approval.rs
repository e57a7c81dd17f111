//! Approval types shared by the registry, the backends and callers

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Decision resolving one pending approval request
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalDecision {
    /// Allow the action, optionally with modified parameters
    Allow { updated_input: Option<Value> },
    /// Deny the action with a human-readable reason
    Deny { reason: String },
}

impl ApprovalDecision {
    pub const DEFAULT_DENY_REASON: &'static str = "Denied by user";

    pub fn allow() -> Self {
        Self::Allow {
            updated_input: None,
        }
    }

    pub fn deny(reason: Option<String>) -> Self {
        Self::Deny {
            reason: reason.unwrap_or_else(|| Self::DEFAULT_DENY_REASON.to_string()),
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

/// How a parked approval ended
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalOutcome {
    Decided(ApprovalDecision),
    /// Cancelled by the subprocess or by session teardown
    Cancelled,
}

/// Snapshot of a pending approval request
///
/// This is what callers see through `list_pending` and the approval callback;
/// the resolution continuation stays inside the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingApproval {
    pub request_id: String,
    pub action: String,
    pub input: Value,
    pub created_at: DateTime<Utc>,
}

/// Notification sent when the loop detector trips
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopDetected {
    pub consecutive_failures: u32,
    pub session_id: Option<String>,
}
