//! Permission modes and their per-backend translations

use serde::{Deserialize, Serialize};

use crate::types::AgentError;

/// Permission mode configured for a session
///
/// Each backend translates the mode into its own vocabulary: a
/// `--permission-mode` string for Claude Code, an approval policy plus a
/// sandbox level for Codex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PermissionMode {
    #[default]
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "read-only")]
    ReadOnly,
    #[serde(rename = "safe-yolo")]
    SafeYolo,
    #[serde(rename = "yolo")]
    Yolo,
    #[serde(rename = "bypassPermissions")]
    BypassPermissions,
    #[serde(rename = "acceptEdits")]
    AcceptEdits,
    #[serde(rename = "plan")]
    Plan,
}

impl PermissionMode {
    /// Parse from the configuration string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "default" => Some(Self::Default),
            "read-only" => Some(Self::ReadOnly),
            "safe-yolo" => Some(Self::SafeYolo),
            "yolo" => Some(Self::Yolo),
            "bypassPermissions" => Some(Self::BypassPermissions),
            "acceptEdits" => Some(Self::AcceptEdits),
            "plan" => Some(Self::Plan),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::ReadOnly => "read-only",
            Self::SafeYolo => "safe-yolo",
            Self::Yolo => "yolo",
            Self::BypassPermissions => "bypassPermissions",
            Self::AcceptEdits => "acceptEdits",
            Self::Plan => "plan",
        }
    }

    /// Value for Claude Code's `--permission-mode` flag
    pub fn claude_mode(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::ReadOnly | Self::Plan => "plan",
            Self::SafeYolo | Self::AcceptEdits => "acceptEdits",
            Self::Yolo | Self::BypassPermissions => "bypassPermissions",
        }
    }

    /// Approval policy and sandbox for Codex `codex` tool calls
    pub fn codex_settings(&self) -> (CodexApprovalPolicy, SandboxMode) {
        match self {
            Self::Default | Self::Plan => {
                (CodexApprovalPolicy::Untrusted, SandboxMode::WorkspaceWrite)
            }
            Self::ReadOnly => (CodexApprovalPolicy::Never, SandboxMode::ReadOnly),
            Self::SafeYolo => (CodexApprovalPolicy::OnFailure, SandboxMode::WorkspaceWrite),
            Self::Yolo | Self::BypassPermissions => {
                (CodexApprovalPolicy::OnFailure, SandboxMode::DangerFullAccess)
            }
            Self::AcceptEdits => (CodexApprovalPolicy::OnRequest, SandboxMode::WorkspaceWrite),
        }
    }
}

impl std::str::FromStr for PermissionMode {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| AgentError::invalid_mode(s))
    }
}

impl std::fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When Codex asks before running a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodexApprovalPolicy {
    /// Ask before anything not known to be safe
    Untrusted,
    /// Ask only when a sandboxed command fails
    OnFailure,
    /// Let the model decide when to ask
    OnRequest,
    Never,
}

impl CodexApprovalPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Untrusted => "untrusted",
            Self::OnFailure => "on-failure",
            Self::OnRequest => "on-request",
            Self::Never => "never",
        }
    }
}

/// Filesystem restriction requested when starting a Codex conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxMode {
    ReadOnly,
    WorkspaceWrite,
    DangerFullAccess,
}

impl SandboxMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::WorkspaceWrite => "workspace-write",
            Self::DangerFullAccess => "danger-full-access",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_mode_parse() {
        for mode in [
            PermissionMode::Default,
            PermissionMode::ReadOnly,
            PermissionMode::SafeYolo,
            PermissionMode::Yolo,
            PermissionMode::BypassPermissions,
            PermissionMode::AcceptEdits,
            PermissionMode::Plan,
        ] {
            assert_eq!(PermissionMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(PermissionMode::parse("invalid"), None);
        assert!("turbo".parse::<PermissionMode>().is_err());
    }

    #[test]
    fn test_codex_settings_table() {
        use CodexApprovalPolicy as P;
        use SandboxMode as S;

        let table = [
            (PermissionMode::Default, P::Untrusted, S::WorkspaceWrite),
            (PermissionMode::ReadOnly, P::Never, S::ReadOnly),
            (PermissionMode::SafeYolo, P::OnFailure, S::WorkspaceWrite),
            (PermissionMode::Yolo, P::OnFailure, S::DangerFullAccess),
            (PermissionMode::BypassPermissions, P::OnFailure, S::DangerFullAccess),
            (PermissionMode::AcceptEdits, P::OnRequest, S::WorkspaceWrite),
            (PermissionMode::Plan, P::Untrusted, S::WorkspaceWrite),
        ];
        for (mode, policy, sandbox) in table {
            assert_eq!(mode.codex_settings(), (policy, sandbox), "mode {mode}");
        }
    }

    #[test]
    fn test_claude_mode() {
        assert_eq!(PermissionMode::ReadOnly.claude_mode(), "plan");
        assert_eq!(PermissionMode::Yolo.claude_mode(), "bypassPermissions");
        assert_eq!(PermissionMode::AcceptEdits.claude_mode(), "acceptEdits");
    }

    #[test]
    fn test_wire_strings() {
        assert_eq!(CodexApprovalPolicy::Untrusted.as_str(), "untrusted");
        assert_eq!(SandboxMode::DangerFullAccess.as_str(), "danger-full-access");
    }
}
