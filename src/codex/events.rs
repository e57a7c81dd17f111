//! `codex/event` notifications and elicitation requests

use serde_json::{Map, Value, json};

use crate::types::ApprovalDecision;

pub const EVENT_METHOD: &str = "codex/event";
pub const ELICITATION_METHOD: &str = "elicitation/create";
pub const CANCELLED_METHOD: &str = "notifications/cancelled";

/// Action name used for command approvals
pub const SHELL_ACTION: &str = "shell";
/// Action name used for patch approvals
pub const PATCH_ACTION: &str = "apply_patch";

/// A Codex event reduced to what the supervisor acts on
#[derive(Debug, Clone, PartialEq)]
pub enum CodexEvent {
    SessionConfigured {
        session_id: Option<String>,
        model: Option<String>,
    },
    TaskStarted,
    TextDelta(String),
    /// Complete assistant message
    AgentMessage(String),
    CommandBegin {
        command: Option<String>,
    },
    CommandEnd {
        failed: bool,
    },
    PatchBegin {
        files: Vec<String>,
    },
    PatchEnd {
        failed: bool,
    },
    TaskComplete {
        last_message: Option<String>,
    },
    TurnAborted {
        reason: Option<String>,
    },
    Error(String),
    Other(String),
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Join an argv array into one display string
pub fn join_command(command: &Value) -> Option<String> {
    match command {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => {
            let parts: Vec<&str> = parts.iter().filter_map(Value::as_str).collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        }
        _ => None,
    }
}

/// Parse a `codex/event` notification's params
pub fn parse_event(params: &Value) -> Option<CodexEvent> {
    let msg = params.get("msg")?;
    let kind = msg.get("type").and_then(Value::as_str)?;
    let event = match kind {
        "session_configured" => CodexEvent::SessionConfigured {
            session_id: str_field(msg, "session_id"),
            model: str_field(msg, "model"),
        },
        "task_started" => CodexEvent::TaskStarted,
        "agent_message_delta" => CodexEvent::TextDelta(str_field(msg, "delta")?),
        "agent_message" => CodexEvent::AgentMessage(str_field(msg, "message")?),
        "exec_command_begin" => CodexEvent::CommandBegin {
            command: msg.get("command").and_then(join_command),
        },
        "exec_command_end" => CodexEvent::CommandEnd {
            failed: msg
                .get("exit_code")
                .and_then(Value::as_i64)
                .is_some_and(|code| code != 0),
        },
        "patch_apply_begin" => {
            let mut files: Vec<String> = msg
                .get("changes")
                .and_then(Value::as_object)
                .map(|changes| changes.keys().cloned().collect())
                .unwrap_or_default();
            files.sort();
            CodexEvent::PatchBegin { files }
        }
        "patch_apply_end" => CodexEvent::PatchEnd {
            failed: msg.get("success").and_then(Value::as_bool) == Some(false),
        },
        "task_complete" => CodexEvent::TaskComplete {
            last_message: str_field(msg, "last_agent_message"),
        },
        "turn_aborted" => CodexEvent::TurnAborted {
            reason: str_field(msg, "reason"),
        },
        "error" | "stream_error" => {
            CodexEvent::Error(str_field(msg, "message").unwrap_or_else(|| "Codex error".to_string()))
        }
        other => CodexEvent::Other(other.to_string()),
    };
    Some(event)
}

/// An `elicitation/create` request mapped onto an approval
#[derive(Debug, Clone, PartialEq)]
pub struct Elicitation {
    pub action: String,
    pub input: Value,
}

/// Map elicitation params onto an action name and input for the policy
pub fn parse_elicitation(params: &Value) -> Elicitation {
    let kind = params.get("codex_elicitation").and_then(Value::as_str);
    match kind {
        Some("exec-approval") => {
            let mut input = Map::new();
            if let Some(command) = params.get("codex_command").and_then(join_command) {
                input.insert("command".into(), Value::String(command));
            }
            for (from, to) in [("codex_cwd", "cwd"), ("codex_reason", "reason")] {
                if let Some(v) = params.get(from).filter(|v| !v.is_null()) {
                    input.insert(to.into(), v.clone());
                }
            }
            Elicitation {
                action: SHELL_ACTION.to_string(),
                input: Value::Object(input),
            }
        }
        Some("patch-approval") => {
            let mut input = Map::new();
            for (from, to) in [
                ("codex_changes", "changes"),
                ("codex_reason", "reason"),
                ("codex_grant_root", "grant_root"),
            ] {
                if let Some(v) = params.get(from).filter(|v| !v.is_null()) {
                    input.insert(to.into(), v.clone());
                }
            }
            Elicitation {
                action: PATCH_ACTION.to_string(),
                input: Value::Object(input),
            }
        }
        other => Elicitation {
            action: other.unwrap_or("elicitation").to_string(),
            input: params.clone(),
        },
    }
}

/// Result payload answering an elicitation
pub fn decision_result(decision: &ApprovalDecision) -> Value {
    match decision {
        ApprovalDecision::Allow { .. } => json!({"action": "accept", "decision": "approved"}),
        ApprovalDecision::Deny { .. } => json!({"action": "decline", "decision": "denied"}),
    }
}

/// Result payload for an elicitation cancelled before a decision
pub fn cancelled_result() -> Value {
    json!({"action": "cancel", "decision": "abort"})
}

/// Concatenated text items of a `tools/call` result
pub fn result_text(result: &Value) -> Option<String> {
    let text: Vec<&str> = result
        .get("content")
        .and_then(Value::as_array)?
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .collect();
    (!text.is_empty()).then(|| text.join("\n"))
}
