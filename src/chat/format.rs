//! Human-readable titles for actions, approvals and output events

use serde_json::Value;

use crate::permissions::command_text;
use crate::types::{LoopDetected, OutputEvent, OutputKind, PendingApproval};

/// Prefix Claude Code gives tools served by MCP servers
const MCP_PREFIX: &str = "mcp__";

fn str_field<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

/// Title for an action the agent wants to run
pub fn action_title(action: &str, input: &Value) -> String {
    match action {
        "Bash" | "shell" => {
            let command = command_text(input).unwrap_or_default();
            match str_field(input, "description") {
                Some(desc) if !desc.is_empty() => desc.to_string(),
                _ => format!("Run: {}", truncate_string(&command, 50)),
            }
        }
        "Read" | "Edit" | "Write" | "MultiEdit" => {
            let path = str_field(input, "file_path").unwrap_or("file");
            format!("{action} {}", truncate_path(path))
        }
        "NotebookRead" | "NotebookEdit" => {
            let path = str_field(input, "notebook_path").unwrap_or("notebook");
            format!("{action} {}", truncate_path(path))
        }
        "apply_patch" => {
            let mut files: Vec<&str> = input
                .get("changes")
                .and_then(Value::as_object)
                .map(|changes| changes.keys().map(String::as_str).collect())
                .unwrap_or_default();
            files.sort_unstable();
            match files.as_slice() {
                [] => "Apply patch".to_string(),
                [one] => format!("Patch {}", truncate_path(one)),
                [first, rest @ ..] => format!("Patch {} (+{} more)", truncate_path(first), rest.len()),
            }
        }
        "Grep" | "WebSearch" => {
            let key = if action == "Grep" { "pattern" } else { "query" };
            format!("Search: {}", truncate_string(str_field(input, key).unwrap_or(""), 40))
        }
        "Glob" => format!(
            "Find: {}",
            truncate_string(str_field(input, "pattern").unwrap_or(""), 40)
        ),
        "WebFetch" => format!(
            "Fetch {}",
            truncate_string(str_field(input, "url").unwrap_or(""), 50)
        ),
        "Task" => str_field(input, "description").unwrap_or("Task").to_string(),
        "TodoWrite" => "Update task list".to_string(),
        "AskUserQuestion" => "Ask question".to_string(),
        name if name.starts_with(MCP_PREFIX) => {
            let tool = name.split("__").nth(2).unwrap_or(name);
            format!("MCP: {tool}")
        }
        other => other.to_string(),
    }
}

/// Title for an action that already started; only its detail string is known
fn started_title(action: &str, detail: Option<&str>) -> String {
    match (action, detail) {
        ("Bash" | "shell", Some(command)) => format!("Run: {}", truncate_string(command, 50)),
        ("apply_patch", Some(files)) => format!("Patch {}", truncate_string(files, 60)),
        ("Read" | "Edit" | "Write" | "MultiEdit", Some(path)) => {
            format!("{action} {}", truncate_path(path))
        }
        (_, Some(detail)) => format!("{action}: {}", truncate_string(detail, 50)),
        (_, None) => action.to_string(),
    }
}

/// Chat line for an output event. Text events are returned verbatim.
pub fn event_line(event: &OutputEvent) -> Option<String> {
    match event.kind {
        OutputKind::Text => event.text.clone(),
        OutputKind::ActionStarted => Some(format!(
            "▶ {}",
            started_title(event.action.as_deref().unwrap_or("action"), event.text.as_deref())
        )),
        OutputKind::TurnResult if event.is_error == Some(true) => Some(format!(
            "✗ Turn failed{}",
            event.text.as_deref().map(|t| format!(": {t}")).unwrap_or_default()
        )),
        OutputKind::TurnResult => Some("✓ Done".to_string()),
        OutputKind::Error => Some(format!("⚠ {}", event.text.as_deref().unwrap_or("error"))),
        OutputKind::System => event.text.as_ref().map(|t| format!("ℹ {t}")),
    }
}

pub fn approval_prompt(request: &PendingApproval) -> String {
    format!(
        "Approval needed [{id}]: {title}\n  /approve {id}  |  /deny {id}  |  /approve-all",
        id = request.request_id,
        title = action_title(&request.action, &request.input),
    )
}

pub fn loop_notice(notice: &LoopDetected) -> String {
    format!(
        "⚠ {} consecutive failed tool calls, the turn was interrupted",
        notice.consecutive_failures
    )
}

/// Keep long paths to their file name
fn truncate_path(path: &str) -> String {
    if path.chars().count() > 60 {
        std::path::Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .map(String::from)
            .unwrap_or_else(|| truncate_string(path, 60))
    } else {
        path.to_string()
    }
}

/// Truncate to at most `max_chars` characters, marking the cut with `...`
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
