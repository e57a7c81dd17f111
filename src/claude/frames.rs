//! Claude Code stream-json frames
//!
//! Classification of lines read from the CLI and builders for the frames
//! written back to it.

use serde_json::{Value, json};

use crate::permissions::command_text;
use crate::types::{Content, ContentBlock, OutputEvent};

/// Session id sent before the CLI has reported one
pub const DEFAULT_SESSION_ID: &str = "default";

/// One line read from the CLI, classified
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Answer to a control request this side issued
    ControlResponse {
        request_id: String,
        outcome: Result<Value, String>,
    },
    /// Permission check for a tool call
    CanUseTool {
        request_id: String,
        tool_name: String,
        input: Value,
    },
    /// Control request with a subtype this side does not handle
    ControlRequest { request_id: String, subtype: String },
    /// The CLI withdrew one of its control requests
    ControlCancel { request_id: String },
    /// Ordinary content (system, assistant, user, result, ...)
    Message(Value),
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Classify one line. Returns `None` for anything that is not a JSON
/// object; the stream carries occasional non-JSON noise.
pub fn parse_line(line: &str) -> Option<Frame> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(line).ok()?;
    if !value.is_object() {
        return None;
    }

    match str_field(&value, "type") {
        Some("control_response") => {
            let response = value.get("response")?;
            let request_id = str_field(response, "request_id")?.to_string();
            let outcome = if str_field(response, "subtype") == Some("error") {
                Err(str_field(response, "error")
                    .unwrap_or("control request failed")
                    .to_string())
            } else {
                Ok(response.get("response").cloned().unwrap_or(Value::Null))
            };
            Some(Frame::ControlResponse {
                request_id,
                outcome,
            })
        }
        Some("control_request") => {
            let request_id = str_field(&value, "request_id")?.to_string();
            let request = value.get("request")?;
            match str_field(request, "subtype") {
                Some("can_use_tool") => Some(Frame::CanUseTool {
                    request_id,
                    tool_name: str_field(request, "tool_name").unwrap_or_default().to_string(),
                    input: request.get("input").cloned().unwrap_or(Value::Null),
                }),
                subtype => Some(Frame::ControlRequest {
                    request_id,
                    subtype: subtype.unwrap_or_default().to_string(),
                }),
            }
        }
        Some("control_cancel_request") => Some(Frame::ControlCancel {
            request_id: str_field(&value, "request_id")?.to_string(),
        }),
        _ => Some(Frame::Message(value)),
    }
}

fn block_json(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => json!({"type": "text", "text": text}),
        ContentBlock::Image { media_type, data } => json!({
            "type": "image",
            "source": {"type": "base64", "media_type": media_type, "data": data},
        }),
    }
}

/// User message envelope
pub fn user_message(content: &Content, session_id: &str) -> Value {
    let content = match content {
        Content::Text(text) => Value::String(text.clone()),
        Content::Blocks(blocks) => Value::Array(blocks.iter().map(block_json).collect()),
    };
    json!({
        "type": "user",
        "message": {"role": "user", "content": content},
        "parent_tool_use_id": null,
        "session_id": session_id,
    })
}

fn success_response(request_id: &str, response: Value) -> Value {
    json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": request_id,
            "response": response,
        }
    })
}

pub fn allow_response(request_id: &str, updated_input: Value) -> Value {
    success_response(
        request_id,
        json!({"behavior": "allow", "updatedInput": updated_input}),
    )
}

pub fn deny_response(request_id: &str, message: &str) -> Value {
    success_response(request_id, json!({"behavior": "deny", "message": message}))
}

pub fn error_response(request_id: &str, error: &str) -> Value {
    json!({
        "type": "control_response",
        "response": {
            "subtype": "error",
            "request_id": request_id,
            "error": error,
        }
    })
}

pub fn control_request(request_id: &str, request: Value) -> Value {
    json!({
        "type": "control_request",
        "request_id": request_id,
        "request": request,
    })
}

pub fn interrupt_request() -> Value {
    json!({"subtype": "interrupt"})
}

/// Short description of a tool call's target
pub fn action_detail(input: &Value) -> Option<String> {
    command_text(input).or_else(|| {
        ["file_path", "notebook_path", "path", "pattern", "url", "query", "description"]
            .iter()
            .find_map(|key| str_field(input, key))
            .map(String::from)
    })
}

fn content_blocks(message: &Value) -> &[Value] {
    message
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Text and tool-use events from an assistant message
pub fn assistant_events(message: &Value) -> Vec<OutputEvent> {
    content_blocks(message)
        .iter()
        .filter_map(|block| match str_field(block, "type") {
            Some("text") => str_field(block, "text")
                .filter(|t| !t.is_empty())
                .map(OutputEvent::text),
            Some("tool_use") => {
                let name = str_field(block, "name").unwrap_or("tool");
                let input = block.get("input").cloned().unwrap_or(Value::Null);
                Some(OutputEvent::action_started(name, action_detail(&input)))
            }
            _ => None,
        })
        .collect()
}

/// Whether every tool result in a user message is an error.
/// `None` when the message carries no tool results.
pub fn tool_results_all_errors(message: &Value) -> Option<bool> {
    let results: Vec<&Value> = content_blocks(message)
        .iter()
        .filter(|b| str_field(b, "type") == Some("tool_result"))
        .collect();
    if results.is_empty() {
        return None;
    }
    Some(
        results
            .iter()
            .all(|r| r.get("is_error").and_then(Value::as_bool) == Some(true)),
    )
}

/// Turn-result event from a `result` message
pub fn result_event(message: &Value) -> OutputEvent {
    let is_error = message
        .get("is_error")
        .and_then(Value::as_bool)
        .unwrap_or_else(|| str_field(message, "subtype").is_some_and(|s| s != "success"));
    let text = str_field(message, "result").map(String::from).or_else(|| {
        is_error.then(|| {
            str_field(message, "subtype")
                .unwrap_or("error")
                .replace('_', " ")
        })
    });
    OutputEvent::turn_result(text, is_error, session_id(message))
}

pub fn session_id(message: &Value) -> Option<String> {
    str_field(message, "session_id")
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Summary line for a `system` init message
pub fn init_summary(message: &Value) -> Option<String> {
    if str_field(message, "subtype") != Some("init") {
        return None;
    }
    Some(match str_field(message, "model") {
        Some(model) => format!("Session started ({model})"),
        None => "Session started".to_string(),
    })
}
