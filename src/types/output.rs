//! Normalized output events
//!
//! Both backends translate their native messages into [`OutputEvent`], the
//! only shape callers have to understand.

use serde::{Deserialize, Serialize};

/// Kind of a normalized output event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Assistant text (complete block or streamed delta)
    Text,
    /// The agent started running an action (tool call, command, patch)
    ActionStarted,
    /// The turn finished
    TurnResult,
    /// Transport or agent error
    Error,
    /// Session-level information (session started, turn aborted, ...)
    System,
}

/// Backend-agnostic output event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEvent {
    pub kind: OutputKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl OutputEvent {
    fn new(kind: OutputKind) -> Self {
        Self {
            kind,
            text: None,
            action: None,
            is_error: None,
            session_id: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(OutputKind::Text)
        }
    }

    pub fn action_started(action: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            action: Some(action.into()),
            text: detail,
            ..Self::new(OutputKind::ActionStarted)
        }
    }

    pub fn turn_result(text: Option<String>, is_error: bool, session_id: Option<String>) -> Self {
        Self {
            text,
            is_error: Some(is_error),
            session_id,
            ..Self::new(OutputKind::TurnResult)
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            is_error: Some(true),
            ..Self::new(OutputKind::Error)
        }
    }

    pub fn system(text: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            text: Some(text.into()),
            session_id,
            ..Self::new(OutputKind::System)
        }
    }

    /// Whether this event reports an error (error kind or failed turn)
    pub fn is_failure(&self) -> bool {
        self.kind == OutputKind::Error || self.is_error == Some(true)
    }
}
