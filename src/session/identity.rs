//! Backend-issued identifiers needed to resume a conversation
//!
//! Codex reports identifiers in several places (event payloads, response
//! metadata, top-level response fields, nested content items). Extraction
//! checks all of them with a fixed preference order, and the tracker keeps
//! the first non-empty value it sees.

use serde_json::Value;

const SESSION_KEYS: &[&str] = &["sessionId", "session_id"];
const CONVERSATION_KEYS: &[&str] = &["conversationId", "conversation_id", "threadId", "thread_id"];
const META_KEYS: &[&str] = &["_meta", "meta", "metadata"];

/// Identifiers found in one message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedIds {
    pub session_id: Option<String>,
    pub conversation_id: Option<String>,
}

impl ExtractedIds {
    pub fn is_empty(&self) -> bool {
        self.session_id.is_none() && self.conversation_id.is_none()
    }

    /// Fill fields still missing from a lower-priority source
    fn or(mut self, other: ExtractedIds) -> Self {
        if self.session_id.is_none() {
            self.session_id = other.session_id;
        }
        if self.conversation_id.is_none() {
            self.conversation_id = other.conversation_id;
        }
        self
    }
}

fn string_field(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .filter_map(Value::as_str)
        .find(|s| !s.trim().is_empty())
        .map(String::from)
}

fn ids_in(obj: &Value) -> ExtractedIds {
    ExtractedIds {
        session_id: string_field(obj, SESSION_KEYS),
        conversation_id: string_field(obj, CONVERSATION_KEYS),
    }
}

fn ids_in_meta(obj: &Value) -> ExtractedIds {
    META_KEYS
        .iter()
        .filter_map(|k| obj.get(*k))
        .map(ids_in)
        .fold(ExtractedIds::default(), ExtractedIds::or)
}

/// Identifiers in a call response: metadata, then top-level fields, then
/// nested content items (including `structuredContent`).
pub fn extract_from_response(result: &Value) -> ExtractedIds {
    let mut ids = ids_in_meta(result).or(ids_in(result));
    if let Some(structured) = result.get("structuredContent") {
        ids = ids.or(ids_in(structured));
    }
    if let Some(items) = result.get("content").and_then(Value::as_array) {
        for item in items {
            ids = ids.or(ids_in_meta(item)).or(ids_in(item));
        }
    }
    ids
}

/// Identifiers in a `codex/event` notification's params
pub fn extract_from_event(params: &Value) -> ExtractedIds {
    let mut ids = ids_in_meta(params).or(ids_in(params));
    if let Some(msg) = params.get("msg") {
        ids = ids.or(ids_in(msg));
    }
    ids
}

/// Per-session identity tracker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionIdentity {
    session_id: Option<String>,
    conversation_id: Option<String>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a resume request. The session id is learned from the
    /// server once the resumed conversation reports it.
    pub fn resuming(id: impl Into<String>) -> Self {
        Self {
            session_id: None,
            conversation_id: Some(id.into()),
        }
    }

    /// Keep the first non-empty value of each identifier.
    /// Returns true if anything changed.
    pub fn observe(&mut self, ids: ExtractedIds) -> bool {
        let mut changed = false;
        if self.session_id.is_none() && ids.session_id.is_some() {
            self.session_id = ids.session_id;
            changed = true;
        }
        if self.conversation_id.is_none() && ids.conversation_id.is_some() {
            self.conversation_id = ids.conversation_id;
            changed = true;
        }
        changed
    }

    /// Replace the session identifier. Claude Code issues a new one when a
    /// conversation is resumed, and the latest is the one to resume from.
    pub fn set_session_id(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if id.trim().is_empty() || self.session_id.as_deref() == Some(id.as_str()) {
            return false;
        }
        self.session_id = Some(id);
        true
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Identifier to continue the conversation with
    pub fn resume_target(&self) -> Option<&str> {
        self.conversation_id().or(self.session_id())
    }

    pub fn clear(&mut self) {
        self.session_id = None;
        self.conversation_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_metadata_beats_nested_content() {
        let response = json!({
            "_meta": {"sessionId": "from-meta"},
            "content": [{"type": "text", "text": "ok", "sessionId": "from-content"}]
        });
        let ids = extract_from_response(&response);
        assert_eq!(ids.session_id.as_deref(), Some("from-meta"));
    }

    #[test]
    fn test_top_level_beats_nested_content() {
        let response = json!({
            "conversationId": "conv-top",
            "content": [{"type": "text", "conversationId": "conv-nested", "sessionId": "s-nested"}]
        });
        let ids = extract_from_response(&response);
        assert_eq!(ids.conversation_id.as_deref(), Some("conv-top"));
        assert_eq!(ids.session_id.as_deref(), Some("s-nested"));
    }

    #[test]
    fn test_structured_content_and_empty_values() {
        let response = json!({
            "sessionId": "",
            "structuredContent": {"threadId": "thread-1", "sessionId": "s-1"}
        });
        let ids = extract_from_response(&response);
        assert_eq!(
            ids,
            ExtractedIds {
                session_id: Some("s-1".into()),
                conversation_id: Some("thread-1".into()),
            }
        );
        assert!(extract_from_response(&json!({"content": []})).is_empty());
    }

    #[test]
    fn test_event_ids() {
        let params = json!({
            "_meta": {"requestId": 3},
            "id": "0",
            "msg": {"type": "session_configured", "session_id": "s-evt"}
        });
        assert_eq!(extract_from_event(&params).session_id.as_deref(), Some("s-evt"));
    }

    #[test]
    fn test_first_value_is_retained() {
        let mut identity = SessionIdentity::new();
        assert!(identity.observe(ExtractedIds {
            session_id: Some("first".into()),
            conversation_id: None,
        }));
        assert!(!identity.observe(ExtractedIds {
            session_id: Some("second".into()),
            conversation_id: None,
        }));
        assert_eq!(identity.session_id(), Some("first"));
        assert_eq!(identity.resume_target(), Some("first"));

        identity.observe(ExtractedIds {
            session_id: None,
            conversation_id: Some("conv".into()),
        });
        assert_eq!(identity.resume_target(), Some("conv"));
    }

    #[test]
    fn test_resuming_learns_session_id() {
        let mut identity = SessionIdentity::resuming("conv-old");
        assert_eq!(identity.session_id(), None);
        assert_eq!(identity.conversation_id(), Some("conv-old"));
        assert_eq!(identity.resume_target(), Some("conv-old"));

        assert!(identity.observe(ExtractedIds {
            session_id: Some("s-new".into()),
            conversation_id: Some("conv-other".into()),
        }));
        assert_eq!(identity.session_id(), Some("s-new"));
        assert_eq!(identity.conversation_id(), Some("conv-old"));
    }

    #[test]
    fn test_set_session_id_replaces() {
        let mut identity = SessionIdentity::resuming("old");
        assert!(identity.set_session_id("new"));
        assert!(!identity.set_session_id("new"));
        assert!(!identity.set_session_id(""));
        assert_eq!(identity.session_id(), Some("new"));
    }
}
