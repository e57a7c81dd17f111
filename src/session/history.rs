//! Prior conversations on disk, for the resume menu
//!
//! Claude Code keeps one JSONL transcript per session under
//! `~/.claude/projects/<encoded cwd>/`. Codex keeps rollout files under
//! `~/.codex/sessions/YYYY/MM/DD/`, each starting with a `session_meta`
//! record that names the working directory.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;
use walkdir::WalkDir;

use crate::types::BackendKind;

/// Longest preview, in characters
pub const PREVIEW_MAX_CHARS: usize = 80;

/// Lines read from a transcript while looking for the first user message
const SCAN_LINES: usize = 200;

/// One resumable conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Identifier to pass as the resume id
    pub id: String,
    pub modified: DateTime<Utc>,
    /// First user message, on one line
    pub preview: Option<String>,
}

/// Prior conversations for `cwd`, newest first, under the user's home
pub fn list_history(kind: BackendKind, cwd: &Path, limit: usize) -> Vec<HistoryEntry> {
    match dirs::home_dir() {
        Some(home) => list_history_in(&home, kind, cwd, limit),
        None => {
            tracing::debug!("No home directory, history unavailable");
            Vec::new()
        }
    }
}

/// Same as [`list_history`] with an explicit home directory
pub fn list_history_in(home: &Path, kind: BackendKind, cwd: &Path, limit: usize) -> Vec<HistoryEntry> {
    let mut entries = match kind {
        BackendKind::Claude => claude_entries(&claude_project_dir(home, cwd)),
        BackendKind::Codex => codex_entries(&home.join(".codex").join("sessions"), cwd),
    };
    entries.sort_by(|a, b| b.modified.cmp(&a.modified));
    entries.truncate(limit);
    entries
}

/// `/home/me/my.app` -> `~/.claude/projects/-home-me-my-app`
pub fn claude_project_dir(home: &Path, cwd: &Path) -> PathBuf {
    let encoded: String = cwd
        .to_string_lossy()
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == '.' { '-' } else { c })
        .collect();
    home.join(".claude").join("projects").join(encoded)
}

fn modified(path: &Path) -> Option<DateTime<Utc>> {
    let time = path.metadata().ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(time))
}

fn is_jsonl(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "jsonl")
}

/// JSON records at the start of a transcript; unreadable lines are skipped
fn records(path: &Path) -> Option<impl Iterator<Item = Value>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable transcript");
            return None;
        }
    };
    Some(
        BufReader::new(file)
            .lines()
            .take(SCAN_LINES)
            .map_while(std::result::Result::ok)
            .filter_map(|line| serde_json::from_str::<Value>(&line).ok()),
    )
}

fn claude_entries(dir: &Path) -> Vec<HistoryEntry> {
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    read_dir
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_jsonl(path))
        .filter_map(|path| {
            let id = path.file_stem()?.to_string_lossy().into_owned();
            let modified = modified(&path)?;
            let preview = records(&path)?.find_map(|record| claude_user_text(&record));
            Some(HistoryEntry {
                id,
                modified,
                preview: preview.map(|text| preview_line(&text)),
            })
        })
        .collect()
}

/// Text of a real user message (not a tool result, command echo or meta record)
fn claude_user_text(record: &Value) -> Option<String> {
    if record.get("type").and_then(Value::as_str) != Some("user")
        || record.get("isMeta").and_then(Value::as_bool) == Some(true)
    {
        return None;
    }
    let content = record.pointer("/message/content")?;
    let text = match content {
        Value::String(text) => text.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(" "),
        _ => return None,
    };
    is_user_prose(&text).then_some(text)
}

fn codex_entries(root: &Path, cwd: &Path) -> Vec<HistoryEntry> {
    if !root.is_dir() {
        return Vec::new();
    }
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| {
            is_jsonl(path)
                && path
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with("rollout-"))
        })
        .filter_map(|path| codex_entry(&path, cwd))
        .collect()
}

fn codex_entry(path: &Path, cwd: &Path) -> Option<HistoryEntry> {
    let mut records = records(path)?;
    let first = records.next()?;
    let meta = if first.get("type").and_then(Value::as_str) == Some("session_meta") {
        first.get("payload")?.clone()
    } else {
        first
    };
    let recorded_cwd = meta.get("cwd").and_then(Value::as_str)?;
    if Path::new(recorded_cwd) != cwd {
        return None;
    }
    let id = meta
        .get("id")
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| Some(path.file_stem()?.to_string_lossy().into_owned()))?;
    let preview = records.find_map(|record| codex_user_text(&record));
    Some(HistoryEntry {
        id,
        modified: modified(path)?,
        preview: preview.map(|text| preview_line(&text)),
    })
}

fn codex_user_text(record: &Value) -> Option<String> {
    let payload = record.get("payload").unwrap_or(record);
    match payload.get("type").and_then(Value::as_str)? {
        "message" if payload.get("role").and_then(Value::as_str) == Some("user") => {
            let text = payload
                .get("content")?
                .as_array()?
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(" ");
            is_user_prose(&text).then_some(text)
        }
        "user_message" => {
            let text = payload.get("message").and_then(Value::as_str)?.to_string();
            is_user_prose(&text).then_some(text)
        }
        _ => None,
    }
}

/// Injected context blocks (`<environment_context>`, `<command-name>`) are
/// not something the user typed
fn is_user_prose(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && !text.starts_with('<')
}

/// Collapse whitespace and cap at [`PREVIEW_MAX_CHARS`]
pub fn preview_line(text: &str) -> String {
    let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.chars().count() <= PREVIEW_MAX_CHARS {
        return line;
    }
    let mut cut: String = line.chars().take(PREVIEW_MAX_CHARS - 1).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_jsonl(path: &Path, records: &[Value]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = File::create(path).unwrap();
        for record in records {
            writeln!(file, "{record}").unwrap();
        }
    }

    fn set_mtime(path: &Path, secs_ago: u64) {
        let time = std::time::SystemTime::now() - std::time::Duration::from_secs(secs_ago);
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn test_claude_project_dir_encoding() {
        assert_eq!(
            claude_project_dir(Path::new("/h"), Path::new("/home/me/my.app")),
            PathBuf::from("/h/.claude/projects/-home-me-my-app")
        );
    }

    #[test]
    fn test_claude_history_newest_first() {
        let home = TempDir::new().unwrap();
        let cwd = Path::new("/work/repo");
        let dir = claude_project_dir(home.path(), cwd);

        let old = dir.join("aaa.jsonl");
        write_jsonl(
            &old,
            &[
                json!({"type": "summary", "summary": "x"}),
                json!({"type": "user", "isMeta": true, "message": {"content": "<local-command-caveat>"}}),
                json!({"type": "user", "message": {"role": "user", "content": "fix   the\nbuild"}}),
            ],
        );
        set_mtime(&old, 600);

        let new = dir.join("bbb.jsonl");
        write_jsonl(
            &new,
            &[json!({"type": "user", "message": {"content": [
                {"type": "tool_result", "content": "ok"},
                {"type": "text", "text": "add tests"}
            ]}})],
        );
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let entries = list_history_in(home.path(), BackendKind::Claude, cwd, 10);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "bbb");
        assert_eq!(entries[0].preview.as_deref(), Some("add tests"));
        assert_eq!(entries[1].id, "aaa");
        assert_eq!(entries[1].preview.as_deref(), Some("fix the build"));

        assert_eq!(list_history_in(home.path(), BackendKind::Claude, cwd, 1).len(), 1);
    }

    #[test]
    fn test_codex_history_filters_by_cwd() {
        let home = TempDir::new().unwrap();
        let day = home.path().join(".codex/sessions/2025/09/30");

        write_jsonl(
            &day.join("rollout-2025-09-30T10-00-00-abc.jsonl"),
            &[
                json!({"type": "session_meta", "payload": {"id": "conv-1", "cwd": "/work/repo"}}),
                json!({"type": "response_item", "payload": {"type": "message", "role": "user",
                    "content": [{"type": "input_text", "text": "<environment_context>..."}]}}),
                json!({"type": "response_item", "payload": {"type": "message", "role": "user",
                    "content": [{"type": "input_text", "text": "rename the crate"}]}}),
            ],
        );
        write_jsonl(
            &day.join("rollout-2025-09-30T11-00-00-def.jsonl"),
            &[json!({"type": "session_meta", "payload": {"id": "conv-2", "cwd": "/elsewhere"}})],
        );

        let entries = list_history_in(home.path(), BackendKind::Codex, Path::new("/work/repo"), 10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "conv-1");
        assert_eq!(entries[0].preview.as_deref(), Some("rename the crate"));
    }

    #[test]
    fn test_missing_directories_are_empty() {
        let home = TempDir::new().unwrap();
        assert!(list_history_in(home.path(), BackendKind::Claude, Path::new("/x"), 5).is_empty());
        assert!(list_history_in(home.path(), BackendKind::Codex, Path::new("/x"), 5).is_empty());
    }

    #[test]
    fn test_preview_line_caps_length() {
        let long = "word ".repeat(40);
        let preview = preview_line(&long);
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS);
        assert!(preview.ends_with('…'));
        assert_eq!(preview_line("  short\ttext "), "short text");
    }
}
