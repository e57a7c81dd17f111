//! Terminal chat platform: stdout for messages, local files for attachments

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{Attachment, ChatPlatform};
use crate::logging::ResultTraceExt;
use crate::types::{BackendKind, Result};

/// Media type from a file extension
pub fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("txt" | "md") => "text/plain",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone)]
pub struct TerminalPlatform {
    /// Relative attachment paths resolve against this directory
    base_dir: PathBuf,
}

impl TerminalPlatform {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn resolve(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

#[async_trait]
impl ChatPlatform for TerminalPlatform {
    async fn send_welcome(&self, kind: BackendKind, session_id: Option<&str>) -> Result<()> {
        let resumed = session_id.map(|id| format!(" (session {id})")).unwrap_or_default();
        self.push_text(&format!(
            "Connected to {kind}{resumed} in {}. Type /help for commands.",
            self.base_dir.display()
        ))
        .await
    }

    async fn push_text(&self, text: &str) -> Result<()> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(text.as_bytes()).await.trace_context()?;
        stdout.write_all(b"\n").await.trace_context()?;
        stdout.flush().await.trace_context()?;
        Ok(())
    }

    async fn fetch_attachment(&self, reference: &str) -> Result<Attachment> {
        let path = self.resolve(reference);
        let data = tokio::fs::read(&path).await.trace_context()?;
        Ok(Attachment {
            media_type: media_type_for(&path).to_string(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentError;
    use tempfile::TempDir;

    #[test]
    fn test_media_type_for() {
        assert_eq!(media_type_for(Path::new("a/shot.PNG")), "image/png");
        assert_eq!(media_type_for(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(media_type_for(Path::new("archive")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_fetch_attachment_relative_to_base() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("shot.png"), [9u8, 8, 7]).unwrap();
        let platform = TerminalPlatform::new(dir.path());

        let attachment = platform.fetch_attachment("shot.png").await.unwrap();
        assert_eq!(attachment.media_type, "image/png");
        assert_eq!(attachment.data, vec![9, 8, 7]);

        assert!(matches!(
            platform.fetch_attachment("missing.png").await,
            Err(AgentError::Io(_))
        ));
    }
}
