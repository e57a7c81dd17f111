//! Chat front-end adapter
//!
//! A [`ChatPlatform`] is whatever the user talks through (a terminal, a
//! messenger bot). [`ChatBridge`] turns agent callbacks into ordered chat
//! messages for it and builds agent [`Content`] from what the user sends.

pub mod format;
mod terminal;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::agent::AgentCallbacks;
use crate::types::{
    AgentError, BackendKind, Content, ContentBlock, LoopDetected, OutputEvent, OutputKind,
    PendingApproval, Result,
};

pub use terminal::{TerminalPlatform, media_type_for};

/// Raw file the user attached to a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub media_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }
}

/// Where chat messages go and attachments come from
#[async_trait]
pub trait ChatPlatform: Send + Sync + fmt::Debug {
    /// Greet the user once the agent is configured
    async fn send_welcome(&self, kind: BackendKind, session_id: Option<&str>) -> Result<()>;

    /// Deliver one message to the user
    async fn push_text(&self, text: &str) -> Result<()>;

    /// Download an attachment by its platform reference (file id, path, URL)
    async fn fetch_attachment(&self, reference: &str) -> Result<Attachment>;
}

enum Notice {
    Output(OutputEvent),
    Approval(PendingApproval),
    Loop(LoopDetected),
    Close,
}

/// Forwards agent activity to a [`ChatPlatform`] in callback order
///
/// Streamed text is accumulated and delivered as one message when the next
/// non-text event arrives.
pub struct ChatBridge {
    platform: Arc<dyn ChatPlatform>,
    tx: mpsc::UnboundedSender<Notice>,
    task: JoinHandle<()>,
}

impl fmt::Debug for ChatBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatBridge")
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

impl ChatBridge {
    /// Must be called inside a Tokio runtime
    pub fn new(platform: Arc<dyn ChatPlatform>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(forward(Arc::clone(&platform), rx));
        Self { platform, tx, task }
    }

    pub fn platform(&self) -> &Arc<dyn ChatPlatform> {
        &self.platform
    }

    /// Callbacks to pass to [`crate::agent::Agent::start`]
    pub fn callbacks(&self) -> AgentCallbacks {
        let output = self.tx.clone();
        let approval = self.tx.clone();
        let looped = self.tx.clone();
        AgentCallbacks::new(move |event| drop(output.send(Notice::Output(event))))
            .with_approval(move |request| drop(approval.send(Notice::Approval(request))))
            .with_loop_detected(move |notice| drop(looped.send(Notice::Loop(notice))))
    }

    /// Build message content from typed text and attachment references
    ///
    /// Non-image attachments are rejected.
    pub async fn build_content(&self, text: Option<&str>, attachments: &[String]) -> Result<Content> {
        let text = text.map(str::trim).filter(|t| !t.is_empty());
        if attachments.is_empty() {
            return text
                .map(|t| Content::Text(t.to_string()))
                .ok_or(AgentError::EmptyPrompt);
        }

        let mut blocks = Vec::with_capacity(attachments.len() + 1);
        if let Some(text) = text {
            blocks.push(ContentBlock::text(text));
        }
        for reference in attachments {
            let attachment = self.platform.fetch_attachment(reference).await?;
            if !attachment.is_image() {
                return Err(AgentError::UnsupportedContent(format!(
                    "{reference} is {}, only images can be attached",
                    attachment.media_type
                )));
            }
            tracing::debug!(
                reference = %reference,
                media_type = %attachment.media_type,
                bytes = attachment.data.len(),
                "Attachment fetched"
            );
            blocks.push(ContentBlock::image(
                attachment.media_type,
                STANDARD.encode(&attachment.data),
            ));
        }
        Ok(Content::Blocks(blocks))
    }

    /// Deliver everything queued so far and stop forwarding
    pub async fn close(self) {
        drop(self.tx.send(Notice::Close));
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Chat forwarding task failed");
        }
    }
}

async fn forward(platform: Arc<dyn ChatPlatform>, mut rx: mpsc::UnboundedReceiver<Notice>) {
    let mut buffered = String::new();

    while let Some(notice) = rx.recv().await {
        let line = match notice {
            Notice::Output(event) if event.kind == OutputKind::Text => {
                if let Some(text) = &event.text {
                    buffered.push_str(text);
                }
                continue;
            }
            Notice::Output(event) => format::event_line(&event),
            Notice::Approval(request) => Some(format::approval_prompt(&request)),
            Notice::Loop(notice) => Some(format::loop_notice(&notice)),
            Notice::Close => {
                flush(&*platform, &mut buffered).await;
                break;
            }
        };
        flush(&*platform, &mut buffered).await;
        if let Some(line) = line {
            deliver(&*platform, &line).await;
        }
    }
    tracing::debug!("Chat forwarding stopped");
}

async fn flush(platform: &dyn ChatPlatform, buffered: &mut String) {
    if !buffered.trim().is_empty() {
        deliver(platform, buffered.trim()).await;
    }
    buffered.clear();
}

async fn deliver(platform: &dyn ChatPlatform, text: &str) {
    if let Err(e) = platform.push_text(text).await {
        tracing::warn!(error = %e, "Failed to deliver chat message");
    }
}
