//! Serialized newline-delimited writes to an agent's stdin
//!
//! Both backends share a single stdin between the consumer task (approval
//! responses), the caller (prompts) and teardown (interrupts). Each frame is
//! written and flushed under one lock so frames never interleave.

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::types::{AgentError, Result};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct FrameWriter {
    inner: Mutex<Option<BoxedWriter>>,
}

impl FrameWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Mutex::new(Some(Box::new(writer))),
        }
    }

    /// Write one line followed by `\n`.
    ///
    /// A write failure closes the writer: the other end is gone and later
    /// frames would fail the same way.
    pub async fn send_line(&self, line: &str) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(AgentError::ConnectionClosed);
        };

        let mut frame = Vec::with_capacity(line.len() + 1);
        frame.extend_from_slice(line.as_bytes());
        frame.push(b'\n');

        let result = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            tracing::debug!(error = %e, "stdin write failed, closing writer");
            *guard = None;
            return Err(AgentError::ConnectionClosed);
        }
        tracing::trace!(frame = %line, "-> agent");
        Ok(())
    }

    pub async fn send_json<T: Serialize + ?Sized>(&self, frame: &T) -> Result<()> {
        let line = serde_json::to_string(frame)?;
        self.send_line(&line).await
    }

    /// Close stdin. Later sends fail with `ConnectionClosed`.
    pub async fn close(&self) {
        if let Some(mut writer) = self.inner.lock().await.take() {
            drop(writer.shutdown().await);
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}

impl std::fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter").finish_non_exhaustive()
    }
}
