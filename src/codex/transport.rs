//! Minimal JSON-RPC 2.0 client over newline-delimited stdio
//!
//! The reader forwards everything, responses included, in arrival order to a
//! single consumer. The consumer hands responses back through
//! [`RpcTransport::complete`], so a call never resolves ahead of the
//! notifications the server sent before answering it.

use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::process::FrameWriter;
use crate::types::{AgentError, ErrorCode, Result};

pub const JSONRPC_VERSION: &str = "2.0";

/// Error object of a JSON-RPC response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// One inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Response {
        id: Value,
        outcome: std::result::Result<Value, RpcError>,
    },
    Notification {
        method: String,
        params: Value,
    },
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    /// The server's stdout closed
    Closed,
}

type CallReply = Result<Value>;

/// Receiving side of an outstanding call
#[derive(Debug)]
pub struct PendingCall {
    pub id: i64,
    reply: oneshot::Receiver<CallReply>,
}

impl PendingCall {
    pub async fn response(self) -> Result<Value> {
        self.reply.await.unwrap_or(Err(AgentError::ConnectionClosed))
    }
}

pub struct RpcTransport {
    writer: FrameWriter,
    pending: DashMap<i64, oneshot::Sender<CallReply>>,
    next_id: AtomicI64,
}

impl std::fmt::Debug for RpcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcTransport")
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl RpcTransport {
    pub fn new(writer: FrameWriter) -> Self {
        Self {
            writer,
            pending: DashMap::new(),
            next_id: AtomicI64::new(0),
        }
    }

    /// Send a request and return a handle for its response
    pub async fn start_call(&self, method: &str, params: Value) -> Result<PendingCall> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let frame = json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "method": method,
            "params": params,
        });
        if let Err(e) = self.writer.send_json(&frame).await {
            self.pending.remove(&id);
            return Err(e);
        }
        tracing::debug!(id, method, "-> request");
        Ok(PendingCall { id, reply: rx })
    }

    /// Send a request and wait for its response
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.start_call(method, params).await?.response().await
    }

    /// Stop waiting for a call; a late response is dropped
    pub fn forget(&self, id: i64) {
        self.pending.remove(&id);
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let mut frame = json!({"jsonrpc": JSONRPC_VERSION, "method": method});
        if let Some(params) = params {
            frame["params"] = params;
        }
        tracing::debug!(method, "-> notification");
        self.writer.send_json(&frame).await
    }

    pub async fn respond(&self, id: Value, result: Value) -> Result<()> {
        self.writer
            .send_json(&json!({"jsonrpc": JSONRPC_VERSION, "id": id, "result": result}))
            .await
    }

    pub async fn respond_error(&self, id: Value, code: ErrorCode, message: &str) -> Result<()> {
        self.writer
            .send_json(&json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "error": {"code": code.code(), "message": message},
            }))
            .await
    }

    /// Resolve the call a response belongs to
    pub fn complete(&self, id: &Value, outcome: std::result::Result<Value, RpcError>) {
        let Some(id) = id.as_i64() else {
            tracing::debug!(?id, "Response with non-numeric id");
            return;
        };
        let reply = outcome.map_err(|e| AgentError::Rpc {
            code: e.code,
            message: e.message,
        });
        match self.pending.remove(&id) {
            Some((_, tx)) => drop(tx.send(reply)),
            None => tracing::debug!(id, "Response for unknown or abandoned call"),
        }
    }

    /// Fail every outstanding call with `ConnectionClosed`
    pub fn fail_all(&self) {
        let ids: Vec<i64> = self.pending.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                drop(tx.send(Err(AgentError::ConnectionClosed)));
            }
        }
    }

    pub async fn close(&self) {
        self.writer.close().await;
    }
}

/// Classify one inbound line
pub fn parse_message(line: &str) -> Option<Incoming> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let message: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, line, "Ignoring malformed JSON-RPC line");
            return None;
        }
    };

    let method = message.get("method").and_then(Value::as_str);
    let id = message.get("id").filter(|id| !id.is_null());
    let params = message.get("params").cloned().unwrap_or(Value::Null);

    match (method, id) {
        (Some(method), Some(id)) => Some(Incoming::Request {
            id: id.clone(),
            method: method.to_string(),
            params,
        }),
        (Some(method), None) => Some(Incoming::Notification {
            method: method.to_string(),
            params,
        }),
        (None, Some(id)) => {
            let outcome = match message.get("error") {
                Some(error) => Err(RpcError {
                    code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                    message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                }),
                None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
            };
            Some(Incoming::Response {
                id: id.clone(),
                outcome,
            })
        }
        (None, None) => {
            tracing::debug!(line, "Ignoring JSON-RPC message without id or method");
            None
        }
    }
}

/// Read the server's stdout until it closes or `shutdown` fires.
/// Always ends with [`Incoming::Closed`].
pub async fn read_loop<R>(reader: R, tx: mpsc::UnboundedSender<Incoming>, shutdown: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                if let Some(incoming) = parse_message(&line) {
                    if tx.send(incoming).is_err() {
                        return;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "stdout read failed");
                break;
            }
        }
    }
    drop(tx.send(Incoming::Closed));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncWriteExt, DuplexStream, Lines};

    fn transport() -> (RpcTransport, Lines<BufReader<DuplexStream>>) {
        let (ours, theirs) = tokio::io::duplex(16 * 1024);
        (
            RpcTransport::new(FrameWriter::new(ours)),
            BufReader::new(theirs).lines(),
        )
    }

    #[tokio::test]
    async fn test_call_is_resolved_by_id() {
        let (transport, mut server_in) = transport();
        let first = transport.start_call("a", json!({})).await.unwrap();
        let second = transport.start_call("b", json!({"x": 1})).await.unwrap();

        let frame: Value = serde_json::from_str(&server_in.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(frame["jsonrpc"], "2.0");
        assert_eq!(frame["method"], "a");

        transport.complete(&json!(second.id), Ok(json!({"ok": 2})));
        transport.complete(
            &json!(first.id),
            Err(RpcError {
                code: -32602,
                message: "bad".into(),
            }),
        );
        // Unknown ids are ignored
        transport.complete(&json!(99), Ok(Value::Null));

        assert_eq!(second.response().await.unwrap(), json!({"ok": 2}));
        assert!(matches!(
            first.response().await,
            Err(AgentError::Rpc { code: -32602, .. })
        ));
    }

    #[test]
    fn test_parse_messages() {
        assert_eq!(
            parse_message(r#"{"jsonrpc":"2.0","method":"codex/event","params":{"msg":{"type":"task_started"}}}"#),
            Some(Incoming::Notification {
                method: "codex/event".into(),
                params: json!({"msg": {"type": "task_started"}}),
            })
        );
        assert_eq!(
            parse_message(r#"{"jsonrpc":"2.0","id":0,"method":"elicitation/create","params":{}}"#),
            Some(Incoming::Request {
                id: json!(0),
                method: "elicitation/create".into(),
                params: json!({}),
            })
        );
        assert_eq!(
            parse_message(r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32601,"message":"nope"}}"#),
            Some(Incoming::Response {
                id: json!(3),
                outcome: Err(RpcError {
                    code: -32601,
                    message: "nope".into()
                }),
            })
        );
        assert_eq!(parse_message("warning: something"), None);
        assert_eq!(parse_message(r#"{"jsonrpc":"2.0"}"#), None);
    }

    #[tokio::test]
    async fn test_read_loop_preserves_order_and_reports_close() {
        let (mut server_out, client_in) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_loop(client_in, tx, CancellationToken::new()));

        server_out
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"note\"}\n{\"jsonrpc\":\"2.0\",\"id\":0,\"result\":{}}\n")
            .await
            .unwrap();
        server_out.shutdown().await.unwrap();

        assert!(matches!(rx.recv().await, Some(Incoming::Notification { .. })));
        assert!(matches!(rx.recv().await, Some(Incoming::Response { .. })));
        assert_eq!(rx.recv().await, Some(Incoming::Closed));
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_all() {
        let (transport, _server_in) = transport();
        let call = transport.start_call("slow", json!({})).await.unwrap();
        transport.fail_all();
        assert!(matches!(call.response().await, Err(AgentError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_respond_error_shape() {
        let (transport, mut server_in) = transport();
        transport
            .respond_error(json!(7), ErrorCode::MethodNotFound, "Method not found")
            .await
            .unwrap();
        let frame: Value = serde_json::from_str(&server_in.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(frame["id"], 7);
        assert_eq!(frame["error"]["code"], -32601);
    }
}
