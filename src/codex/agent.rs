//! Codex session over the MCP server's JSON-RPC interface
//!
//! One turn is one `tools/call` (`codex` first, `codex-reply` after). While
//! the call is outstanding the server streams `codex/event` notifications and
//! may ask for approvals through `elicitation/create`; the reader task queues
//! both, in order, for the consumer task.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::events::{
    self, CANCELLED_METHOD, CodexEvent, ELICITATION_METHOD, EVENT_METHOD, Elicitation,
    PATCH_ACTION, SHELL_ACTION,
};
use super::transport::{Incoming, RpcTransport, read_loop};
use super::version;
use crate::agent::{Agent, AgentCallbacks, StartOptions};
use crate::logging::ErrorTraceExt;
use crate::permissions::ApprovalPolicy;
use crate::process::{self, FrameWriter, SpawnSpec, WrappedChild};
use crate::session::{
    ExtractedIds, GateVerdict, SessionIdentity, SessionState, extract_from_event,
    extract_from_response,
};
use crate::types::{
    AgentError, ApprovalOutcome, BackendKind, Content, ErrorCode, LoopDetected, OutputEvent,
    PendingApproval, Result, SupervisorConfig,
};

pub const PROTOCOL_VERSION: &str = "2025-06-18";

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
const WAITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const START_TOOL: &str = "codex";
const REPLY_TOOL: &str = "codex-reply";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    Connected,
    Terminated,
}

/// The `tools/call` currently running
#[derive(Debug)]
struct ActiveTurn {
    call_id: i64,
    abort: CancellationToken,
}

struct Inner {
    program: String,
    subcommand: Option<String>,
    model: Option<String>,
    extra_args: Vec<String>,
    env: HashMap<String, String>,
    state: SessionState,
    phase: watch::Sender<Phase>,
    callbacks: RwLock<Option<AgentCallbacks>>,
    transport: RwLock<Option<Arc<RpcTransport>>>,
    child: tokio::sync::Mutex<Option<WrappedChild>>,
    /// Serializes turns
    turn_lock: tokio::sync::Mutex<()>,
    current_turn: Mutex<Option<ActiveTurn>>,
    /// A delta was streamed for the message in progress
    streamed: Mutex<bool>,
    waiters: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

/// Codex MCP agent session
#[derive(Clone)]
pub struct CodexAgent {
    inner: Arc<Inner>,
}

impl fmt::Debug for CodexAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodexAgent")
            .field("program", &self.inner.program)
            .field("phase", &self.inner.phase())
            .field("state", &self.inner.state)
            .finish_non_exhaustive()
    }
}

fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {"elicitation": {}},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "title": "Agent Supervisor",
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// Registry key for a JSON-RPC request id
fn request_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl CodexAgent {
    pub fn new(config: &SupervisorConfig, policy: Arc<ApprovalPolicy>) -> Self {
        let state = SessionState::new(
            BackendKind::Codex,
            config.cwd.clone(),
            config.permission_mode,
            policy,
            config.loop_threshold,
        );
        let (phase, _) = watch::channel(Phase::Idle);
        Self {
            inner: Arc::new(Inner {
                program: config.codex_path.clone(),
                subcommand: config.codex_subcommand.clone(),
                model: config.model.clone(),
                extra_args: config.extra_args.clone(),
                env: config.env.clone(),
                state,
                phase,
                callbacks: RwLock::new(None),
                transport: RwLock::new(None),
                child: tokio::sync::Mutex::new(None),
                turn_lock: tokio::sync::Mutex::new(()),
                current_turn: Mutex::new(None),
                streamed: Mutex::new(false),
                waiters: Mutex::new(Vec::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn spawn_spec(&self, subcommand: &str) -> SpawnSpec {
        self.inner.spawn_spec(subcommand)
    }

    /// Claim the session for starting. False if it already started.
    fn begin_start(&self, callbacks: AgentCallbacks, options: &StartOptions) -> bool {
        let claimed = self.inner.phase.send_if_modified(|phase| {
            if *phase == Phase::Idle {
                *phase = Phase::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            tracing::debug!(phase = ?self.inner.phase(), "start ignored, session already started");
            return false;
        }
        *self
            .inner
            .callbacks
            .write()
            .unwrap_or_else(|p| p.into_inner()) = Some(callbacks);

        if let Some(id) = &options.resume_id {
            tracing::info!(conversation_id = %id, "Resuming Codex conversation");
            self.inner
                .state
                .update_identity(|identity| *identity = SessionIdentity::resuming(id.clone()));
        } else if options.continue_last {
            tracing::info!("Codex cannot continue the last conversation, starting a new one");
        }
        true
    }

    #[cfg(test)]
    pub(crate) async fn start_with_io<R, W>(
        &self,
        callbacks: AgentCallbacks,
        options: StartOptions,
        reader: R,
        writer: W,
    ) where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        if self.begin_start(callbacks, &options) {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                if let Err(e) = inner.connect(reader, writer, None).await {
                    inner.fail_start(e).await;
                }
            });
        }
    }
}

impl Inner {
    fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    fn spawn_spec(&self, subcommand: &str) -> SpawnSpec {
        SpawnSpec::new(&self.program, self.state.cwd())
            .arg(subcommand)
            .args(self.extra_args.iter().cloned())
            .envs(&self.env)
    }

    /// Resolve the server subcommand, spawn it and connect
    async fn launch(self: Arc<Self>) {
        let subcommand =
            version::resolve_subcommand(&self.program, self.state.cwd(), self.subcommand.as_deref())
                .await;
        if self.phase() == Phase::Terminated {
            tracing::debug!("Codex session killed before spawning");
            return;
        }
        let spec = self.spawn_spec(&subcommand);
        tracing::info!(command = %spec.display(), "Starting Codex MCP server");
        match process::spawn(&spec) {
            Ok(spawned) => {
                if let Some(stderr) = spawned.stderr {
                    process::forward_stderr(stderr, "codex");
                }
                if let Err(e) = self
                    .connect(spawned.stdout, spawned.stdin, Some(spawned.child))
                    .await
                {
                    self.fail_start(e).await;
                }
            }
            Err(e) => {
                e.trace_error();
                self.set_phase(Phase::Idle);
                self.emit(OutputEvent::error(format!("Failed to start Codex: {e}")));
            }
        }
    }

    /// Wire the session to a running server and perform the handshake
    async fn connect<R, W>(
        self: &Arc<Self>,
        reader: R,
        writer: W,
        child: Option<WrappedChild>,
    ) -> Result<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let transport = Arc::new(RpcTransport::new(FrameWriter::new(writer)));
        *self.transport.write().unwrap_or_else(|p| p.into_inner()) = Some(Arc::clone(&transport));
        *self.child.lock().await = child;
        if self.phase() == Phase::Terminated {
            return Err(AgentError::NotAlive);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let span = tracing::info_span!("codex_session", cwd = %self.state.cwd().display());
        tokio::spawn(
            read_loop(reader, tx, self.shutdown.clone()).instrument(span.clone()),
        );
        tokio::spawn(Arc::clone(self).consume(rx).instrument(span));

        let init = tokio::time::timeout(
            HANDSHAKE_TIMEOUT,
            transport.call("initialize", initialize_params()),
        )
        .await
        .map_err(|_| {
            AgentError::Timeout(u64::try_from(HANDSHAKE_TIMEOUT.as_millis()).unwrap_or(u64::MAX))
        })??;
        transport.notify("notifications/initialized", None).await?;

        if self.phase() == Phase::Terminated {
            return Err(AgentError::NotAlive);
        }
        self.state.set_alive(true);
        self.set_phase(Phase::Connected);
        let server = init
            .pointer("/serverInfo/name")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let version = init
            .pointer("/serverInfo/version")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        tracing::info!(server = %server, version = %version, "Codex session connected");
        Ok(())
    }

    async fn fail_start(&self, error: AgentError) {
        let killed = self.phase() == Phase::Terminated;
        error.trace_error();
        self.set_phase(Phase::Terminated);
        self.shutdown.cancel();
        if let Some(transport) = self.take_transport() {
            transport.fail_all();
            transport.close().await;
        }
        if let Some(mut child) = self.child.lock().await.take() {
            child.shutdown().await;
        }
        if !killed {
            self.emit(OutputEvent::error(format!("Failed to start Codex: {error}")));
        }
    }

    /// Set the phase unless the session is already terminated
    fn set_phase(&self, next: Phase) {
        self.phase.send_if_modified(|phase| {
            if *phase == Phase::Terminated || *phase == next {
                false
            } else {
                *phase = next;
                true
            }
        });
    }

    /// Wait out a handshake in progress. Errors unless connected.
    async fn wait_connected(&self) -> Result<()> {
        let mut rx = self.phase.subscribe();
        let phase = *rx
            .wait_for(|phase| *phase != Phase::Connecting)
            .await
            .map_err(|_| AgentError::NotAlive)?;
        if phase == Phase::Connected && self.state.is_alive() {
            Ok(())
        } else {
            Err(AgentError::NotAlive)
        }
    }

    fn callbacks(&self) -> Option<AgentCallbacks> {
        self.callbacks
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn emit(&self, event: OutputEvent) {
        if let Some(callbacks) = self.callbacks() {
            callbacks.output(event);
        }
    }

    fn transport(&self) -> Option<Arc<RpcTransport>> {
        self.transport.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn take_transport(&self) -> Option<Arc<RpcTransport>> {
        self.transport.write().unwrap_or_else(|p| p.into_inner()).take()
    }

    fn set_streamed(&self, streamed: bool) -> bool {
        std::mem::replace(
            &mut *self.streamed.lock().unwrap_or_else(|p| p.into_inner()),
            streamed,
        )
    }

    fn observe_ids(&self, ids: ExtractedIds) {
        if ids.is_empty() {
            return;
        }
        if self.state.update_identity(|identity| identity.observe(ids)) {
            let identity = self.state.identity();
            tracing::info!(
                session_id = identity.session_id().unwrap_or("-"),
                conversation_id = identity.conversation_id().unwrap_or("-"),
                "Codex identifiers learned"
            );
        }
    }

    /// Tool name and arguments for the next turn
    fn tool_call(&self, prompt: &str) -> (&'static str, Value) {
        let identity = self.state.identity();
        if let Some(conversation) = identity.resume_target() {
            let mut arguments = json!({"prompt": prompt, "conversationId": conversation});
            if let Some(session) = identity.session_id() {
                arguments["sessionId"] = json!(session);
            }
            return (REPLY_TOOL, arguments);
        }
        let (approval, sandbox) = self.state.permission_mode().codex_settings();
        let mut arguments = json!({
            "prompt": prompt,
            "cwd": self.state.cwd().display().to_string(),
            "approval-policy": approval.as_str(),
            "sandbox": sandbox.as_str(),
        });
        if let Some(model) = &self.model {
            arguments["model"] = json!(model);
        }
        (START_TOOL, arguments)
    }

    /// Run one turn to completion. Caller holds `turn_lock`.
    async fn run_turn(&self, prompt: &str) -> Result<()> {
        let transport = self.transport().ok_or(AgentError::NotAlive)?;
        let (tool, arguments) = self.tool_call(prompt);
        tracing::info!(tool, "Starting Codex turn");

        let call = transport
            .start_call("tools/call", json!({"name": tool, "arguments": arguments}))
            .await?;
        let call_id = call.id;
        let abort = self.shutdown.child_token();
        *self.current_turn.lock().unwrap_or_else(|p| p.into_inner()) = Some(ActiveTurn {
            call_id,
            abort: abort.clone(),
        });

        let outcome = tokio::select! {
            biased;
            () = abort.cancelled() => {
                transport.forget(call_id);
                Err(AgentError::Cancelled)
            }
            response = call.response() => response,
        };

        {
            let mut current = self.current_turn.lock().unwrap_or_else(|p| p.into_inner());
            if current.as_ref().is_some_and(|turn| turn.call_id == call_id) {
                *current = None;
            }
        }
        self.state.end_turn();
        self.set_streamed(false);

        match outcome {
            Ok(result) => {
                self.observe_ids(extract_from_response(&result));
                let is_error = result.get("isError").and_then(Value::as_bool).unwrap_or(false);
                self.emit(OutputEvent::turn_result(
                    events::result_text(&result),
                    is_error,
                    self.state.identity().resume_target().map(String::from),
                ));
                Ok(())
            }
            Err(AgentError::Cancelled) => {
                tracing::info!(call_id, "Codex turn aborted");
                self.emit(OutputEvent::system(
                    "Turn aborted",
                    self.state.identity().resume_target().map(String::from),
                ));
                Err(AgentError::Cancelled)
            }
            Err(e) => {
                e.trace_error();
                self.emit(OutputEvent::error(format!("Codex call failed: {e}")));
                Err(e)
            }
        }
    }

    /// Abort the in-flight turn. False if there was none.
    async fn abort_turn(&self, reason: &str) -> bool {
        let Some(turn) = self
            .current_turn
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        else {
            return false;
        };
        if let Some(transport) = self.transport() {
            let params = json!({"requestId": turn.call_id, "reason": reason});
            if let Err(e) = transport.notify(CANCELLED_METHOD, Some(params)).await {
                tracing::debug!(error = %e, "Abort notification not delivered");
            }
        }
        turn.abort.cancel();
        true
    }

    async fn consume(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Incoming>) {
        while let Some(item) = rx.recv().await {
            match item {
                Incoming::Response { id, outcome } => {
                    if let Some(transport) = self.transport() {
                        transport.complete(&id, outcome);
                    }
                }
                Incoming::Notification { method, params } => {
                    self.handle_notification(&method, &params);
                }
                Incoming::Request { id, method, params } => {
                    self.handle_request(id, &method, params).await;
                }
                Incoming::Closed => {
                    self.on_closed().await;
                    break;
                }
            }
        }
    }

    fn handle_notification(self: &Arc<Self>, method: &str, params: &Value) {
        match method {
            EVENT_METHOD => {
                self.observe_ids(extract_from_event(params));
                if let Some(event) = events::parse_event(params) {
                    self.handle_event(event);
                }
            }
            CANCELLED_METHOD => {
                let Some(id) = params.get("requestId") else {
                    return;
                };
                let key = request_key(id);
                if self.state.gate().cancel(&key) {
                    tracing::info!(request_id = %key, "Elicitation cancelled by Codex");
                } else {
                    tracing::debug!(request_id = %key, "Cancel for unknown elicitation");
                }
            }
            other => tracing::trace!(method = other, "Ignoring notification"),
        }
    }

    fn handle_event(self: &Arc<Self>, event: CodexEvent) {
        match event {
            CodexEvent::SessionConfigured { model, .. } => {
                let text = match model {
                    Some(model) => format!("Session started ({model})"),
                    None => "Session started".to_string(),
                };
                self.emit(OutputEvent::system(
                    text,
                    self.state.identity().resume_target().map(String::from),
                ));
            }
            CodexEvent::TaskStarted => {
                self.set_streamed(false);
            }
            CodexEvent::TextDelta(delta) => {
                self.set_streamed(true);
                self.emit(OutputEvent::text(delta));
            }
            CodexEvent::AgentMessage(message) => {
                if !self.set_streamed(false) {
                    self.emit(OutputEvent::text(message));
                }
            }
            CodexEvent::CommandBegin { command } => {
                self.emit(OutputEvent::action_started(SHELL_ACTION, command));
            }
            CodexEvent::PatchBegin { files } => {
                let detail = (!files.is_empty()).then(|| files.join(", "));
                self.emit(OutputEvent::action_started(PATCH_ACTION, detail));
            }
            CodexEvent::CommandEnd { failed } | CodexEvent::PatchEnd { failed } => {
                if let Some(count) = self.state.record_tool_outcome(failed) {
                    self.on_loop_detected(count);
                }
            }
            CodexEvent::TaskComplete { .. } => tracing::debug!("Codex task complete"),
            CodexEvent::TurnAborted { reason } => {
                let text = match reason {
                    Some(reason) => format!("Turn aborted: {reason}"),
                    None => "Turn aborted".to_string(),
                };
                self.emit(OutputEvent::system(text, self.state.session_id()));
            }
            CodexEvent::Error(message) => {
                tracing::warn!(message = %message, "Codex reported an error");
                self.emit(OutputEvent::error(message));
            }
            CodexEvent::Other(kind) => tracing::trace!(kind = %kind, "Ignoring event"),
        }
    }

    fn on_loop_detected(self: &Arc<Self>, count: u32) {
        tracing::warn!(consecutive_failures = count, "Failure loop detected, aborting turn");
        let this = Arc::clone(self);
        tokio::spawn(
            async move {
                if !this.abort_turn("Failure loop detected").await {
                    tracing::debug!("No turn to abort");
                }
            }
            .in_current_span(),
        );
        if let Some(callbacks) = self.callbacks() {
            callbacks.loop_detected(LoopDetected {
                consecutive_failures: count,
                session_id: self.state.identity().resume_target().map(String::from),
            });
        }
    }

    async fn handle_request(self: &Arc<Self>, id: Value, method: &str, params: Value) {
        let Some(transport) = self.transport() else {
            return;
        };
        let sent = match method {
            ELICITATION_METHOD => {
                self.handle_elicitation(&transport, id, &params).await;
                Ok(())
            }
            "ping" => transport.respond(id, json!({})).await,
            other => {
                tracing::debug!(method = other, "Unsupported server request");
                transport
                    .respond_error(id, ErrorCode::MethodNotFound, &format!("Method not found: {other}"))
                    .await
            }
        };
        if let Err(e) = sent {
            tracing::debug!(error = %e, "Response not delivered");
        }
    }

    async fn handle_elicitation(self: &Arc<Self>, transport: &Arc<RpcTransport>, id: Value, params: &Value) {
        let key = request_key(&id);
        let Elicitation { action, input } = events::parse_elicitation(params);
        match self.state.gate().submit(&key, &action, input) {
            GateVerdict::Resolved(decision) => {
                if let Err(e) = transport.respond(id, events::decision_result(&decision)).await {
                    tracing::warn!(request_id = %key, error = %e, "Failed to deliver approval decision");
                }
            }
            GateVerdict::Parked(ticket) => {
                let request: PendingApproval = ticket.request.clone();
                let transport = Arc::clone(transport);
                let waiter = tokio::spawn(
                    async move {
                        let result = match ticket.wait().await {
                            ApprovalOutcome::Decided(decision) => events::decision_result(&decision),
                            ApprovalOutcome::Cancelled => events::cancelled_result(),
                        };
                        if let Err(e) = transport.respond(id, result).await {
                            tracing::debug!(request_id = %key, error = %e, "Elicitation response not delivered");
                        }
                    }
                    .in_current_span(),
                );
                self.track_waiter(waiter);
                if let Some(callbacks) = self.callbacks() {
                    callbacks.approval_requested(request);
                }
            }
            GateVerdict::Rejected => {
                if let Err(e) = transport
                    .respond_error(id, ErrorCode::InvalidRequest, "Request id already used")
                    .await
                {
                    tracing::debug!(request_id = %key, error = %e, "Rejection not delivered");
                }
            }
        }
    }

    fn track_waiter(&self, handle: JoinHandle<()>) {
        let mut waiters = self.waiters.lock().unwrap_or_else(|p| p.into_inner());
        waiters.retain(|h| !h.is_finished());
        waiters.push(handle);
    }

    async fn drain_waiters(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .waiters
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();
        if handles.is_empty() {
            return;
        }
        if tokio::time::timeout(WAITER_DRAIN_TIMEOUT, futures::future::join_all(handles))
            .await
            .is_err()
        {
            tracing::warn!("Elicitation waiters did not finish in time");
        }
    }

    /// Server stdout closed. Unexpected unless the session was killed.
    async fn on_closed(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let was_connected = self.phase() == Phase::Connected;
        self.set_phase(Phase::Terminated);
        self.state.set_alive(false);
        let cancelled = self.state.gate().cancel_all();
        self.drain_waiters().await;
        if let Some(transport) = self.take_transport() {
            transport.fail_all();
            transport.close().await;
        }
        if let Some(mut child) = self.child.lock().await.take() {
            child.shutdown().await;
        }
        if was_connected {
            AgentError::ConnectionClosed.trace_error();
            tracing::warn!(cancelled, "Codex process exited");
            self.emit(OutputEvent::error("Codex process exited"));
        }
    }
}

#[async_trait]
impl Agent for CodexAgent {
    fn kind(&self) -> BackendKind {
        BackendKind::Codex
    }

    async fn start(&self, callbacks: AgentCallbacks, options: StartOptions) {
        if self.begin_start(callbacks, &options) {
            tokio::spawn(Arc::clone(&self.inner).launch());
        }
    }

    async fn wait_ready(&self) -> Result<()> {
        self.inner.wait_connected().await
    }

    async fn send(&self, content: Content) -> Result<()> {
        let inner = &self.inner;
        inner.wait_connected().await?;
        if content.is_empty() {
            return Err(AgentError::EmptyPrompt);
        }
        let prompt = content.text_parts();
        let images = content.image_count();
        if prompt.trim().is_empty() {
            let message = format!("Codex accepts text only, {images} image(s) not sent");
            inner.emit(OutputEvent::error(message.clone()));
            return Err(AgentError::UnsupportedContent(message));
        }
        if images > 0 {
            inner.emit(OutputEvent::error(format!(
                "Codex accepts text only, {images} image(s) dropped from this message"
            )));
        }

        let _turn = inner.turn_lock.lock().await;
        if !inner.state.is_alive() {
            return Err(AgentError::NotAlive);
        }
        inner.run_turn(&prompt).await
    }

    fn approve(&self, request_id: &str, updated_input: Option<Value>) -> bool {
        if updated_input.is_some() {
            tracing::debug!(request_id, "Codex approvals cannot carry edited input, ignoring it");
        }
        self.inner.state.gate().approve(request_id, None)
    }

    fn deny(&self, request_id: &str, reason: Option<String>) -> bool {
        self.inner.state.gate().deny(request_id, reason)
    }

    fn approve_all(&self) -> usize {
        self.inner.state.gate().approve_all()
    }

    fn deny_all(&self, reason: Option<String>) -> usize {
        self.inner.state.gate().deny_all(reason)
    }

    fn list_pending(&self) -> Vec<PendingApproval> {
        self.inner.state.gate().list_pending()
    }

    async fn interrupt(&self) -> Result<()> {
        if !self.inner.state.is_alive() {
            return Err(AgentError::NotAlive);
        }
        if !self.inner.abort_turn("Interrupted by user").await {
            tracing::debug!("Interrupt with no turn in progress");
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.inner.state.is_alive()
    }

    /// The conversation id when known, since that is what resumes a Codex
    /// conversation
    fn current_session_id(&self) -> Option<String> {
        self.inner.state.identity().resume_target().map(String::from)
    }

    async fn kill(&self) {
        let inner = &self.inner;
        let claimed = inner.phase.send_if_modified(|phase| {
            if *phase == Phase::Terminated {
                false
            } else {
                *phase = Phase::Terminated;
                true
            }
        });
        if !claimed {
            return;
        }
        let was_alive = inner.state.set_alive(false);
        let aborted = inner.abort_turn("Session killed").await;
        let cancelled = inner.state.gate().cancel_all();
        inner.drain_waiters().await;
        inner.shutdown.cancel();
        if let Some(transport) = inner.take_transport() {
            transport.fail_all();
            transport.close().await;
        }
        if let Some(mut child) = inner.child.lock().await.take() {
            child.shutdown().await;
        }
        tracing::info!(was_alive, aborted, cancelled, "Codex session killed");
    }
}
