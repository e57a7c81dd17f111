//! Claude Code session over the stream-json line protocol
//!
//! Two tasks per session: the demux task reads stdout and handles control
//! traffic itself, everything else goes through an unbounded queue to the
//! consumer task which normalizes it for the caller.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::frames::{self, Frame};
use crate::agent::{Agent, AgentCallbacks, StartOptions};
use crate::logging::ErrorTraceExt;
use crate::permissions::ApprovalPolicy;
use crate::process::{self, FrameWriter, SpawnSpec, WrappedChild};
use crate::session::{GateVerdict, SessionState};
use crate::types::{
    AgentError, ApprovalDecision, ApprovalOutcome, BackendKind, Content, LoopDetected,
    OutputEvent, PendingApproval, Result, SupervisorConfig,
};

/// How long a self-issued control request waits for its response
const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// How long teardown waits for approval waiters to write their responses
const WAITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const CANCELLED_MESSAGE: &str = "Request cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Spawning,
    TurnIdle,
    TurnActive,
    Terminated,
}

/// Queue item from the demux task to the consumer task
#[derive(Debug)]
enum Inbound {
    Message(Value),
    Closed,
}

type ControlReply = std::result::Result<Value, String>;

struct Inner {
    program: String,
    model: Option<String>,
    extra_args: Vec<String>,
    env: HashMap<String, String>,
    state: SessionState,
    phase: Mutex<Phase>,
    callbacks: RwLock<Option<AgentCallbacks>>,
    writer: RwLock<Option<Arc<FrameWriter>>>,
    child: tokio::sync::Mutex<Option<WrappedChild>>,
    /// Self-issued control requests awaiting a `control_response`
    control: DashMap<String, oneshot::Sender<ControlReply>>,
    control_seq: AtomicU64,
    /// Tasks waiting on parked approvals
    waiters: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

/// Claude Code agent session
#[derive(Clone)]
pub struct ClaudeAgent {
    inner: Arc<Inner>,
}

impl fmt::Debug for ClaudeAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaudeAgent")
            .field("program", &self.inner.program)
            .field("phase", &self.inner.phase())
            .field("state", &self.inner.state)
            .finish_non_exhaustive()
    }
}

impl ClaudeAgent {
    pub fn new(config: &SupervisorConfig, policy: Arc<ApprovalPolicy>) -> Self {
        let state = SessionState::new(
            BackendKind::Claude,
            config.cwd.clone(),
            config.permission_mode,
            policy,
            config.loop_threshold,
        );
        Self {
            inner: Arc::new(Inner {
                program: config.claude_path.clone(),
                model: config.model.clone(),
                extra_args: config.extra_args.clone(),
                env: config.env.clone(),
                state,
                phase: Mutex::new(Phase::Idle),
                callbacks: RwLock::new(None),
                writer: RwLock::new(None),
                child: tokio::sync::Mutex::new(None),
                control: DashMap::new(),
                control_seq: AtomicU64::new(0),
                waiters: Mutex::new(Vec::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Command line for a session start
    pub fn spawn_spec(&self, options: &StartOptions) -> SpawnSpec {
        let inner = &self.inner;
        let mut spec = SpawnSpec::new(&inner.program, inner.state.cwd())
            .args([
                "--output-format",
                "stream-json",
                "--input-format",
                "stream-json",
                "--verbose",
                "--permission-prompt-tool",
                "stdio",
                "--permission-mode",
                inner.state.permission_mode().claude_mode(),
            ])
            .envs(&inner.env);
        if let Some(model) = &inner.model {
            spec = spec.args(["--model", model.as_str()]);
        }
        if let Some(id) = &options.resume_id {
            spec = spec.args(["--resume", id.as_str()]);
        } else if options.continue_last {
            spec = spec.arg("--continue");
        }
        spec.args(inner.extra_args.iter().cloned())
    }

    /// Claim the session for starting. False if it already started.
    fn begin_start(&self, callbacks: AgentCallbacks) -> bool {
        {
            let mut phase = self.inner.lock_phase();
            if *phase != Phase::Idle {
                tracing::debug!(phase = ?*phase, "start ignored, session already started");
                return false;
            }
            *phase = Phase::Spawning;
        }
        *self
            .inner
            .callbacks
            .write()
            .unwrap_or_else(|p| p.into_inner()) = Some(callbacks);
        true
    }

    /// Wire the session to a running process's stdio and start its tasks
    pub(crate) async fn attach<R, W>(&self, reader: R, writer: W, child: Option<WrappedChild>)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let inner = &self.inner;
        *inner.writer.write().unwrap_or_else(|p| p.into_inner()) =
            Some(Arc::new(FrameWriter::new(writer)));
        *inner.child.lock().await = child;
        inner.state.set_alive(true);
        inner.set_phase(Phase::TurnIdle);

        let (tx, rx) = mpsc::unbounded_channel();
        let span = tracing::info_span!("claude_session", cwd = %inner.state.cwd().display());
        tokio::spawn(Arc::clone(inner).demux(reader, tx).instrument(span.clone()));
        tokio::spawn(Arc::clone(inner).consume(rx).instrument(span));
        tracing::info!("Claude session connected");
    }

    #[cfg(test)]
    pub(crate) async fn start_with_io<R, W>(&self, callbacks: AgentCallbacks, reader: R, writer: W)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        if self.begin_start(callbacks) {
            self.attach(reader, writer, None).await;
        }
    }
}

impl Inner {
    fn lock_phase(&self) -> std::sync::MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn phase(&self) -> Phase {
        *self.lock_phase()
    }

    /// Set the phase unless the session is already terminated
    fn set_phase(&self, next: Phase) {
        let mut phase = self.lock_phase();
        if *phase != Phase::Terminated {
            *phase = next;
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

    fn writer(&self) -> Option<Arc<FrameWriter>> {
        self.writer.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn take_writer(&self) -> Option<Arc<FrameWriter>> {
        self.writer.write().unwrap_or_else(|p| p.into_inner()).take()
    }

    async fn send_frame(&self, frame: &Value) -> Result<()> {
        let writer = self.writer().ok_or(AgentError::ConnectionClosed)?;
        writer.send_json(frame).await
    }

    async fn demux<R>(self: Arc<Self>, reader: R, tx: mpsc::UnboundedSender<Inbound>)
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        loop {
            let line = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "stdout read failed");
                    break;
                }
            };
            let Some(frame) = frames::parse_line(&line) else {
                tracing::trace!(line = %line, "Ignoring non-JSON line");
                continue;
            };
            match frame {
                Frame::ControlResponse {
                    request_id,
                    outcome,
                } => match self.control.remove(&request_id) {
                    Some((_, waiter)) => drop(waiter.send(outcome)),
                    None => tracing::debug!(request_id, "control_response for unknown request"),
                },
                Frame::CanUseTool {
                    request_id,
                    tool_name,
                    input,
                } => self.handle_permission(request_id, tool_name, input).await,
                Frame::ControlCancel { request_id } => {
                    if self.state.gate().cancel(&request_id) {
                        tracing::info!(request_id, "Approval request cancelled by Claude");
                    } else {
                        tracing::debug!(request_id, "Cancel for unknown approval request");
                    }
                }
                Frame::ControlRequest {
                    request_id,
                    subtype,
                } => {
                    tracing::warn!(request_id, subtype, "Unsupported control request");
                    let frame = frames::error_response(
                        &request_id,
                        &format!("Unsupported control request subtype: {subtype}"),
                    );
                    if let Err(e) = self.send_frame(&frame).await {
                        tracing::debug!(error = %e, "Failed to answer control request");
                    }
                }
                Frame::Message(message) => {
                    if tx.send(Inbound::Message(message)).is_err() {
                        break;
                    }
                }
            }
        }
        drop(tx.send(Inbound::Closed));
    }

    async fn handle_permission(self: &Arc<Self>, request_id: String, tool_name: String, input: Value) {
        match self
            .state
            .gate()
            .submit(&request_id, &tool_name, input.clone())
        {
            GateVerdict::Resolved(decision) => {
                self.send_decision(&request_id, decision, input).await;
            }
            GateVerdict::Parked(ticket) => {
                let request: PendingApproval = ticket.request.clone();
                let this = Arc::clone(self);
                let waiter = tokio::spawn(
                    async move {
                        match ticket.wait().await {
                            ApprovalOutcome::Decided(decision) => {
                                this.send_decision(&request_id, decision, input).await;
                            }
                            ApprovalOutcome::Cancelled => {
                                let frame = frames::error_response(&request_id, CANCELLED_MESSAGE);
                                if let Err(e) = this.send_frame(&frame).await {
                                    tracing::debug!(request_id, error = %e, "Cancellation not delivered");
                                }
                            }
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
                let frame = frames::error_response(&request_id, "Request id already used");
                if let Err(e) = self.send_frame(&frame).await {
                    tracing::debug!(request_id, error = %e, "Rejection not delivered");
                }
            }
        }
    }

    async fn send_decision(&self, request_id: &str, decision: ApprovalDecision, input: Value) {
        let frame = match decision {
            ApprovalDecision::Allow { updated_input } => {
                frames::allow_response(request_id, updated_input.unwrap_or(input))
            }
            ApprovalDecision::Deny { reason } => frames::deny_response(request_id, &reason),
        };
        if let Err(e) = self.send_frame(&frame).await {
            tracing::warn!(request_id, error = %e, "Failed to deliver approval decision");
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
            tracing::warn!("Approval waiters did not finish in time");
        }
    }

    async fn consume(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Inbound>) {
        while let Some(item) = rx.recv().await {
            match item {
                Inbound::Message(message) => self.handle_message(&message),
                Inbound::Closed => {
                    self.on_closed().await;
                    break;
                }
            }
        }
    }

    fn handle_message(self: &Arc<Self>, message: &Value) {
        match message.get("type").and_then(Value::as_str) {
            Some("system") => {
                if let Some(id) = frames::session_id(message) {
                    if self.state.update_identity(|identity| identity.set_session_id(id.clone())) {
                        tracing::info!(session_id = %id, "Claude session id updated");
                    }
                }
                if let Some(summary) = frames::init_summary(message) {
                    self.emit(OutputEvent::system(summary, self.state.session_id()));
                }
            }
            Some("assistant") => {
                self.set_phase(Phase::TurnActive);
                for event in frames::assistant_events(message) {
                    self.emit(event);
                }
            }
            Some("user") => {
                if let Some(all_errors) = frames::tool_results_all_errors(message) {
                    if let Some(count) = self.state.record_tool_outcome(all_errors) {
                        self.on_loop_detected(count);
                    }
                }
            }
            Some("result") => {
                if let Some(id) = frames::session_id(message) {
                    self.state.update_identity(|identity| identity.set_session_id(id));
                }
                self.state.end_turn();
                self.set_phase(Phase::TurnIdle);
                self.emit(frames::result_event(message));
            }
            other => tracing::trace!(message_type = ?other, "Ignoring message"),
        }
    }

    fn on_loop_detected(self: &Arc<Self>, count: u32) {
        tracing::warn!(consecutive_failures = count, "Failure loop detected, interrupting");
        let this = Arc::clone(self);
        tokio::spawn(
            async move {
                if let Err(e) = this.interrupt().await {
                    tracing::warn!(error = %e, "Loop interrupt failed");
                }
            }
            .in_current_span(),
        );
        if let Some(callbacks) = self.callbacks() {
            callbacks.loop_detected(LoopDetected {
                consecutive_failures: count,
                session_id: self.state.session_id(),
            });
        }
    }

    /// stdout closed. Unexpected unless the session was killed.
    async fn on_closed(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.set_phase(Phase::Terminated);
        self.state.set_alive(false);
        let cancelled = self.state.gate().cancel_all();
        self.drain_waiters().await;
        self.control.clear();
        if let Some(writer) = self.take_writer() {
            writer.close().await;
        }
        if let Some(mut child) = self.child.lock().await.take() {
            child.shutdown().await;
        }
        AgentError::ConnectionClosed.trace_error();
        tracing::warn!(cancelled, "Claude process exited");
        self.emit(OutputEvent::error("Claude Code process exited"));
    }

    fn next_control_id(&self) -> String {
        let seq = self.control_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("req_{seq}_{}", &suffix[..8])
    }

    /// Issue a control request and wait for its response
    async fn send_control(&self, request: Value) -> Result<Value> {
        let request_id = self.next_control_id();
        let (tx, rx) = oneshot::channel();
        self.control.insert(request_id.clone(), tx);

        if let Err(e) = self
            .send_frame(&frames::control_request(&request_id, request))
            .await
        {
            self.control.remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(CONTROL_TIMEOUT, rx).await {
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(message))) => Err(AgentError::ControlFailed(message)),
            Ok(Err(_)) => Err(AgentError::ConnectionClosed),
            Err(_) => {
                self.control.remove(&request_id);
                Err(AgentError::Timeout(
                    u64::try_from(CONTROL_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
                ))
            }
        }
    }

    async fn interrupt(&self) -> Result<()> {
        if !self.state.is_alive() {
            return Err(AgentError::NotAlive);
        }
        tracing::info!("Interrupting Claude turn");
        self.send_control(frames::interrupt_request()).await?;
        Ok(())
    }
}

#[async_trait]
impl Agent for ClaudeAgent {
    fn kind(&self) -> BackendKind {
        BackendKind::Claude
    }

    async fn start(&self, callbacks: AgentCallbacks, options: StartOptions) {
        if !self.begin_start(callbacks) {
            return;
        }
        let spec = self.spawn_spec(&options);
        match process::spawn(&spec) {
            Ok(spawned) => {
                if let Some(stderr) = spawned.stderr {
                    process::forward_stderr(stderr, "claude");
                }
                self.attach(spawned.stdout, spawned.stdin, Some(spawned.child))
                    .await;
            }
            Err(e) => {
                e.trace_error();
                self.inner.set_phase(Phase::Idle);
                self.inner
                    .emit(OutputEvent::error(format!("Failed to start Claude Code: {e}")));
            }
        }
    }

    async fn wait_ready(&self) -> Result<()> {
        if self.inner.state.is_alive() {
            Ok(())
        } else {
            Err(AgentError::NotAlive)
        }
    }

    async fn send(&self, content: Content) -> Result<()> {
        let inner = &self.inner;
        if !inner.state.is_alive() {
            return Err(AgentError::NotAlive);
        }
        if content.is_empty() {
            return Err(AgentError::EmptyPrompt);
        }
        let session_id = inner
            .state
            .session_id()
            .unwrap_or_else(|| frames::DEFAULT_SESSION_ID.to_string());
        inner.set_phase(Phase::TurnActive);
        inner
            .send_frame(&frames::user_message(&content, &session_id))
            .await
            .map_err(|e| {
                e.trace_error();
                e
            })
    }

    fn approve(&self, request_id: &str, updated_input: Option<Value>) -> bool {
        self.inner.state.gate().approve(request_id, updated_input)
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
        self.inner.interrupt().await
    }

    fn is_alive(&self) -> bool {
        self.inner.state.is_alive()
    }

    fn current_session_id(&self) -> Option<String> {
        self.inner.state.session_id()
    }

    async fn kill(&self) {
        let inner = &self.inner;
        {
            let mut phase = inner.lock_phase();
            if *phase == Phase::Terminated {
                return;
            }
            *phase = Phase::Terminated;
        }
        let was_alive = inner.state.set_alive(false);
        let cancelled = inner.state.gate().cancel_all();
        inner.drain_waiters().await;
        inner.control.clear();
        inner.shutdown.cancel();
        if let Some(writer) = inner.take_writer() {
            writer.close().await;
        }
        if let Some(mut child) = inner.child.lock().await.take() {
            child.shutdown().await;
        }
        tracing::info!(was_alive, cancelled, "Claude session killed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OutputKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::io::{AsyncWriteExt, DuplexStream, Lines};

    /// The far side of the pipes: what the CLI would see
    struct FakeCli {
        stdout: DuplexStream,
        stdin: Lines<BufReader<DuplexStream>>,
    }

    impl FakeCli {
        async fn emit(&mut self, frame: Value) {
            let mut line = frame.to_string();
            line.push('\n');
            self.stdout.write_all(line.as_bytes()).await.unwrap();
        }

        async fn emit_raw(&mut self, line: &str) {
            self.stdout.write_all(line.as_bytes()).await.unwrap();
        }

        async fn next_frame(&mut self) -> Value {
            let line = tokio::time::timeout(Duration::from_secs(5), self.stdin.next_line())
                .await
                .expect("timed out waiting for a frame")
                .unwrap()
                .expect("stdin closed");
            serde_json::from_str(&line).unwrap()
        }

        async fn no_frame_within(&mut self, wait: Duration) -> bool {
            tokio::time::timeout(wait, self.stdin.next_line()).await.is_err()
        }

        async fn can_use_tool(&mut self, id: &str, tool: &str, input: Value) {
            self.emit(json!({
                "type": "control_request",
                "request_id": id,
                "request": {"subtype": "can_use_tool", "tool_name": tool, "input": input}
            }))
            .await;
        }
    }

    struct Harness {
        agent: ClaudeAgent,
        cli: FakeCli,
        events: mpsc::UnboundedReceiver<OutputEvent>,
        approvals: mpsc::UnboundedReceiver<PendingApproval>,
        loops: mpsc::UnboundedReceiver<LoopDetected>,
    }

    impl Harness {
        async fn approval(&mut self) -> PendingApproval {
            tokio::time::timeout(Duration::from_secs(5), self.approvals.recv())
                .await
                .expect("timed out waiting for approval notification")
                .unwrap()
        }

        async fn event(&mut self) -> OutputEvent {
            tokio::time::timeout(Duration::from_secs(5), self.events.recv())
                .await
                .expect("timed out waiting for output")
                .unwrap()
        }
    }

    async fn harness_with(config: SupervisorConfig) -> Harness {
        let policy = Arc::new(config.approval_policy().unwrap());
        let agent = ClaudeAgent::new(&config, policy);

        let (agent_stdout, cli_stdout) = tokio::io::duplex(64 * 1024);
        let (agent_stdin, cli_stdin) = tokio::io::duplex(64 * 1024);

        let (event_tx, events) = mpsc::unbounded_channel();
        let (approval_tx, approvals) = mpsc::unbounded_channel();
        let (loop_tx, loops) = mpsc::unbounded_channel();
        let callbacks = AgentCallbacks::new(move |e| drop(event_tx.send(e)))
            .with_approval(move |p| drop(approval_tx.send(p)))
            .with_loop_detected(move |l| drop(loop_tx.send(l)));

        agent.start_with_io(callbacks, agent_stdout, agent_stdin).await;

        Harness {
            agent,
            cli: FakeCli {
                stdout: cli_stdout,
                stdin: BufReader::new(cli_stdin).lines(),
            },
            events,
            approvals,
            loops,
        }
    }

    async fn harness() -> Harness {
        harness_with(SupervisorConfig::new(std::env::temp_dir())).await
    }

    #[test]
    fn test_spawn_spec_flags() {
        let mut config = SupervisorConfig::new("/work");
        config.permission_mode = crate::session::PermissionMode::ReadOnly;
        config.model = Some("opus".into());
        config.extra_args = vec!["--debug".into()];
        let agent = ClaudeAgent::new(&config, Arc::new(ApprovalPolicy::default()));

        let spec = agent.spawn_spec(&StartOptions::resume("abc"));
        assert_eq!(
            spec.display(),
            "claude --output-format stream-json --input-format stream-json --verbose \
             --permission-prompt-tool stdio --permission-mode plan --model opus --resume abc --debug"
        );
        let spec = agent.spawn_spec(&StartOptions::continue_last());
        assert!(spec.args.iter().any(|a| a == "--continue"));
    }

    #[tokio::test]
    async fn test_send_requires_alive() {
        let config = SupervisorConfig::new(std::env::temp_dir());
        let agent = ClaudeAgent::new(&config, Arc::new(ApprovalPolicy::default()));
        assert!(matches!(
            agent.send(Content::from("hi")).await,
            Err(AgentError::NotAlive)
        ));
    }

    #[tokio::test]
    async fn test_send_writes_user_frame() {
        let mut h = harness().await;
        assert!(h.agent.is_alive());
        h.agent.send(Content::from("hello")).await.unwrap();
        let frame = h.cli.next_frame().await;
        assert_eq!(frame["type"], "user");
        assert_eq!(frame["message"]["content"], "hello");
        assert_eq!(frame["session_id"], "default");
        assert!(matches!(
            h.agent.send(Content::from("  ")).await,
            Err(AgentError::EmptyPrompt)
        ));
    }

    #[tokio::test]
    async fn test_output_normalization_and_session_id() {
        let mut h = harness().await;
        h.cli.emit_raw("not json at all\n").await;
        h.cli
            .emit(json!({"type": "system", "subtype": "init", "session_id": "sess-1", "model": "sonnet"}))
            .await;
        h.cli
            .emit(json!({"type": "assistant", "message": {"content": [
                {"type": "text", "text": "Hi"},
                {"type": "tool_use", "id": "t", "name": "Read", "input": {"file_path": "/a"}}
            ]}}))
            .await;
        h.cli
            .emit(json!({"type": "result", "subtype": "success", "result": "done", "session_id": "sess-1"}))
            .await;

        let system = h.event().await;
        assert_eq!(system.kind, OutputKind::System);
        assert_eq!(system.session_id.as_deref(), Some("sess-1"));
        assert_eq!(h.event().await.text.as_deref(), Some("Hi"));
        assert_eq!(h.event().await.action.as_deref(), Some("Read"));
        let result = h.event().await;
        assert_eq!(result.kind, OutputKind::TurnResult);
        assert_eq!(result.is_error, Some(false));
        assert_eq!(h.agent.current_session_id().as_deref(), Some("sess-1"));

        h.agent.send(Content::from("next")).await.unwrap();
        assert_eq!(h.cli.next_frame().await["session_id"], "sess-1");
    }

    #[tokio::test]
    async fn test_safe_action_is_answered_without_caller() {
        let mut h = harness().await;
        h.cli.can_use_tool("r1", "Read", json!({"file_path": "/etc/hosts"})).await;
        let frame = h.cli.next_frame().await;
        assert_eq!(frame["response"]["request_id"], "r1");
        assert_eq!(frame["response"]["response"]["behavior"], "allow");
        assert_eq!(frame["response"]["response"]["updatedInput"]["file_path"], "/etc/hosts");
        assert!(h.agent.list_pending().is_empty());
    }

    #[tokio::test]
    async fn test_approval_round_trip_and_double_resolve() {
        let mut h = harness().await;
        h.cli.can_use_tool("r1", "Bash", json!({"command": "rm -rf build"})).await;

        let pending = h.approval().await;
        assert_eq!(pending.request_id, "r1");
        assert_eq!(pending.action, "Bash");
        assert_eq!(h.agent.list_pending().len(), 1);

        assert!(h.agent.approve("r1", Some(json!({"command": "rm -rf build/tmp"}))));
        let frame = h.cli.next_frame().await;
        assert_eq!(frame["response"]["response"]["behavior"], "allow");
        assert_eq!(frame["response"]["response"]["updatedInput"]["command"], "rm -rf build/tmp");

        assert!(!h.agent.approve("r1", None));
        assert!(!h.agent.deny("r1", None));
        assert!(h.cli.no_frame_within(Duration::from_millis(200)).await);
    }

    #[tokio::test]
    async fn test_deny_carries_reason() {
        let mut h = harness().await;
        h.cli.can_use_tool("r1", "Write", json!({"file_path": "a.txt", "content": "x"})).await;
        h.approval().await;
        assert!(h.agent.deny("r1", None));
        let frame = h.cli.next_frame().await;
        assert_eq!(frame["response"]["response"]["behavior"], "deny");
        assert_eq!(frame["response"]["response"]["message"], "Denied by user");
    }

    #[tokio::test]
    async fn test_cancel_from_cli_writes_error_and_retires_id() {
        let mut h = harness().await;
        h.cli.can_use_tool("r1", "Bash", json!({"command": "sudo ls"})).await;
        h.approval().await;

        h.cli
            .emit(json!({"type": "control_cancel_request", "request_id": "r1"}))
            .await;
        let frame = h.cli.next_frame().await;
        assert_eq!(frame["response"]["subtype"], "error");
        assert_eq!(frame["response"]["request_id"], "r1");
        assert!(!h.agent.approve("r1", None));

        // A reused identifier is refused
        h.cli.can_use_tool("r1", "Bash", json!({"command": "sudo ls"})).await;
        let frame = h.cli.next_frame().await;
        assert_eq!(frame["response"]["subtype"], "error");
        assert!(h.agent.list_pending().is_empty());
    }

    #[tokio::test]
    async fn test_approve_all_window() {
        let mut h = harness().await;
        h.cli.can_use_tool("r1", "Bash", json!({"command": "sudo make install"})).await;
        h.approval().await;
        assert_eq!(h.agent.approve_all(), 1);
        assert_eq!(h.cli.next_frame().await["response"]["response"]["behavior"], "allow");

        // Later non-question requests in the same turn need no caller
        h.cli.can_use_tool("r2", "Edit", json!({"file_path": "a", "old_string": "x"})).await;
        let frame = h.cli.next_frame().await;
        assert_eq!(frame["response"]["request_id"], "r2");
        assert_eq!(frame["response"]["response"]["behavior"], "allow");

        // Questions still park and notify
        h.cli
            .can_use_tool("r3", "AskUserQuestion", json!({"questions": [{"question": "Which?"}]}))
            .await;
        assert_eq!(h.approval().await.request_id, "r3");
        assert_eq!(h.agent.list_pending().len(), 1);

        // The turn ends and the window closes
        h.cli.emit(json!({"type": "result", "subtype": "success", "result": ""})).await;
        while h.event().await.kind != OutputKind::TurnResult {}
        h.cli.can_use_tool("r4", "Edit", json!({"file_path": "a", "old_string": "x"})).await;
        assert_eq!(h.approval().await.request_id, "r4");
    }

    #[tokio::test]
    async fn test_kill_cancels_every_pending_request() {
        let mut h = harness().await;
        for i in 0..3 {
            h.cli
                .can_use_tool(&format!("r{i}"), "Bash", json!({"command": "rm -rf /tmp/x"}))
                .await;
            h.approval().await;
        }
        assert_eq!(h.agent.list_pending().len(), 3);

        h.agent.kill().await;
        assert!(!h.agent.is_alive());
        assert!(h.agent.list_pending().is_empty());

        let mut cancelled = Vec::new();
        for _ in 0..3 {
            let frame = h.cli.next_frame().await;
            assert_eq!(frame["response"]["subtype"], "error");
            cancelled.push(frame["response"]["request_id"].as_str().unwrap().to_string());
        }
        cancelled.sort();
        assert_eq!(cancelled, vec!["r0", "r1", "r2"]);

        // Idempotent, and sends fail afterwards
        h.agent.kill().await;
        assert!(matches!(
            h.agent.send(Content::from("hi")).await,
            Err(AgentError::NotAlive)
        ));
    }

    #[tokio::test]
    async fn test_loop_detection_interrupts_once() {
        let mut config = SupervisorConfig::new(std::env::temp_dir());
        config.loop_threshold = 20;
        let mut h = harness_with(config).await;

        let failed = json!({"type": "user", "message": {"content": [
            {"type": "tool_result", "tool_use_id": "t", "content": "boom", "is_error": true}
        ]}});
        for _ in 0..21 {
            h.cli.emit(failed.clone()).await;
        }

        let notice = tokio::time::timeout(Duration::from_secs(5), h.loops.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notice.consecutive_failures, 20);

        let frame = h.cli.next_frame().await;
        assert_eq!(frame["type"], "control_request");
        assert_eq!(frame["request"]["subtype"], "interrupt");
        let request_id = frame["request_id"].as_str().unwrap().to_string();
        assert!(request_id.starts_with("req_1_"));

        h.cli
            .emit(json!({"type": "control_response", "response": {"subtype": "success", "request_id": request_id}}))
            .await;
        assert!(h.cli.no_frame_within(Duration::from_millis(200)).await);
        assert!(h.loops.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_interrupt_round_trip() {
        let mut h = harness().await;
        let agent = h.agent.clone();
        let call = tokio::spawn(async move { agent.interrupt().await });

        let frame = h.cli.next_frame().await;
        let request_id = frame["request_id"].as_str().unwrap().to_string();
        h.cli
            .emit(json!({"type": "control_response", "response": {"subtype": "error", "request_id": request_id, "error": "no turn"}}))
            .await;
        assert!(matches!(
            call.await.unwrap(),
            Err(AgentError::ControlFailed(msg)) if msg == "no turn"
        ));
    }

    #[tokio::test]
    async fn test_unsupported_control_request_gets_error() {
        let mut h = harness().await;
        h.cli
            .emit(json!({"type": "control_request", "request_id": "x1", "request": {"subtype": "hook_callback"}}))
            .await;
        let frame = h.cli.next_frame().await;
        assert_eq!(frame["response"]["subtype"], "error");
        assert_eq!(frame["response"]["request_id"], "x1");
    }

    #[tokio::test]
    async fn test_process_exit_reports_error() {
        let mut h = harness().await;
        h.cli.can_use_tool("r1", "Bash", json!({"command": "kill -9 1"})).await;
        h.approval().await;

        h.cli.stdout.shutdown().await.unwrap();
        let event = h.event().await;
        assert_eq!(event.kind, OutputKind::Error);
        assert!(!h.agent.is_alive());
        assert!(h.agent.list_pending().is_empty());
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let h = harness().await;
        let (a, _b) = tokio::io::duplex(64);
        let (c, _d) = tokio::io::duplex(64);
        h.agent
            .start_with_io(AgentCallbacks::new(|_| {}), a, c)
            .await;
        assert!(h.agent.is_alive());
        h.agent.start(AgentCallbacks::new(|_| {}), StartOptions::default()).await;
        assert!(h.agent.is_alive());
    }
}
