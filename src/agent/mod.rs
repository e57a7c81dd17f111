//! Unified agent contract
//!
//! Callers drive every backend through [`Agent`]; backend differences stay
//! behind it.

mod runner;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::claude::ClaudeAgent;
use crate::codex::CodexAgent;
use crate::types::{
    BackendKind, Content, LoopDetected, OutputEvent, PendingApproval, Result, SupervisorConfig,
};

pub use runner::{run_with_cli, shutdown_otel};

pub type OutputCallback = Arc<dyn Fn(OutputEvent) + Send + Sync>;
pub type ApprovalCallback = Arc<dyn Fn(PendingApproval) + Send + Sync>;
pub type LoopCallback = Arc<dyn Fn(LoopDetected) + Send + Sync>;

/// Callbacks registered on `start`
///
/// They are invoked from the session's consumer task in protocol order and
/// must return quickly.
#[derive(Clone)]
pub struct AgentCallbacks {
    pub on_output: OutputCallback,
    pub on_approval_request: Option<ApprovalCallback>,
    pub on_loop_detected: Option<LoopCallback>,
}

impl AgentCallbacks {
    pub fn new(on_output: impl Fn(OutputEvent) + Send + Sync + 'static) -> Self {
        Self {
            on_output: Arc::new(on_output),
            on_approval_request: None,
            on_loop_detected: None,
        }
    }

    pub fn with_approval(mut self, f: impl Fn(PendingApproval) + Send + Sync + 'static) -> Self {
        self.on_approval_request = Some(Arc::new(f));
        self
    }

    pub fn with_loop_detected(mut self, f: impl Fn(LoopDetected) + Send + Sync + 'static) -> Self {
        self.on_loop_detected = Some(Arc::new(f));
        self
    }

    pub(crate) fn output(&self, event: OutputEvent) {
        (self.on_output)(event);
    }

    pub(crate) fn approval_requested(&self, request: PendingApproval) {
        if let Some(cb) = &self.on_approval_request {
            cb(request);
        }
    }

    pub(crate) fn loop_detected(&self, notice: LoopDetected) {
        if let Some(cb) = &self.on_loop_detected {
            cb(notice);
        }
    }
}

impl fmt::Debug for AgentCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentCallbacks")
            .field("on_approval_request", &self.on_approval_request.is_some())
            .field("on_loop_detected", &self.on_loop_detected.is_some())
            .finish_non_exhaustive()
    }
}

/// Conversation to pick up on start
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// Continue the most recent conversation in the working directory
    pub continue_last: bool,
    /// Resume a specific prior conversation
    pub resume_id: Option<String>,
}

impl StartOptions {
    pub fn resume(id: impl Into<String>) -> Self {
        Self {
            continue_last: false,
            resume_id: Some(id.into()),
        }
    }

    pub fn continue_last() -> Self {
        Self {
            continue_last: true,
            resume_id: None,
        }
    }
}

/// One supervised agent session
#[async_trait]
pub trait Agent: Send + Sync + fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// Spawn the backend and begin connecting without waiting for its
    /// handshake. A second call while running is a no-op. Failures are
    /// reported through an error output event.
    async fn start(&self, callbacks: AgentCallbacks, options: StartOptions);

    /// Wait until a started session can take messages. Errors if starting
    /// failed or the session is gone.
    async fn wait_ready(&self) -> Result<()>;

    /// Send one user message. Fails if the session is not alive.
    async fn send(&self, content: Content) -> Result<()>;

    /// Allow one pending request. Returns false if nothing matched.
    fn approve(&self, request_id: &str, updated_input: Option<Value>) -> bool;

    /// Deny one pending request. Returns false if nothing matched.
    fn deny(&self, request_id: &str, reason: Option<String>) -> bool;

    /// Allow everything pending (except questions) and keep allowing until
    /// the turn ends
    fn approve_all(&self) -> usize;

    fn deny_all(&self, reason: Option<String>) -> usize;

    fn list_pending(&self) -> Vec<PendingApproval>;

    /// Abort the current turn, keeping the session
    async fn interrupt(&self) -> Result<()>;

    fn is_alive(&self) -> bool;

    fn current_session_id(&self) -> Option<String>;

    /// Tear down: abort the turn, cancel pending requests, stop the process.
    /// Idempotent.
    async fn kill(&self);
}

/// Build an agent for `kind`
pub fn create_agent(kind: BackendKind, config: &SupervisorConfig) -> Result<Arc<dyn Agent>> {
    let policy = Arc::new(config.approval_policy()?);
    let agent: Arc<dyn Agent> = match kind {
        BackendKind::Claude => Arc::new(ClaudeAgent::new(config, policy)),
        BackendKind::Codex => Arc::new(CodexAgent::new(config, policy)),
    };
    Ok(agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentError;
    use std::sync::Mutex;

    #[test]
    fn test_callbacks_optional_hooks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callbacks = AgentCallbacks::new(move |e| sink.lock().unwrap().push(e));

        callbacks.output(OutputEvent::text("hi"));
        callbacks.loop_detected(LoopDetected {
            consecutive_failures: 20,
            session_id: None,
        });
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(format!("{callbacks:?}").contains("on_loop_detected: false"));
    }

    #[test]
    fn test_create_agent_per_kind() {
        let config = SupervisorConfig::new(std::env::temp_dir());
        let claude = create_agent(BackendKind::Claude, &config).unwrap();
        let codex = create_agent(BackendKind::Codex, &config).unwrap();
        assert_eq!(claude.kind(), BackendKind::Claude);
        assert_eq!(codex.kind(), BackendKind::Codex);
        assert!(!claude.is_alive());
        assert!(codex.list_pending().is_empty());
    }

    #[tokio::test]
    async fn test_unstarted_agents_are_not_ready() {
        let config = SupervisorConfig::new(std::env::temp_dir());
        for kind in [BackendKind::Claude, BackendKind::Codex] {
            let agent = create_agent(kind, &config).unwrap();
            assert!(matches!(agent.wait_ready().await, Err(AgentError::NotAlive)));
        }
    }

    #[test]
    fn test_create_agent_rejects_bad_policy() {
        let mut config = SupervisorConfig::new(std::env::temp_dir());
        config.policy.safe_actions.push("[".into());
        assert!(create_agent(BackendKind::Claude, &config).is_err());
    }
}
