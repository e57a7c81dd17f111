//! Per-session state shared by a backend's tasks
//!
//! Everything mutable about one session lives here, so sessions never share
//! state and can be torn down independently.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use super::gate::ApprovalGate;
use super::identity::SessionIdentity;
use super::loop_detector::LoopDetector;
use super::permission::PermissionMode;
use crate::permissions::ApprovalPolicy;
use crate::types::BackendKind;

#[derive(Debug)]
pub struct SessionState {
    kind: BackendKind,
    cwd: PathBuf,
    permission_mode: PermissionMode,
    alive: AtomicBool,
    identity: RwLock<SessionIdentity>,
    loop_detector: Mutex<LoopDetector>,
    gate: ApprovalGate,
}

impl SessionState {
    pub fn new(
        kind: BackendKind,
        cwd: impl Into<PathBuf>,
        permission_mode: PermissionMode,
        policy: Arc<ApprovalPolicy>,
        loop_threshold: u32,
    ) -> Self {
        Self {
            kind,
            cwd: cwd.into(),
            permission_mode,
            alive: AtomicBool::new(false),
            identity: RwLock::new(SessionIdentity::new()),
            loop_detector: Mutex::new(LoopDetector::new(loop_threshold)),
            gate: ApprovalGate::new(policy),
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn permission_mode(&self) -> PermissionMode {
        self.permission_mode
    }

    pub fn gate(&self) -> &ApprovalGate {
        &self.gate
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Returns the previous value
    pub fn set_alive(&self, alive: bool) -> bool {
        self.alive.swap(alive, Ordering::SeqCst)
    }

    pub fn session_id(&self) -> Option<String> {
        self.read_identity().session_id().map(String::from)
    }

    /// Snapshot of the identity
    pub fn identity(&self) -> SessionIdentity {
        self.read_identity().clone()
    }

    pub fn update_identity<R>(&self, f: impl FnOnce(&mut SessionIdentity) -> R) -> R {
        let mut identity = self
            .identity
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut identity)
    }

    fn read_identity(&self) -> std::sync::RwLockReadGuard<'_, SessionIdentity> {
        self.identity
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn detector(&self) -> std::sync::MutexGuard<'_, LoopDetector> {
        self.loop_detector
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Feed one tool outcome to the loop detector. Returns the failure count
    /// when the threshold is reached.
    pub fn record_tool_outcome(&self, all_errors: bool) -> Option<u32> {
        self.detector().record(all_errors)
    }

    pub fn reset_failures(&self) {
        self.detector().reset();
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.detector().consecutive()
    }

    /// Turn finished: failure counter and approve-all flag start over
    pub fn end_turn(&self) {
        self.reset_failures();
        self.gate.end_turn();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::gate::GateVerdict;
    use super::super::identity::ExtractedIds;
    use serde_json::json;

    fn state() -> SessionState {
        SessionState::new(
            BackendKind::Codex,
            "/work",
            PermissionMode::Default,
            Arc::new(ApprovalPolicy::default()),
            2,
        )
    }

    #[test]
    fn test_alive_flag() {
        let state = state();
        assert!(!state.is_alive());
        assert!(!state.set_alive(true));
        assert!(state.is_alive());
        assert!(state.set_alive(false));
    }

    #[test]
    fn test_identity_updates() {
        let state = state();
        assert_eq!(state.session_id(), None);
        state.update_identity(|id| {
            id.observe(ExtractedIds {
                session_id: Some("s1".into()),
                conversation_id: None,
            })
        });
        assert_eq!(state.session_id().as_deref(), Some("s1"));
    }

    #[test]
    fn test_end_turn_resets_failures_and_approve_all() {
        let state = state();
        state.record_tool_outcome(true);
        state.gate().approve_all();
        assert!(state.gate().auto_approve_all());
        state.end_turn();
        assert!(!state.gate().auto_approve_all());
        assert!(matches!(
            state.gate().submit("r1", "Bash", json!({"command": "rm -rf build"})),
            GateVerdict::Parked(_)
        ));
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.record_tool_outcome(true), None);
        assert_eq!(state.record_tool_outcome(true), Some(2));
    }
}
