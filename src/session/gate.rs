//! Approval gate
//!
//! Front door for every approval request an agent subprocess makes:
//! policy first, then the session's approve-all flag, then park and wait
//! for the caller.

use std::sync::Arc;

use serde_json::Value;

use super::pending::{ParkResult, PendingRegistry, PendingTicket};
use crate::permissions::{ApprovalPolicy, PolicyVerdict};
use crate::types::{ApprovalDecision, PendingApproval};

/// What happened to a submitted request
#[derive(Debug)]
pub enum GateVerdict {
    /// Decided without involving the caller
    Resolved(ApprovalDecision),
    /// Waiting for the caller
    Parked(PendingTicket),
    /// Identifier already in use or retired; answer with a protocol error
    Rejected,
}

#[derive(Debug)]
pub struct ApprovalGate {
    policy: Arc<ApprovalPolicy>,
    registry: PendingRegistry,
}

impl ApprovalGate {
    pub fn new(policy: Arc<ApprovalPolicy>) -> Self {
        Self {
            policy,
            registry: PendingRegistry::new(),
        }
    }

    pub fn submit(&self, request_id: &str, action: &str, input: Value) -> GateVerdict {
        if self.registry.is_reserved(request_id) {
            tracing::warn!(request_id, action, "Rejected reused approval request id");
            return GateVerdict::Rejected;
        }
        let verdict = self.policy.classify(action, &input);
        if verdict == PolicyVerdict::AutoApprove {
            tracing::debug!(request_id, action, "Auto-approved by policy");
            return GateVerdict::Resolved(ApprovalDecision::allow());
        }

        let interactive = verdict == PolicyVerdict::Question;
        match self.registry.park(request_id, action, input, interactive) {
            ParkResult::AutoApproved => {
                tracing::debug!(request_id, action, "Auto-approved by approve-all");
                GateVerdict::Resolved(ApprovalDecision::allow())
            }
            ParkResult::Parked(ticket) => {
                tracing::info!(request_id, action, verdict = ?verdict, "Approval request parked");
                GateVerdict::Parked(ticket)
            }
            ParkResult::Rejected => {
                tracing::warn!(request_id, action, "Rejected reused approval request id");
                GateVerdict::Rejected
            }
        }
    }

    pub fn approve(&self, request_id: &str, updated_input: Option<Value>) -> bool {
        self.registry
            .resolve(request_id, ApprovalDecision::Allow { updated_input })
    }

    pub fn deny(&self, request_id: &str, reason: Option<String>) -> bool {
        self.registry
            .resolve(request_id, ApprovalDecision::deny(reason))
    }

    pub fn approve_all(&self) -> usize {
        self.registry.approve_all()
    }

    pub fn deny_all(&self, reason: Option<String>) -> usize {
        self.registry.deny_all(reason)
    }

    /// Approve-all is on for the current turn
    pub fn auto_approve_all(&self) -> bool {
        self.registry.auto_approve_all()
    }

    pub fn cancel(&self, request_id: &str) -> bool {
        self.registry.cancel(request_id)
    }

    pub fn cancel_all(&self) -> usize {
        self.registry.cancel_all()
    }

    pub fn end_turn(&self) {
        self.registry.end_turn();
    }

    pub fn list_pending(&self) -> Vec<PendingApproval> {
        self.registry.list()
    }

    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApprovalOutcome;
    use serde_json::json;

    fn gate() -> ApprovalGate {
        ApprovalGate::new(Arc::new(ApprovalPolicy::default()))
    }

    #[test]
    fn test_policy_safe_action_resolves_immediately() {
        let gate = gate();
        let verdict = gate.submit("r1", "Read", json!({"file_path": "/tmp/a"}));
        assert!(matches!(verdict, GateVerdict::Resolved(d) if d.is_allow()));
        assert_eq!(gate.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unsafe_action_parks_until_decided() {
        let gate = gate();
        let GateVerdict::Parked(ticket) = gate.submit("r1", "Bash", json!({"command": "rm -rf x"}))
        else {
            panic!("expected parked");
        };
        assert_eq!(gate.list_pending()[0].request_id, "r1");
        assert!(gate.deny("r1", Some("no".into())));
        assert_eq!(
            ticket.wait().await,
            ApprovalOutcome::Decided(ApprovalDecision::Deny { reason: "no".into() })
        );
    }

    #[test]
    fn test_approve_all_window() {
        let gate = gate();
        gate.approve_all();
        assert!(matches!(
            gate.submit("r1", "Bash", json!({"command": "sudo reboot"})),
            GateVerdict::Resolved(_)
        ));
        assert!(matches!(
            gate.submit("r2", "AskUserQuestion", json!({"questions": ["?"]})),
            GateVerdict::Parked(_)
        ));
        gate.end_turn();
        assert!(matches!(
            gate.submit("r3", "Bash", json!({"command": "sudo reboot"})),
            GateVerdict::Parked(_)
        ));
    }

    #[test]
    fn test_cancelled_id_is_never_reused() {
        let gate = gate();
        let parked = gate.submit("r1", "Bash", json!({"command": "rm -rf build"}));
        assert!(matches!(parked, GateVerdict::Parked(_)));
        assert!(gate.cancel("r1"));

        gate.approve_all();
        assert!(matches!(
            gate.submit("r1", "Bash", json!({"command": "rm -rf build"})),
            GateVerdict::Rejected
        ));
        assert!(matches!(
            gate.submit("r1", "Read", json!({"file_path": "/tmp/a"})),
            GateVerdict::Rejected
        ));
        assert_eq!(gate.pending_count(), 0);
    }
}
