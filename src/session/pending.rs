//! Registry of approval requests waiting for a decision
//!
//! One registry per session. Every mutation goes through a single lock so
//! that `approve_all`/`deny_all` see the full pending set and so the
//! turn-scoped approve-all flag is checked and acted on atomically with
//! parking a new request.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::types::{ApprovalDecision, ApprovalOutcome, PendingApproval};

struct PendingEntry {
    info: PendingApproval,
    /// Question-type requests survive approve-all
    interactive: bool,
    responder: oneshot::Sender<ApprovalDecision>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<String, PendingEntry>,
    /// Identifiers cancelled by the subprocess; never accepted again
    retired: HashSet<String>,
    auto_approve_all: bool,
}

impl RegistryInner {
    fn is_reserved(&self, request_id: &str) -> bool {
        self.entries.contains_key(request_id) || self.retired.contains(request_id)
    }
}

/// Result of trying to park a request
#[derive(Debug)]
pub enum ParkResult {
    Parked(PendingTicket),
    /// Approve-all is active for this turn
    AutoApproved,
    /// The identifier is already pending or was retired
    Rejected,
}

/// Waiting side of a parked request
#[derive(Debug)]
pub struct PendingTicket {
    pub request: PendingApproval,
    decision: oneshot::Receiver<ApprovalDecision>,
    cancel: CancellationToken,
}

impl PendingTicket {
    /// Wait until the request is decided or cancelled
    pub async fn wait(self) -> ApprovalOutcome {
        let Self {
            mut decision,
            cancel,
            ..
        } = self;
        tokio::select! {
            biased;
            () = cancel.cancelled() => ApprovalOutcome::Cancelled,
            result = &mut decision => match result {
                Ok(decision) => ApprovalOutcome::Decided(decision),
                Err(_) => ApprovalOutcome::Cancelled,
            },
        }
    }
}

/// Per-session pending approval registry
#[derive(Default)]
pub struct PendingRegistry {
    inner: Mutex<RegistryInner>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Park a request, unless approve-all covers it
    pub fn park(
        &self,
        request_id: &str,
        action: &str,
        input: Value,
        interactive: bool,
    ) -> ParkResult {
        let mut inner = self.lock();
        if inner.is_reserved(request_id) {
            return ParkResult::Rejected;
        }
        if inner.auto_approve_all && !interactive {
            return ParkResult::AutoApproved;
        }

        let (tx, rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let info = PendingApproval {
            request_id: request_id.to_string(),
            action: action.to_string(),
            input,
            created_at: Utc::now(),
        };
        inner.entries.insert(
            request_id.to_string(),
            PendingEntry {
                info: info.clone(),
                interactive,
                responder: tx,
                cancel: cancel.clone(),
            },
        );
        ParkResult::Parked(PendingTicket {
            request: info,
            decision: rx,
            cancel,
        })
    }

    /// Whether `request_id` is pending or retired
    pub fn is_reserved(&self, request_id: &str) -> bool {
        self.lock().is_reserved(request_id)
    }

    /// Resolve one request. Returns false if nothing was pending under `request_id`.
    pub fn resolve(&self, request_id: &str, decision: ApprovalDecision) -> bool {
        let entry = self.lock().entries.remove(request_id);
        match entry {
            Some(entry) => {
                // Waiter gone means the session is tearing down; the entry is released either way.
                drop(entry.responder.send(decision));
                true
            }
            None => false,
        }
    }

    /// Allow every pending non-question request and turn on approve-all
    /// until [`end_turn`](Self::end_turn).
    pub fn approve_all(&self) -> usize {
        let mut inner = self.lock();
        inner.auto_approve_all = true;
        let ids: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| !e.interactive)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            if let Some(entry) = inner.entries.remove(id) {
                drop(entry.responder.send(ApprovalDecision::allow()));
            }
        }
        ids.len()
    }

    /// Deny every pending request. The approve-all flag is left alone.
    pub fn deny_all(&self, reason: Option<String>) -> usize {
        let drained: Vec<PendingEntry> = self.lock().entries.drain().map(|(_, e)| e).collect();
        let count = drained.len();
        for entry in drained {
            drop(entry.responder.send(ApprovalDecision::deny(reason.clone())));
        }
        count
    }

    /// Cancel one request on behalf of the subprocess. The identifier is
    /// retired. Returns false if it was not pending.
    pub fn cancel(&self, request_id: &str) -> bool {
        let mut inner = self.lock();
        inner.retired.insert(request_id.to_string());
        match inner.entries.remove(request_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel everything (session teardown). Returns the number cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut inner = self.lock();
        inner.auto_approve_all = false;
        let drained: Vec<PendingEntry> = inner.entries.drain().map(|(_, e)| e).collect();
        drop(inner);
        for entry in &drained {
            entry.cancel.cancel();
        }
        drained.len()
    }

    /// Clear the turn-scoped approve-all flag
    pub fn end_turn(&self) {
        self.lock().auto_approve_all = false;
    }

    pub fn auto_approve_all(&self) -> bool {
        self.lock().auto_approve_all
    }

    /// Snapshot of pending requests, oldest first
    pub fn list(&self) -> Vec<PendingApproval> {
        let mut list: Vec<PendingApproval> =
            self.lock().entries.values().map(|e| e.info.clone()).collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        list
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for PendingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("PendingRegistry")
            .field("pending", &inner.entries.len())
            .field("auto_approve_all", &inner.auto_approve_all)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn park(registry: &PendingRegistry, id: &str, interactive: bool) -> PendingTicket {
        match registry.park(id, "Bash", json!({"command": "ls"}), interactive) {
            ParkResult::Parked(ticket) => ticket,
            other => panic!("expected parked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let registry = PendingRegistry::new();
        let ticket = park(&registry, "r1", false);

        assert!(registry.resolve("r1", ApprovalDecision::allow()));
        assert!(!registry.resolve("r1", ApprovalDecision::deny(None)));
        assert_eq!(
            ticket.wait().await,
            ApprovalOutcome::Decided(ApprovalDecision::allow())
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let registry = PendingRegistry::new();
        let _ticket = park(&registry, "r1", false);
        assert!(matches!(
            registry.park("r1", "Bash", json!({"command": "ls"}), false),
            ParkResult::Rejected
        ));
    }

    #[tokio::test]
    async fn test_approve_all_skips_questions_and_sets_flag() {
        let registry = PendingRegistry::new();
        let bash = park(&registry, "r1", false);
        let _question = park(&registry, "r2", true);

        assert_eq!(registry.approve_all(), 1);
        assert!(registry.auto_approve_all());
        assert!(matches!(bash.wait().await, ApprovalOutcome::Decided(d) if d.is_allow()));
        assert_eq!(registry.list().len(), 1);

        // Later non-question requests in the same turn are auto-approved
        assert!(matches!(
            registry.park("r3", "Edit", json!({"file_path": "x"}), false),
            ParkResult::AutoApproved
        ));
        // Questions still park
        assert!(matches!(
            registry.park("r4", "AskUserQuestion", json!({"q": 1}), true),
            ParkResult::Parked(_)
        ));

        registry.end_turn();
        assert!(!registry.auto_approve_all());
        assert!(matches!(
            registry.park("r5", "Edit", json!({"file_path": "x"}), false),
            ParkResult::Parked(_)
        ));
    }

    #[tokio::test]
    async fn test_deny_all_keeps_flag() {
        let registry = PendingRegistry::new();
        let ticket = park(&registry, "r1", false);
        registry.approve_all();
        let question = park(&registry, "r2", true);
        assert_eq!(registry.deny_all(Some("stop".into())), 1);
        assert!(registry.auto_approve_all());
        assert_eq!(
            question.wait().await,
            ApprovalOutcome::Decided(ApprovalDecision::Deny {
                reason: "stop".into()
            })
        );
        drop(ticket);
    }

    #[tokio::test]
    async fn test_cancel_retires_identifier() {
        let registry = PendingRegistry::new();
        let ticket = park(&registry, "r1", false);
        assert!(registry.cancel("r1"));
        assert_eq!(ticket.wait().await, ApprovalOutcome::Cancelled);
        assert!(!registry.resolve("r1", ApprovalDecision::allow()));
        assert!(matches!(
            registry.park("r1", "Bash", json!({"command": "ls"}), false),
            ParkResult::Rejected
        ));
    }

    #[tokio::test]
    async fn test_reserved_ids_rejected_under_approve_all() {
        let registry = PendingRegistry::new();
        let _r1 = park(&registry, "r1", false);
        assert!(registry.cancel("r1"));
        let _r2 = park(&registry, "r2", true);
        registry.approve_all();

        assert!(registry.is_reserved("r1"));
        assert!(matches!(
            registry.park("r1", "Bash", json!({"command": "ls"}), false),
            ParkResult::Rejected
        ));
        assert!(matches!(
            registry.park("r2", "Bash", json!({"command": "ls"}), false),
            ParkResult::Rejected
        ));
        assert!(matches!(
            registry.park("r3", "Bash", json!({"command": "ls"}), false),
            ParkResult::AutoApproved
        ));
    }

    #[tokio::test]
    async fn test_cancel_all_releases_everything() {
        let registry = PendingRegistry::new();
        let tickets: Vec<_> = (0..5)
            .map(|i| park(&registry, &format!("r{i}"), i % 2 == 0))
            .collect();

        assert_eq!(registry.cancel_all(), 5);
        assert!(registry.is_empty());
        for ticket in tickets {
            assert_eq!(ticket.wait().await, ApprovalOutcome::Cancelled);
        }
    }

    #[test]
    fn test_list_is_snapshot() {
        let registry = PendingRegistry::new();
        let _a = park(&registry, "a", false);
        let _b = park(&registry, "b", false);
        let list = registry.list();
        assert_eq!(list.len(), 2);
        assert!(list.iter().any(|p| p.request_id == "a"));
        assert_eq!(list[0].action, "Bash");
    }
}
