//! Session manager for tracking live agents
//!
//! Uses DashMap for concurrent access with entry API to avoid deadlocks.

use std::sync::Arc;

use dashmap::DashMap;

use crate::agent::{Agent, create_agent};
use crate::types::{AgentError, BackendKind, Result, SupervisorConfig};

/// Live agents keyed by a caller-chosen session key (a chat id, for example)
#[derive(Debug, Default)]
pub struct SessionManager {
    agents: DashMap<String, Arc<dyn Agent>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
        }
    }

    /// Build an agent for `kind` and store it under `key`
    ///
    /// The agent is not started; call [`Agent::start`] on the result.
    pub fn create(
        &self,
        key: impl Into<String>,
        kind: BackendKind,
        config: &SupervisorConfig,
    ) -> Result<Arc<dyn Agent>> {
        let key = key.into();
        // Use entry API to atomically check and insert
        match self.agents.entry(key.clone()) {
            dashmap::Entry::Occupied(_) => Err(AgentError::SessionAlreadyExists(key)),
            dashmap::Entry::Vacant(vacant) => {
                let agent = create_agent(kind, config)?;
                vacant.insert(Arc::clone(&agent));
                tracing::info!(key = %key, kind = %kind, "Session created");
                Ok(agent)
            }
        }
    }

    /// Store an agent built elsewhere
    pub fn insert(&self, key: impl Into<String>, agent: Arc<dyn Agent>) -> Result<()> {
        let key = key.into();
        match self.agents.entry(key.clone()) {
            dashmap::Entry::Occupied(_) => Err(AgentError::SessionAlreadyExists(key)),
            dashmap::Entry::Vacant(vacant) => {
                vacant.insert(agent);
                Ok(())
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(key).map(|r| Arc::clone(&r))
    }

    /// Get an existing agent or return SessionNotFound error
    pub fn get_or_error(&self, key: &str) -> Result<Arc<dyn Agent>> {
        self.get(key)
            .ok_or_else(|| AgentError::session_not_found(key))
    }

    /// Remove and kill the agent under `key`. False if there was none.
    pub async fn remove(&self, key: &str) -> bool {
        // The map guard is released before awaiting the kill
        let Some((_, agent)) = self.agents.remove(key) else {
            return false;
        };
        agent.kill().await;
        tracing::info!(key, "Session removed");
        true
    }

    /// Kill every agent and empty the manager
    pub async fn kill_all(&self) -> usize {
        let keys = self.keys();
        let agents: Vec<Arc<dyn Agent>> = keys
            .iter()
            .filter_map(|key| self.agents.remove(key).map(|(_, agent)| agent))
            .collect();
        let count = agents.len();
        futures::future::join_all(agents.iter().map(|agent| agent.kill())).await;
        if count > 0 {
            tracing::info!(count, "All sessions killed");
        }
        count
    }

    pub fn contains(&self, key: &str) -> bool {
        self.agents.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.agents.iter().map(|r| r.key().clone()).collect()
    }
}
