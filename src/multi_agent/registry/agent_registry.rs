use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    agent::{
        core::AgentBehavior,
        types::{AgentCapability, AgentStatus},
    },
    error::{AgentError, Error, Result},
};

/// Registry view of an agent: identity, capabilities and liveness only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub capabilities: Vec<AgentCapability>,
    pub status: AgentStatus,
    /// Position in first-registration order; kept across re-registration.
    pub registration_seq: u64,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl AgentRecord {
    pub fn new(id: &str, name: &str, capabilities: Vec<AgentCapability>) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            capabilities,
            status: AgentStatus::Active,
            registration_seq: 0,
            registered_at: now,
            last_heartbeat: now,
            metadata: serde_json::json!({}),
        }
    }

    pub fn from_agent(agent: &dyn AgentBehavior) -> Self {
        Self::new(
            agent.get_id(),
            agent.get_name(),
            agent.get_capabilities().to_vec(),
        )
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn update_heartbeat(&mut self) {
        self.last_heartbeat = Utc::now();
    }

    pub fn is_fresh(&self, window: Duration) -> bool {
        let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
        Utc::now() - self.last_heartbeat <= window
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.name == name)
    }

    /// True when the capability set is a superset of `required`.
    pub fn has_capabilities<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required.iter().all(|r| self.has_capability(r.as_ref()))
    }

    pub fn capability(&self, name: &str) -> Option<&AgentCapability> {
        self.capabilities.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Heartbeats older than this make an agent unavailable.
    pub staleness_window: Duration,
    pub sweep_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            staleness_window: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Tracks live agents; holds records, never the agents themselves.
pub struct AgentRegistry {
    agents: DashMap<String, AgentRecord>,
    sequence: AtomicU64,
    config: RegistryConfig,
}

impl AgentRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            agents: DashMap::new(),
            sequence: AtomicU64::new(0),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Registers or refreshes an agent. Re-registration keeps the original
    /// registration order and replaces the capability list.
    pub fn register(&self, mut record: AgentRecord) -> Result<()> {
        let mut seen = HashSet::new();
        if let Some(dup) = record
            .capabilities
            .iter()
            .find(|c| !seen.insert(c.name.as_str()))
        {
            return Err(Error::AgentError(AgentError::Configuration(format!(
                "agent {} declares capability '{}' more than once",
                record.id, dup.name
            ))));
        }

        let agent_id = record.id.clone();
        match self.agents.entry(agent_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get_mut();
                existing.name = record.name;
                existing.capabilities = record.capabilities;
                existing.status = record.status;
                existing.metadata = record.metadata;
                existing.update_heartbeat();
                info!("Agent {} re-registered", agent_id);
            }
            Entry::Vacant(vacant) => {
                record.registration_seq = self.sequence.fetch_add(1, Ordering::SeqCst);
                record.update_heartbeat();
                vacant.insert(record);
                info!("Agent {} registered successfully", agent_id);
            }
        }
        Ok(())
    }

    /// Removes an agent; returns whether it was present.
    pub fn deregister(&self, agent_id: &str) -> bool {
        let removed = self.agents.remove(agent_id).is_some();
        if removed {
            info!("Agent {} deregistered", agent_id);
        }
        removed
    }

    pub fn heartbeat(&self, agent_id: &str) -> Result<()> {
        let mut agent = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| Error::AgentError(AgentError::AgentNotFound(agent_id.to_string())))?;
        agent.update_heartbeat();
        debug!("Heartbeat from agent {}", agent_id);
        Ok(())
    }

    pub fn update_status(&self, agent_id: &str, status: AgentStatus) -> Result<()> {
        let mut agent = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| Error::AgentError(AgentError::AgentNotFound(agent_id.to_string())))?;
        agent.status = status;
        Ok(())
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentRecord> {
        self.agents.get(agent_id).map(|a| a.value().clone())
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// All records in registration order.
    pub fn list(&self) -> Vec<AgentRecord> {
        let mut records: Vec<AgentRecord> =
            self.agents.iter().map(|a| a.value().clone()).collect();
        records.sort_by_key(|r| r.registration_seq);
        records
    }

    pub fn is_available(&self, record: &AgentRecord) -> bool {
        record.status != AgentStatus::Stopped && record.is_fresh(self.config.staleness_window)
    }

    /// Records eligible for discovery and delegation, in registration order.
    pub fn available(&self) -> Vec<AgentRecord> {
        self.list()
            .into_iter()
            .filter(|r| self.is_available(r))
            .collect()
    }

    /// Removes every agent whose heartbeat is older than the staleness window.
    pub fn sweep_stale(&self) -> Vec<String> {
        let window = self.config.staleness_window;
        let stale: Vec<String> = self
            .agents
            .iter()
            .filter(|a| !a.is_fresh(window))
            .map(|a| a.key().clone())
            .collect();

        stale
            .into_iter()
            .filter(|id| {
                self.agents
                    .remove_if(id, |_, record| !record.is_fresh(window))
                    .is_some()
            })
            .inspect(|id| warn!("Swept stale agent: {}", id))
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let records = self.list();
        let mut by_status = HashMap::new();
        for record in &records {
            *by_status.entry(record.status).or_insert(0) += 1;
        }
        let available = records.iter().filter(|r| self.is_available(r)).count();
        let stale = records
            .iter()
            .filter(|r| !r.is_fresh(self.config.staleness_window))
            .count();

        RegistryStats {
            total_agents: records.len(),
            available_agents: available,
            stale_agents: stale,
            agents_by_status: by_status,
        }
    }

    /// Opt-in periodic sweep.
    pub fn start_sweep_task(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // first tick fires immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                let swept = self.sweep_stale();
                if !swept.is_empty() {
                    info!("Swept {} stale agents", swept.len());
                }
            }
        })
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistryStats {
    pub total_agents: usize,
    pub available_agents: usize,
    pub stale_agents: usize,
    pub agents_by_status: HashMap<AgentStatus, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, caps: &[&str]) -> AgentRecord {
        AgentRecord::new(
            id,
            id,
            caps.iter()
                .map(|c| AgentCapability::new(c, "test capability"))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_agent_registration() {
        let registry = AgentRegistry::default();
        registry.register(record("test-agent", &["a"])).unwrap();

        let agent = registry.get("test-agent").unwrap();
        assert_eq!(agent.id, "test-agent");
        assert_eq!(agent.status, AgentStatus::Active);
    }

    #[tokio::test]
    async fn test_reregistration_is_idempotent() {
        let registry = AgentRegistry::default();
        registry.register(record("first", &["a"])).unwrap();
        registry.register(record("second", &["a"])).unwrap();
        registry.register(record("first", &["b", "c"])).unwrap();

        assert_eq!(registry.len(), 2);
        let first = registry.get("first").unwrap();
        assert!(first.has_capabilities(&["b", "c"]));
        assert!(!first.has_capability("a"));
        assert_eq!(registry.list()[0].id, "first");
    }

    #[tokio::test]
    async fn test_deregister_is_idempotent() {
        let registry = AgentRegistry::default();
        registry.register(record("gone", &[])).unwrap();
        assert!(registry.deregister("gone"));
        assert!(!registry.deregister("gone"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_capability_rejected() {
        let registry = AgentRegistry::default();
        let err = registry.register(record("dup", &["a", "a"])).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_stale_agents_unavailable_until_swept() {
        let registry = AgentRegistry::new(RegistryConfig {
            staleness_window: Duration::from_millis(30),
            sweep_interval: Duration::from_secs(60),
        });
        registry.register(record("old", &["a"])).unwrap();
        registry.register(record("live", &["a"])).unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        registry.heartbeat("live").unwrap();

        let available: Vec<String> = registry.available().into_iter().map(|r| r.id).collect();
        assert_eq!(available, vec!["live"]);
        assert_eq!(registry.len(), 2);

        let swept = registry.sweep_stale();
        assert_eq!(swept, vec!["old"]);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_stopped_agent_unavailable() {
        let registry = AgentRegistry::default();
        registry.register(record("a1", &["a"])).unwrap();
        registry.update_status("a1", AgentStatus::Stopped).unwrap();

        assert!(registry.available().is_empty());
        assert!(registry.heartbeat("missing").is_err());
    }
}
