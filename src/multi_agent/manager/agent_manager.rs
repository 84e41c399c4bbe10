use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    sync::{RwLock, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    agent::{core::AgentBehavior, types::AgentStatus},
    error::{AgentError, Error, Result},
    multi_agent::{
        communication::InProcessTransport,
        registry::{AgentRecord, AgentRegistry},
    },
};

/// Agent runtime information
struct AgentRuntime {
    agent: Arc<dyn AgentBehavior>,
    heartbeat_handle: JoinHandle<()>,
    shutdown_tx: oneshot::Sender<()>,
}

/// Hosts agents created in this process: owns them, keeps their registry
/// records alive and makes them reachable through the in-process transport.
pub struct AgentManager {
    agents: Arc<RwLock<HashMap<String, AgentRuntime>>>,
    registry: Arc<AgentRegistry>,
    transport: Arc<InProcessTransport>,
    heartbeat_interval: Duration,
}

impl AgentManager {
    pub fn new(
        registry: Arc<AgentRegistry>,
        transport: Arc<InProcessTransport>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
            registry,
            transport,
            heartbeat_interval,
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<InProcessTransport> {
        &self.transport
    }

    /// Start Agent
    pub async fn spawn_agent(&self, agent: Arc<dyn AgentBehavior>) -> Result<String> {
        let agent_id = agent.get_id().to_string();

        if self.agents.read().await.contains_key(&agent_id) {
            return Err(Error::AgentError(AgentError::Configuration(format!(
                "agent {} is already running",
                agent_id
            ))));
        }

        let record = AgentRecord::from_agent(agent.as_ref()).with_status(AgentStatus::Starting);
        self.registry.register(record)?;
        self.transport.attach(&agent);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let heartbeat_handle = Self::heartbeat_loop(
            agent_id.clone(),
            self.registry.clone(),
            self.heartbeat_interval,
            shutdown_rx,
        );

        self.registry.update_status(&agent_id, AgentStatus::Active)?;

        self.agents.write().await.insert(
            agent_id.clone(),
            AgentRuntime {
                agent,
                heartbeat_handle,
                shutdown_tx,
            },
        );

        info!("Agent {} spawned successfully", agent_id);
        Ok(agent_id)
    }

    fn heartbeat_loop(
        agent_id: String,
        registry: Arc<AgentRegistry>,
        period: Duration,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        debug!("Heartbeat for agent {} stopped", agent_id);
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = registry.heartbeat(&agent_id) {
                            warn!("Heartbeat failed for agent {}: {}", agent_id, e);
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Stop Agent
    pub async fn stop_agent(&self, agent_id: &str) -> Result<()> {
        let runtime = self
            .agents
            .write()
            .await
            .remove(agent_id)
            .ok_or_else(|| Error::AgentError(AgentError::AgentNotFound(agent_id.to_string())))?;

        let _ = runtime.shutdown_tx.send(());
        if let Err(e) = runtime.heartbeat_handle.await {
            warn!("Heartbeat task for agent {} ended abnormally: {}", agent_id, e);
        }

        if let Err(e) = self.registry.update_status(agent_id, AgentStatus::Stopped) {
            debug!("Agent {} already left the registry: {}", agent_id, e);
        }
        self.transport.detach(agent_id);
        self.registry.deregister(agent_id);

        info!("Agent {} stopped", agent_id);
        Ok(())
    }

    /// Stop every hosted agent
    pub async fn shutdown_all(&self) -> Result<()> {
        info!("Shutting down all agents");

        let agent_ids: Vec<String> = self.agents.read().await.keys().cloned().collect();
        for agent_id in agent_ids {
            if let Err(e) = self.stop_agent(&agent_id).await {
                warn!("Failed to stop agent {}: {}", agent_id, e);
            }
        }

        info!("All agents shut down");
        Ok(())
    }

    pub async fn get_agent(&self, agent_id: &str) -> Option<Arc<dyn AgentBehavior>> {
        self.agents
            .read()
            .await
            .get(agent_id)
            .map(|runtime| runtime.agent.clone())
    }

    pub async fn agent_ids(&self) -> Vec<String> {
        self.agents.read().await.keys().cloned().collect()
    }

    pub async fn agent_count(&self) -> usize {
        self.agents.read().await.len()
    }
}
