use std::{
    sync::{Arc, Weak},
    time::Instant,
};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::{
    agent::core::AgentBehavior,
    error::{AgentError, Error, ErrorKind, Result},
    multi_agent::communication::message::{TaskMessage, TaskResponse},
};

/// Carries a task to its target agent and returns the reply.
///
/// An `Err` means the message could not be delivered; a delivered task that
/// failed comes back as an unsuccessful [`TaskResponse`].
#[async_trait]
pub trait TaskTransport: Send + Sync {
    async fn send(&self, message: TaskMessage) -> Result<TaskResponse>;
}

/// Same-process transport. Holds weak references only, so an agent dropped
/// by its owner becomes unreachable without any detach call.
#[derive(Default)]
pub struct InProcessTransport {
    agents: DashMap<String, Weak<dyn AgentBehavior>>,
}

impl InProcessTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, agent: &Arc<dyn AgentBehavior>) {
        let agent_id = agent.get_id().to_string();
        self.agents.insert(agent_id.clone(), Arc::downgrade(agent));
        debug!("Agent {} attached to transport", agent_id);
    }

    pub fn detach(&self, agent_id: &str) -> bool {
        self.agents.remove(agent_id).is_some()
    }

    pub fn is_reachable(&self, agent_id: &str) -> bool {
        self.agents
            .get(agent_id)
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    fn resolve(&self, agent_id: &str) -> Option<Arc<dyn AgentBehavior>> {
        self.agents.get(agent_id).and_then(|weak| weak.upgrade())
    }
}

#[async_trait]
impl TaskTransport for InProcessTransport {
    async fn send(&self, message: TaskMessage) -> Result<TaskResponse> {
        let agent = self.resolve(&message.target_agent_id).ok_or_else(|| {
            Error::AgentError(AgentError::AgentNotFound(message.target_agent_id.clone()))
        })?;

        if message.is_expired() {
            warn!("Task {} arrived after its deadline", message.task_id);
            return Ok(TaskResponse::failure(
                &message,
                ErrorKind::TaskTimeout,
                "task deadline passed before delivery",
            ));
        }

        let started = Instant::now();
        let result = agent
            .handle_task(&message.capability, message.input.clone())
            .await;
        let mut response = TaskResponse::from_result(&message, result);
        response.execution_time_ms = started.elapsed().as_millis() as u64;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        agent::{core::BaseAgent, execution::ExecutionResult, types::AgentCapability},
        error::ErrorKind,
    };
    use serde_json::{Value, json};

    struct Echo {
        base: BaseAgent,
    }

    #[async_trait]
    impl AgentBehavior for Echo {
        fn get_id(&self) -> &str {
            &self.base.id
        }

        fn get_name(&self) -> &str {
            &self.base.name
        }

        fn get_capabilities(&self) -> &[AgentCapability] {
            self.base.capabilities()
        }

        async fn execute(&self, input: &str) -> ExecutionResult {
            ExecutionResult::success(Value::String(input.to_string()), 1, Vec::new())
        }

        async fn handle_task(&self, _capability: &str, input: Value) -> ExecutionResult {
            ExecutionResult::success(input, 1, Vec::new())
        }
    }

    #[tokio::test]
    async fn test_send_to_attached_agent() {
        let transport = InProcessTransport::new();
        let agent: Arc<dyn AgentBehavior> = Arc::new(Echo {
            base: BaseAgent::new("echo").with_id("echo-1"),
        });
        transport.attach(&agent);

        let response = transport
            .send(TaskMessage::new("caller", "echo-1", "echo", json!({"x": 1})))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.output, json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_dropped_agent_is_unreachable() {
        let transport = InProcessTransport::new();
        let agent: Arc<dyn AgentBehavior> = Arc::new(Echo {
            base: BaseAgent::new("echo").with_id("echo-2"),
        });
        transport.attach(&agent);
        drop(agent);

        assert!(!transport.is_reachable("echo-2"));
        let err = transport
            .send(TaskMessage::new("caller", "echo-2", "echo", json!(null)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AgentNotFound);
    }
}
