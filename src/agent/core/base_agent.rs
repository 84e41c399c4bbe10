use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    agent::{execution::ExecutionResult, types::AgentCapability},
    error::{ErrorKind, Result},
};

/// Behaviour shared by every agent that can sit in a workflow, answer a
/// delegated task or join a collaboration.
#[async_trait]
pub trait AgentBehavior: Send + Sync {
    /// Unique identifier of the agent
    fn get_id(&self) -> &str;

    fn get_name(&self) -> &str;

    fn get_capabilities(&self) -> &[AgentCapability];

    /// Run the agent on a free-form input.
    async fn execute(&self, input: &str) -> ExecutionResult;

    /// Serve a capability-addressed task.
    ///
    /// The default renders the capability and payload into a prompt for
    /// [`AgentBehavior::execute`]; undeclared capabilities are refused.
    async fn handle_task(&self, capability: &str, input: Value) -> ExecutionResult {
        if !self.has_capability(capability) {
            return ExecutionResult::error(
                ErrorKind::Configuration,
                format!(
                    "agent {} does not declare capability '{}'",
                    self.get_id(),
                    capability
                ),
            );
        }
        self.execute(&render_task_prompt(capability, &input)).await
    }

    fn has_capability(&self, capability: &str) -> bool {
        self.get_capabilities().iter().any(|c| c.name == capability)
    }
}

pub fn render_task_prompt(capability: &str, input: &Value) -> String {
    format!("Capability: {}\nInput:\n{}", capability, input)
}

/// Handler serving one capability of an agent.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn handle(&self, input: Value) -> Result<Value>;
}

pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> CapabilityHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn handle(&self, input: Value) -> Result<Value> {
        (self.0)(input).await
    }
}

pub fn handler_fn<F, Fut>(func: F) -> Arc<dyn CapabilityHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler(func))
}

/// Identity and declared capabilities common to all agents.
#[derive(Debug, Clone)]
pub struct BaseAgent {
    pub id: String,
    pub name: String,
    capabilities: Vec<AgentCapability>,
}

impl BaseAgent {
    pub fn new(name: &str) -> Self {
        Self {
            id: Self::generate_id(name),
            name: name.to_string(),
            capabilities: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// Adds a capability; a capability with the same name is replaced.
    pub fn add_capability(&mut self, capability: AgentCapability) {
        match self
            .capabilities
            .iter_mut()
            .find(|c| c.name == capability.name)
        {
            Some(existing) => *existing = capability,
            None => self.capabilities.push(capability),
        }
    }

    pub fn capabilities(&self) -> &[AgentCapability] {
        &self.capabilities
    }

    /// Generate a new agent id
    pub fn generate_id(name: &str) -> String {
        format!("{}-{}", name, uuid::Uuid::new_v4().simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_names_stay_unique() {
        let mut base = BaseAgent::new("writer");
        base.add_capability(AgentCapability::new("draft", "first"));
        base.add_capability(AgentCapability::new("draft", "second"));
        base.add_capability(AgentCapability::new("edit", "edit text"));

        assert_eq!(base.capabilities().len(), 2);
        assert_eq!(base.capabilities()[0].description, "second");
        assert!(base.id.starts_with("writer-"));
    }
}
