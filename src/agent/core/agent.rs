use std::{collections::HashMap, sync::Arc, time::Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    agent::{
        core::base_agent::{AgentBehavior, BaseAgent, CapabilityHandler},
        execution::{ExecutionResult, Executor},
        memory::ConversationMemory,
        types::{AgentCapability, AgentConfig},
    },
    error::ErrorKind,
    model::ModelClient,
    tools::ToolRegistry,
};

/// Standard agent: a model configuration, a tool registry and optional
/// conversation memory around the Execution Loop.
pub struct LlmAgent {
    base: BaseAgent,
    config: AgentConfig,
    executor: Executor,
    tools: Arc<ToolRegistry>,
    memory: Option<Mutex<ConversationMemory>>,
    handlers: HashMap<String, Arc<dyn CapabilityHandler>>,
}

impl LlmAgent {
    pub fn new(config: AgentConfig, model: Arc<dyn ModelClient>, tools: Arc<ToolRegistry>) -> Self {
        let memory = config.enable_memory.then(|| {
            Mutex::new(ConversationMemory::with_system(
                config.memory_window,
                &config.system_prompt,
            ))
        });

        Self {
            base: BaseAgent::new(&config.name),
            config,
            executor: Executor::new(model),
            tools,
            memory,
            handlers: HashMap::new(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.base = self.base.with_id(id);
        self
    }

    pub fn with_capability(mut self, capability: AgentCapability) -> Self {
        self.base.add_capability(capability);
        self
    }

    /// Declares a capability served by `handler` instead of the model loop.
    pub fn with_capability_handler(
        mut self,
        capability: AgentCapability,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Self {
        self.handlers.insert(capability.name.clone(), handler);
        self.base.add_capability(capability);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub async fn reset_memory(&self) {
        if let Some(memory) = &self.memory {
            memory.lock().await.clear();
        }
    }

    pub async fn history_len(&self) -> usize {
        match &self.memory {
            Some(memory) => memory.lock().await.len(),
            None => 0,
        }
    }
}

#[async_trait]
impl AgentBehavior for LlmAgent {
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
        match &self.memory {
            Some(memory) => {
                // held for the whole run so concurrent calls do not interleave turns
                let mut memory = memory.lock().await;
                let mut history = memory.messages();
                let prior = history.len();
                let result = self
                    .executor
                    .run(&self.config, &self.tools, input, &mut history)
                    .await;
                memory.extend(history.into_iter().skip(prior));
                result
            }
            None => {
                let mut history = Vec::new();
                self.executor
                    .run(&self.config, &self.tools, input, &mut history)
                    .await
            }
        }
    }

    async fn handle_task(&self, capability: &str, input: Value) -> ExecutionResult {
        if let Some(handler) = self.handlers.get(capability) {
            debug!("Agent {} handling {} with custom handler", self.base.id, capability);
            let started = Instant::now();
            let result = match handler.handle(input).await {
                Ok(output) => ExecutionResult::success(output, 0, Vec::new()),
                Err(e) => ExecutionResult::error(e.kind(), e.message()),
            };
            return result.with_metadata(
                "elapsed_ms",
                Value::from(started.elapsed().as_millis() as u64),
            );
        }

        if !self.has_capability(capability) {
            return ExecutionResult::error(
                ErrorKind::Configuration,
                format!(
                    "agent {} does not declare capability '{}'",
                    self.base.id, capability
                ),
            );
        }

        info!("Agent {} serving {} through the model loop", self.base.id, capability);
        self.execute(&crate::agent::core::base_agent::render_task_prompt(
            capability, &input,
        ))
        .await
    }
}
