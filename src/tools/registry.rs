use std::{collections::HashMap, future::Future, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::{
    error::{AgentError, Error, ErrorKind, Result},
    tools::ToolInfo,
};

/// An opaque callable with a declared schema.
#[async_trait]
pub trait Tool: Send + Sync {
    fn info(&self) -> &ToolInfo;

    async fn call(&self, arguments: Value) -> Result<Value>;
}

/// Outcome of a single tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success { output: Value },
    Failure { kind: ErrorKind, error: String },
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success { .. })
    }

    pub(crate) fn from_error(error: &Error) -> Self {
        ToolResult::Failure {
            kind: error.kind(),
            error: error.message(),
        }
    }
}

/// Adapter turning an async closure into a [`Tool`].
pub struct FnTool<F> {
    info: ToolInfo,
    func: F,
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    fn info(&self) -> &ToolInfo {
        &self.info
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        (self.func)(arguments).await
    }
}

pub fn tool_fn<F, Fut>(info: ToolInfo, func: F) -> FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    FnTool { info, func }
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    validator: jsonschema::Validator,
}

/// Closed mapping from tool name to schema and handler.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, compiling its schema. Re-registering a name replaces it.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let info = tool.info().clone();
        let schema = if info.params_schema.is_null() {
            json!({})
        } else {
            info.params_schema.clone()
        };
        let validator = jsonschema::draft202012::new(&schema).map_err(|e| {
            AgentError::Configuration(format!("invalid schema for tool '{}': {}", info.name, e))
        })?;

        if !self.tools.contains_key(&info.name) {
            self.order.push(info.name.clone());
        }
        self.tools
            .insert(info.name.clone(), RegisteredTool { tool, validator });

        info!("Tool {} registered", info.name);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|t| t.tool.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Schemas of the registered tools named in `allowed`, in registration order.
    pub fn schemas_for(&self, allowed: &[String]) -> Vec<ToolInfo> {
        self.order
            .iter()
            .filter(|name| allowed.contains(name))
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.tool.info().clone())
            .collect()
    }

    pub fn validate(&self, name: &str, arguments: &Value) -> Result<()> {
        let registered = self.tools.get(name).ok_or_else(|| AgentError::ToolExecution {
            tool: name.to_string(),
            reason: "tool not found in registry".into(),
        })?;

        let errors: Vec<String> = registered
            .validator
            .iter_errors(arguments)
            .map(|e| e.to_string())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::AgentError(AgentError::ToolSchema {
                tool: name.to_string(),
                reason: errors.join("; "),
            }))
        }
    }

    /// Looks up and validates a call, returning the handler ready for dispatch.
    pub fn prepare(&self, name: &str, arguments: &Value) -> Result<Arc<dyn Tool>> {
        self.validate(name, arguments)?;
        self.get(name).ok_or_else(|| {
            Error::AgentError(AgentError::ToolExecution {
                tool: name.to_string(),
                reason: "tool not found in registry".into(),
            })
        })
    }

    /// Validates then invokes a tool inline.
    pub async fn invoke(&self, name: &str, arguments: Value) -> ToolResult {
        let tool = match self.prepare(name, &arguments) {
            Ok(tool) => tool,
            Err(e) => return ToolResult::from_error(&e),
        };

        debug!("Invoking tool {}", name);
        match tool.call(arguments).await {
            Ok(output) => ToolResult::Success { output },
            Err(e) => ToolResult::Failure {
                kind: ErrorKind::ToolExecution,
                error: e.message(),
            },
        }
    }
}
