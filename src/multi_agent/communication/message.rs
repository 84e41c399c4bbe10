use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    agent::execution::{ExecutionResult, ToolCallRecord},
    error::ErrorKind,
};

/// Capability-addressed task sent to one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_id: String,
    pub source_agent_id: String,
    pub target_agent_id: String,
    pub capability: String,
    pub input: Value,
    pub timestamp: DateTime<Utc>,
    /// None means the sender waits indefinitely.
    pub deadline: Option<DateTime<Utc>>,
}

impl TaskMessage {
    pub fn new(
        source_agent_id: &str,
        target_agent_id: &str,
        capability: &str,
        input: Value,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            source_agent_id: source_agent_id.to_string(),
            target_agent_id: target_agent_id.to_string(),
            capability: capability.to_string(),
            input,
            timestamp: Utc::now(),
            deadline: None,
        }
    }

    pub fn with_task_id(mut self, task_id: &str) -> Self {
        self.task_id = task_id.to_string();
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn is_expired(&self) -> bool {
        if let Some(deadline) = self.deadline {
            Utc::now() > deadline
        } else {
            false
        }
    }
}

/// Reply correlated to a [`TaskMessage`] by `task_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task_id: String,
    pub agent_id: String,
    pub success: bool,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default)]
    pub iterations: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
    /// Time the target spent on the task.
    #[serde(default)]
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl TaskResponse {
    pub fn from_result(message: &TaskMessage, result: ExecutionResult) -> Self {
        Self {
            task_id: message.task_id.clone(),
            agent_id: message.target_agent_id.clone(),
            success: result.is_success(),
            error: result.error_message().map(str::to_string),
            error_kind: result.error_kind(),
            iterations: result.iterations(),
            tool_calls: result.tool_calls().to_vec(),
            execution_time_ms: result
                .metadata()
                .get("elapsed_ms")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            output: result.into_output(),
            timestamp: Utc::now(),
        }
    }

    pub fn failure(message: &TaskMessage, kind: ErrorKind, error: impl Into<String>) -> Self {
        Self::from_result(message, ExecutionResult::error(kind, error))
    }

    pub fn into_result(self) -> ExecutionResult {
        let result = if self.success {
            ExecutionResult::success(self.output, self.iterations, self.tool_calls)
        } else {
            ExecutionResult::failure(
                self.error_kind.unwrap_or(ErrorKind::Internal),
                self.error.unwrap_or_default(),
                self.output,
                self.iterations,
                self.tool_calls,
            )
        };
        result
            .with_metadata("task_id", Value::String(self.task_id))
            .with_metadata("agent_id", Value::String(self.agent_id))
            .with_metadata("elapsed_ms", Value::from(self.execution_time_ms))
    }
}
