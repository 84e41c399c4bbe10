use serde::{Deserialize, Serialize};

use crate::model::ModelError;

/// Failure class carried by every result object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ModelInvocation,
    ToolExecution,
    ToolSchema,
    MaxIterationsExceeded,
    WorkflowCeilingExceeded,
    TaskTimeout,
    NoMatchingAgent,
    NoConsensus,
    Configuration,
    AgentNotFound,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::ModelInvocation => "model_invocation",
            ErrorKind::ToolExecution => "tool_execution",
            ErrorKind::ToolSchema => "tool_schema",
            ErrorKind::MaxIterationsExceeded => "max_iterations_exceeded",
            ErrorKind::WorkflowCeilingExceeded => "workflow_ceiling_exceeded",
            ErrorKind::TaskTimeout => "task_timeout",
            ErrorKind::NoMatchingAgent => "no_matching_agent",
            ErrorKind::NoConsensus => "no_consensus",
            ErrorKind::Configuration => "configuration",
            ErrorKind::AgentNotFound => "agent_not_found",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    ModelInvocation(#[from] ModelError),

    #[error("tool '{tool}' failed: {reason}")]
    ToolExecution { tool: String, reason: String },

    #[error("invalid arguments for tool '{tool}': {reason}")]
    ToolSchema { tool: String, reason: String },

    #[error("max iterations exceeded")]
    MaxIterationsExceeded,

    #[error("workflow step ceiling of {0} exceeded")]
    WorkflowCeilingExceeded(usize),

    #[error("task timed out after {0}ms")]
    TaskTimeout(u128),

    #[error("no agent matches capability '{0}'")]
    NoMatchingAgent(String),

    #[error("no consensus: {0}")]
    NoConsensus(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("node '{node_id}' failed: {message}")]
    NodeFailed {
        node_id: String,
        kind: ErrorKind,
        message: String,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::ModelInvocation(_) => ErrorKind::ModelInvocation,
            AgentError::ToolExecution { .. } => ErrorKind::ToolExecution,
            AgentError::ToolSchema { .. } => ErrorKind::ToolSchema,
            AgentError::MaxIterationsExceeded => ErrorKind::MaxIterationsExceeded,
            AgentError::WorkflowCeilingExceeded(_) => ErrorKind::WorkflowCeilingExceeded,
            AgentError::TaskTimeout(_) => ErrorKind::TaskTimeout,
            AgentError::NoMatchingAgent(_) => ErrorKind::NoMatchingAgent,
            AgentError::NoConsensus(_) => ErrorKind::NoConsensus,
            AgentError::Configuration(_) => ErrorKind::Configuration,
            AgentError::AgentNotFound(_) => ErrorKind::AgentNotFound,
            AgentError::NodeFailed { kind, .. } => *kind,
            AgentError::Internal(_) => ErrorKind::Internal,
        }
    }
}
