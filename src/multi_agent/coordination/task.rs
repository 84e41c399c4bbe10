use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AgentError, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::TimedOut
        )
    }

    fn can_become(&self, next: TaskState) -> bool {
        match self {
            // resolution failures never reach Running
            TaskState::Pending => matches!(next, TaskState::Running | TaskState::Failed),
            TaskState::Running => next.is_terminal(),
            _ => false,
        }
    }
}

/// One delegation request and its lifecycle. Never reused once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub source_agent_id: String,
    target_agent_id: Option<String>,
    pub capability: String,
    pub input: Value,
    pub timeout: Duration,
    state: TaskState,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(source_agent_id: &str, capability: &str, input: Value, timeout: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            source_agent_id: source_agent_id.to_string(),
            target_agent_id: None,
            capability: capability.to_string(),
            input,
            timeout,
            state: TaskState::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn target_agent_id(&self) -> Option<&str> {
        self.target_agent_id.as_deref()
    }

    /// Binds the target; a resolved target cannot be changed.
    pub fn resolve_target(&mut self, agent_id: &str) -> Result<()> {
        match &self.target_agent_id {
            Some(existing) if existing != agent_id => {
                Err(Error::AgentError(AgentError::Internal(format!(
                    "task {} is already bound to agent {}",
                    self.id, existing
                ))))
            }
            _ => {
                self.target_agent_id = Some(agent_id.to_string());
                Ok(())
            }
        }
    }

    pub fn transition(&mut self, next: TaskState) -> Result<()> {
        if !self.state.can_become(next) {
            return Err(Error::AgentError(AgentError::Internal(format!(
                "task {} cannot move from {:?} to {:?}",
                self.id, self.state, next
            ))));
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn fail(&mut self, next: TaskState, error: &str) -> Result<()> {
        self.transition(next)?;
        self.error = Some(error.to_string());
        Ok(())
    }
}
