//! Seam to the external model-invocation service.
//!
//! Provider-specific request translation lives outside this crate; an
//! implementation of [`ModelClient`] turns a history plus tool schemas into
//! either a final answer or a list of requested tool invocations.

pub mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{message::ChatMessage, tools::ToolInfo};

pub use scripted::ScriptedModelClient;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolInvocation {
    pub fn new(name: &str, arguments: serde_json::Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.to_string(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelResponse {
    /// Final textual answer; terminates the loop.
    Final(String),
    /// One or more tool invocations, optionally with partial text.
    ToolCalls {
        content: Option<String>,
        calls: Vec<ToolInvocation>,
    },
}

impl ModelResponse {
    pub fn final_text(text: &str) -> Self {
        ModelResponse::Final(text.to_string())
    }

    pub fn tool_calls(calls: Vec<ToolInvocation>) -> Self {
        ModelResponse::ToolCalls {
            content: None,
            calls,
        }
    }
}

/// Errors raised by the model-invocation service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("authentication error: {0}")]
    Auth(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn invoke(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolInfo],
    ) -> Result<ModelResponse, ModelError>;
}
