use serde::{Deserialize, Serialize};

use crate::model::ToolInvocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry of a conversation history sent to the model service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    /// Tool name, set on observations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
}

impl ChatMessage {
    fn with_role(role: Role, content: Option<String>) -> Self {
        Self {
            role,
            content,
            name: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn system(content: &str) -> Self {
        Self::with_role(Role::System, Some(content.to_string()))
    }

    pub fn user(content: &str) -> Self {
        Self::with_role(Role::User, Some(content.to_string()))
    }

    pub fn assistant(content: &str) -> Self {
        Self::with_role(Role::Assistant, Some(content.to_string()))
    }

    /// Assistant turn that requested tool invocations.
    pub fn assistant_tool_calls(content: Option<String>, calls: Vec<ToolInvocation>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, content);
        msg.tool_calls = calls;
        msg
    }

    /// Observation produced by a tool invocation.
    pub fn tool(tool_call_id: &str, name: &str, content: String) -> Self {
        let mut msg = Self::with_role(Role::Tool, Some(content));
        msg.name = Some(name.to_string());
        msg.tool_call_id = Some(tool_call_id.to_string());
        msg
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}
