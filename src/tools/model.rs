use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared shape of a tool, offered to the model service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    /// JSON schema the invocation arguments must satisfy.
    pub params_schema: Value,
}

impl ToolInfo {
    pub fn new(name: &str, description: &str, params_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            params_schema,
        }
    }
}
