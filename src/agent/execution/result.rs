use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{error::ErrorKind, model::ToolInvocation};

/// One dispatched tool invocation, in issuance order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub success: bool,
    pub duration_ms: u64,
}

impl ToolCallRecord {
    pub fn succeeded(call: &ToolInvocation, output: Value, duration_ms: u64) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            result: Some(output),
            error: None,
            error_kind: None,
            success: true,
            duration_ms,
        }
    }

    pub fn failed(call: &ToolInvocation, kind: ErrorKind, error: String, duration_ms: u64) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            result: None,
            error: Some(error),
            error_kind: Some(kind),
            success: false,
            duration_ms,
        }
    }

    /// Observation text appended to the history for the model.
    pub fn observation(&self) -> String {
        json!({
            "success": self.success,
            "output": self.result,
            "error": self.error,
        })
        .to_string()
    }
}

/// Outcome of one Execution Loop run (or one delegated task).
///
/// Built once through its constructors; read through accessors only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    success: bool,
    output: Value,
    error: Option<String>,
    error_kind: Option<ErrorKind>,
    tool_calls: Vec<ToolCallRecord>,
    iterations: u32,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl ExecutionResult {
    pub fn success(output: Value, iterations: u32, tool_calls: Vec<ToolCallRecord>) -> Self {
        Self {
            success: true,
            output,
            error: None,
            error_kind: None,
            tool_calls,
            iterations,
            metadata: Map::new(),
        }
    }

    pub fn failure(
        kind: ErrorKind,
        error: impl Into<String>,
        output: Value,
        iterations: u32,
        tool_calls: Vec<ToolCallRecord>,
    ) -> Self {
        Self {
            success: false,
            output,
            error: Some(error.into()),
            error_kind: Some(kind),
            tool_calls,
            iterations,
            metadata: Map::new(),
        }
    }

    /// Failure with no output, trace, or iterations.
    pub fn error(kind: ErrorKind, error: impl Into<String>) -> Self {
        Self::failure(kind, error, Value::Null, 0, Vec::new())
    }

    pub(crate) fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn output(&self) -> &Value {
        &self.output
    }

    /// Output rendered as text: strings verbatim, null as empty, other values as JSON.
    pub fn output_text(&self) -> String {
        value_text(&self.output)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        &self.tool_calls
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn into_output(self) -> Value {
        self.output
    }
}

pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
