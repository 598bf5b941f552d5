//! The `Tool` trait and the values passed in and out of tool calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Tool description advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

impl ToolSchema {
    pub fn describe(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters_schema(),
        }
    }
}

/// What a tool hands back. A tool may fail softly with `success = false`
/// instead of returning an `Err`; both reach the model as error text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub result: Value,
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn success(result: Value) -> Self {
        Self {
            success: true,
            result,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: Value::Null,
            error: Some(message.into()),
        }
    }

    /// Serialized result on success, the error text otherwise.
    pub fn into_content(self) -> std::result::Result<String, String> {
        if self.success {
            Ok(serde_json::to_string(&self.result).unwrap_or_default())
        } else {
            Err(self
                .error
                .unwrap_or_else(|| "Tool reported failure without a message".to_string()))
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Worker the current run acts on behalf of, if any.
    pub worker_id: Option<String>,
    pub tool_call_id: String,
}

impl ToolContext {
    pub fn for_call(tool_call_id: impl Into<String>, worker_id: Option<String>) -> Self {
        Self {
            worker_id,
            tool_call_id: tool_call_id.into(),
        }
    }
}

/// A capability the agent can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses in tool calls. Must be unique within a registry.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value;

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolOutput>;
}
