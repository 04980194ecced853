//! Tool trait — the abstraction over invocable units.
//!
//! Tools are the actions the model can request during a run. The runtime
//! resolves requested calls against a `ToolRegistry`, executes them, and
//! records each completed call as a `ToolCall` with a tagged `ToolOutcome`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ToolError;

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// The tagged outcome of a tool execution.
///
/// Expected failures are values, never exceptions. Once a `ToolCall` holds
/// an outcome it is never mutated; a retry happens before the outcome is
/// recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolOutcome {
    Ok { value: serde_json::Value },
    Error { reason: String },
}

impl ToolOutcome {
    /// Wrap a raw value, normalizing bare (non-object) values into
    /// `{"result": value}` so tool results always present as mappings.
    pub fn from_value(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(_) => Self::Ok { value },
            other => Self::Ok { value: serde_json::json!({ "result": other }) },
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error { reason: reason.into() }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Render the outcome as the content of a tool-result message.
    pub fn render(&self) -> String {
        match self {
            Self::Ok { value } => value.to_string(),
            Self::Error { reason } => format!("Error: {reason}"),
        }
    }
}

/// A completed tool call: the request plus its terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool that was executed
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,

    /// The terminal outcome (success, error, or timeout)
    pub outcome: ToolOutcome,
}

/// Per-call execution context handed to the tool alongside its arguments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Identifier of the invoking agent
    pub agent: String,

    /// Iteration number this call belongs to
    pub iteration: u32,

    /// The call id being executed
    pub call_id: String,

    /// Open extras (provider name, client id, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

/// The core Tool trait.
///
/// Implementations return a bare JSON value on success; the dispatcher
/// normalizes it into a `ToolOutcome`. Faults that could succeed on retry
/// should be reported as `ToolError::Transient`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: ExecutionContext,
    ) -> std::result::Result<serde_json::Value, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// Built once at agent setup and shared read-only across invocations.
/// The runtime uses it to:
/// 1. Get tool definitions to send to the LLM
/// 2. Look up tools when the LLM requests them
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
