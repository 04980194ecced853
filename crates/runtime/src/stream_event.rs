//! Runtime-level streaming events.
//!
//! `RunStreamEvent` wraps provider-level stream chunks into higher-level
//! events a caller can forward over SSE or WebSocket. A stream carries
//! exactly one terminal event: `Done` with the final result, or `Error`.

use serde::{Deserialize, Serialize};

use ironloop_core::context::RunResult;

/// Events emitted by the runtime during streaming execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunStreamEvent {
    /// Partial text token from the LLM.
    Chunk { content: String },

    /// The runtime is dispatching a tool.
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },

    /// A tool call reached its terminal outcome.
    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// The stream is complete — the terminal success marker.
    Done { result: RunResult },

    /// The stream terminated with a fatal error.
    Error { message: String },
}

impl RunStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}
