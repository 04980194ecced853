//! Runtime observability events — the sole boundary to telemetry sinks.
//!
//! The runtime publishes point events and span start/stop pairs here;
//! dashboards and logging layers subscribe without any compile-time
//! coupling to the loop itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Metadata carried by every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMeta {
    /// Identifier of the agent being executed
    pub agent: String,

    /// Provider serving the invocation
    pub provider: String,

    /// Caller/client identifier
    pub client: String,

    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    pub fn new(
        agent: impl Into<String>,
        provider: impl Into<String>,
        client: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.into(),
            provider: provider.into(),
            client: client.into(),
            timestamp: Utc::now(),
        }
    }

    /// A copy of this meta restamped to now.
    pub fn stamp(&self) -> Self {
        Self { timestamp: Utc::now(), ..self.clone() }
    }
}

/// All events emitted by the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// An agent invocation began
    InvocationStarted { meta: EventMeta },

    /// An agent invocation completed successfully
    InvocationCompleted {
        meta: EventMeta,
        iterations: u32,
        tokens_used: u64,
        duration_ms: u64,
    },

    /// An agent invocation terminated with a fatal error
    InvocationFailed { meta: EventMeta, error: String },

    /// An iteration began
    IterationStarted { meta: EventMeta, number: u32 },

    /// An iteration was sealed
    IterationCompleted {
        meta: EventMeta,
        number: u32,
        tool_calls: usize,
        duration_ms: u64,
    },

    /// A provider call began
    ProviderCallStarted { meta: EventMeta, messages: usize },

    /// A provider call returned
    ProviderCallCompleted {
        meta: EventMeta,
        model: String,
        tokens_used: u32,
        duration_ms: u64,
    },

    /// A tool call was dispatched
    ToolCallStarted { meta: EventMeta, call_id: String, tool: String },

    /// A transient tool failure is being retried
    ToolCallRetry {
        meta: EventMeta,
        call_id: String,
        tool: String,
        attempt: u32,
        reason: String,
    },

    /// A tool call reached a terminal outcome
    ToolCallCompleted {
        meta: EventMeta,
        call_id: String,
        tool: String,
        success: bool,
        duration_ms: u64,
    },

    /// A hook failed and the loop recovered with a fallback
    HookFailed {
        meta: EventMeta,
        hook: String,
        stage: String,
        error: String,
    },

    /// Cumulative usage crossed the warn threshold
    BudgetWarning {
        meta: EventMeta,
        used: u64,
        limit: u64,
        utilization: f64,
    },

    /// A progressive disclosure strategy was applied to tool outcomes
    DisclosureApplied { meta: EventMeta, strategy: String, calls: usize },
}

/// A broadcast-based bus for runtime events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Subscribers
/// filter for the events they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<RuntimeEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: RuntimeEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RuntimeEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
