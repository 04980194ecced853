//! Context/Iteration store — the append-only log of one invocation.
//!
//! A `Context` owns its iterations exclusively and is threaded through the
//! runtime loop by value: each stage returns a new `Context`, and the loop
//! replaces its working copy on success. Failed stages therefore cannot
//! corrupt the authoritative state.
//!
//! Invariants:
//! - iteration numbers are contiguous, starting at 1
//! - `current_iteration == iterations.len()` after any successful append
//! - an iteration is sealed (`completed_at` set) before it is appended

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ContextError;
use crate::message::Message;
use crate::provider::Usage;
use crate::tool::ToolCall;

/// One full pass of render → call → (tool dispatch) → compact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Iteration {
    /// 1-based, monotonically increasing
    pub number: u32,

    /// Messages produced during this pass, in call order
    pub messages: Vec<Message>,

    /// Completed tool calls, in original request order
    pub tool_calls: Vec<ToolCall>,

    /// When this pass began
    pub started_at: DateTime<Utc>,

    /// Set exactly once, when the iteration is sealed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Open metadata (token usage, model, provider extras)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Iteration {
    /// Start a new iteration with the given number.
    pub fn new(number: u32) -> Self {
        Self {
            number,
            messages: Vec::new(),
            tool_calls: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Append a message to this pass.
    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Record a completed tool call.
    pub fn push_tool_call(&mut self, call: ToolCall) {
        self.tool_calls.push(call);
    }

    /// Record provider token usage into the metadata map.
    pub fn record_usage(&mut self, usage: &Usage) {
        self.metadata.insert("prompt_tokens".into(), usage.prompt_tokens.into());
        self.metadata.insert("completion_tokens".into(), usage.completion_tokens.into());
        self.metadata.insert("total_tokens".into(), usage.total_tokens.into());
    }

    /// Total tokens reported for this pass, if any.
    pub fn total_tokens(&self) -> u64 {
        self.metadata
            .get("total_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    }

    /// Seal the iteration. No further mutation after this.
    pub fn complete(&mut self) {
        if self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// The append-only iteration log for one agent invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    /// Sealed iterations, contiguous from 1
    pub iterations: Vec<Iteration>,

    /// Always equals `iterations.len()` after a successful append
    pub current_iteration: u32,
}

impl Context {
    /// Create a fresh, empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sealed iteration, enforcing contiguity.
    pub fn append(&mut self, iteration: Iteration) -> std::result::Result<(), ContextError> {
        let expected = self.current_iteration + 1;
        if iteration.number != expected {
            return Err(ContextError::NonContiguous { expected, got: iteration.number });
        }
        if !iteration.is_sealed() {
            return Err(ContextError::Unsealed(iteration.number));
        }
        self.iterations.push(iteration);
        self.current_iteration += 1;
        Ok(())
    }

    /// The last sealed iteration, if any.
    pub fn last(&self) -> Option<&Iteration> {
        self.iterations.last()
    }

    /// Cumulative provider-reported token usage across all iterations.
    pub fn total_tokens(&self) -> u64 {
        self.iterations.iter().map(|i| i.total_tokens()).sum()
    }

    /// All messages across iterations, flattened in order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.iterations.iter().flat_map(|i| i.messages.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }
}

/// Terminal output of one successful agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// The final output value
    pub output: serde_json::Value,

    /// Optional reasoning trace surfaced by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,

    /// Invocation metadata
    pub metadata: ResultMetadata,
}

/// Metadata attached to a `RunResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Provider that served the invocation
    pub provider: String,

    /// Model that produced the final response
    pub model: String,

    /// Wall-clock duration of the whole invocation
    pub duration_ms: u64,

    /// Cumulative token usage
    pub tokens_used: u64,

    /// Number of iterations executed
    pub iterations: u32,

    /// When the invocation started
    pub started_at: DateTime<Utc>,

    /// When the invocation completed
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed(number: u32) -> Iteration {
        let mut it = Iteration::new(number);
        it.complete();
        it
    }

    #[test]
    fn append_keeps_contiguity_invariant() {
        let mut ctx = Context::new();
        ctx.append(sealed(1)).unwrap();
        ctx.append(sealed(2)).unwrap();
        assert_eq!(ctx.current_iteration, 2);
        for (i, it) in ctx.iterations.iter().enumerate() {
            assert_eq!(it.number as usize, i + 1);
        }
    }

    #[test]
    fn append_rejects_gap() {
        let mut ctx = Context::new();
        ctx.append(sealed(1)).unwrap();
        let err = ctx.append(sealed(3)).unwrap_err();
        assert!(matches!(err, ContextError::NonContiguous { expected: 2, got: 3 }));
        assert_eq!(ctx.current_iteration, 1);
    }

    #[test]
    fn append_rejects_unsealed() {
        let mut ctx = Context::new();
        let err = ctx.append(Iteration::new(1)).unwrap_err();
        assert!(matches!(err, ContextError::Unsealed(1)));
    }

    #[test]
    fn sealing_is_idempotent() {
        let mut it = Iteration::new(1);
        it.complete();
        let first = it.completed_at;
        it.complete();
        assert_eq!(it.completed_at, first);
    }

    #[test]
    fn usage_accumulates_across_iterations() {
        let mut ctx = Context::new();
        for n in 1..=2 {
            let mut it = Iteration::new(n);
            it.record_usage(&Usage { prompt_tokens: 400, completion_tokens: 200, total_tokens: 600 });
            it.complete();
            ctx.append(it).unwrap();
        }
        assert_eq!(ctx.total_tokens(), 1200);
    }

    #[test]
    fn messages_flatten_in_order() {
        let mut ctx = Context::new();
        let mut it = Iteration::new(1);
        it.push_message(Message::assistant("first"));
        it.push_message(Message::tool_result("c1", "out"));
        it.complete();
        ctx.append(it).unwrap();

        let contents: Vec<_> = ctx.messages().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "out"]);
    }
}
