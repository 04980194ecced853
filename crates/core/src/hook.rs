//! Hook trait — optional extension points around the runtime loop.
//!
//! A hook may implement any subset of the five callbacks; unimplemented
//! callbacks default to identity transforms, so a runner with no hooks
//! behaves exactly like one with only-identity hooks.
//!
//! `on_iteration_start` is the only callback permitted to halt the loop:
//! it is the sole point with a budget- and ceiling-aware view *before* any
//! provider spend for that turn. All other callbacks operate on
//! already-produced data and degrade to a no-op on failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::TokenBudget;
use crate::context::{Context, Iteration};
use crate::error::HookError;
use crate::message::Message;
use crate::tool::ToolCall;

/// Snapshot handed to `on_iteration_start` before each pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationInfo {
    /// The iteration about to run (1-based)
    pub number: u32,

    /// Configured iteration ceiling
    pub max_iterations: u32,

    /// Cumulative token usage so far
    pub tokens_used: u64,

    /// The configured budget, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<TokenBudget>,
}

/// The five-callback extension capability.
///
/// Callbacks run synchronously, in registration order, each hook's output
/// feeding the next.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Name used in logs and observability events.
    fn name(&self) -> &str {
        "hook"
    }

    /// Before rendering, each iteration. Returning an error stops the loop;
    /// this is the designated custom-stopping-condition signal and is NOT
    /// swallowed.
    async fn on_iteration_start(
        &self,
        _info: &IterationInfo,
        context: Context,
    ) -> std::result::Result<Context, HookError> {
        Ok(context)
    }

    /// After rendering, before the provider call. On error the loop falls
    /// back to the messages this hook received.
    async fn prepare_messages(
        &self,
        messages: Vec<Message>,
    ) -> std::result::Result<Vec<Message>, HookError> {
        Ok(messages)
    }

    /// After tool dispatch, before outcomes join the context. On error the
    /// loop falls back to the unprocessed outcomes.
    async fn prepare_tool_results(
        &self,
        calls: Vec<ToolCall>,
    ) -> std::result::Result<Vec<ToolCall>, HookError> {
        Ok(calls)
    }

    /// After tool results are merged, before the iteration is sealed. On
    /// error the loop falls back to the context as it stood before this
    /// hook ran.
    async fn prepare_context(
        &self,
        context: Context,
    ) -> std::result::Result<Context, HookError> {
        Ok(context)
    }

    /// After an iteration is sealed. Side-effect hook; may still transform
    /// the context for the next pass. On error the loop continues with the
    /// unmodified context.
    async fn on_iteration_complete(
        &self,
        _iteration: &Iteration,
        context: Context,
    ) -> std::result::Result<Context, HookError> {
        Ok(context)
    }
}
