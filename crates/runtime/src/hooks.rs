//! Hook pipeline — ordered application of the five extension points.
//!
//! Hooks run in registration order, each output feeding the next. Only
//! `on_iteration_start` may halt the loop; every other stage falls back to
//! the input the failing hook received, emits a `HookFailed` event, and
//! keeps going.

use std::sync::Arc;
use tracing::warn;

use ironloop_core::context::{Context, Iteration};
use ironloop_core::error::HookError;
use ironloop_core::event::{EventBus, EventMeta, RuntimeEvent};
use ironloop_core::hook::{Hook, IterationInfo};
use ironloop_core::message::Message;
use ironloop_core::tool::ToolCall;

#[derive(Clone)]
pub struct HookPipeline {
    hooks: Vec<Arc<dyn Hook>>,
    bus: Arc<EventBus>,
    meta: EventMeta,
}

impl HookPipeline {
    pub fn new(hooks: Vec<Arc<dyn Hook>>, bus: Arc<EventBus>, meta: EventMeta) -> Self {
        Self { hooks, bus, meta }
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// The stopping-condition stage. Errors are NOT swallowed: the first
    /// failing hook terminates the pipeline and, by design, the loop.
    pub async fn on_iteration_start(
        &self,
        info: &IterationInfo,
        mut context: Context,
    ) -> Result<Context, HookError> {
        for hook in &self.hooks {
            context = hook.on_iteration_start(info, context).await?;
        }
        Ok(context)
    }

    /// Message preparation; per-hook fallback to its input on failure.
    pub async fn prepare_messages(&self, mut messages: Vec<Message>) -> Vec<Message> {
        for hook in &self.hooks {
            let snapshot = messages.clone();
            match hook.prepare_messages(messages).await {
                Ok(out) => messages = out,
                Err(e) => {
                    self.recover(hook.name(), "prepare_messages", &e);
                    messages = snapshot;
                }
            }
        }
        messages
    }

    /// Tool-result preparation; per-hook fallback to its input on failure.
    pub async fn prepare_tool_results(&self, mut calls: Vec<ToolCall>) -> Vec<ToolCall> {
        for hook in &self.hooks {
            let snapshot = calls.clone();
            match hook.prepare_tool_results(calls).await {
                Ok(out) => calls = out,
                Err(e) => {
                    self.recover(hook.name(), "prepare_tool_results", &e);
                    calls = snapshot;
                }
            }
        }
        calls
    }

    /// Context preparation; per-hook fallback to the context as it stood
    /// before the failing hook ran.
    pub async fn prepare_context(&self, mut context: Context) -> Context {
        for hook in &self.hooks {
            let snapshot = context.clone();
            match hook.prepare_context(context).await {
                Ok(out) => context = out,
                Err(e) => {
                    self.recover(hook.name(), "prepare_context", &e);
                    context = snapshot;
                }
            }
        }
        context
    }

    /// Post-seal notification; log and continue on failure.
    pub async fn on_iteration_complete(
        &self,
        iteration: &Iteration,
        mut context: Context,
    ) -> Context {
        for hook in &self.hooks {
            let snapshot = context.clone();
            match hook.on_iteration_complete(iteration, context).await {
                Ok(out) => context = out,
                Err(e) => {
                    self.recover(hook.name(), "on_iteration_complete", &e);
                    context = snapshot;
                }
            }
        }
        context
    }

    fn recover(&self, hook: &str, stage: &str, error: &HookError) {
        warn!(hook, stage, error = %error, "Hook failed, continuing with fallback");
        self.bus.publish(RuntimeEvent::HookFailed {
            meta: self.meta.stamp(),
            hook: hook.to_string(),
            stage: stage.to_string(),
            error: error.to_string(),
        });
    }
}
