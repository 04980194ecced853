//! Progressive disclosure controller.
//!
//! Applies the configured result processors to tool outcomes before hook
//! interception, and a sliding-window compaction to the context before the
//! next render. Error outcomes are never shrunk — they stay verbatim for
//! diagnostics.

use std::sync::Arc;
use tracing::debug;

use ironloop_core::config::DisclosureConfig;
use ironloop_core::context::Context;
use ironloop_core::event::{EventBus, EventMeta, RuntimeEvent};
use ironloop_core::tool::{ToolCall, ToolOutcome};

use super::processors::{sample, summarize, truncate, DEFAULT_MARKER};

pub struct DisclosureController {
    config: DisclosureConfig,
    bus: Arc<EventBus>,
    meta: EventMeta,
}

impl DisclosureController {
    pub fn new(config: DisclosureConfig, bus: Arc<EventBus>, meta: EventMeta) -> Self {
        Self { config, bus, meta }
    }

    /// Shrink successful tool outcomes in place, preserving order.
    ///
    /// Strategies compose as sample → summarize → truncate: sampling bounds
    /// sequences first, summarization collapses what is still complex, and
    /// truncation bounds whatever text remains.
    pub fn shrink_outcomes(&self, calls: Vec<ToolCall>) -> Vec<ToolCall> {
        if self.config.is_noop() {
            return calls;
        }

        let shrunk: Vec<ToolCall> = calls
            .into_iter()
            .map(|mut call| {
                if let ToolOutcome::Ok { value } = &call.outcome {
                    let mut value = value.clone();
                    if let Some(n) = self.config.sample {
                        value = sample(&value, n);
                    }
                    if self.config.summarize {
                        value = summarize(&value);
                    }
                    if let Some(max) = self.config.truncate {
                        value = truncate(&value, max, DEFAULT_MARKER);
                    }
                    call.outcome = ToolOutcome::Ok { value };
                }
                call
            })
            .collect();

        debug!(
            calls = shrunk.len(),
            strategy = %self.strategy_label(),
            "Applied progressive disclosure to tool outcomes"
        );
        self.bus.publish(RuntimeEvent::DisclosureApplied {
            meta: self.meta.stamp(),
            strategy: self.strategy_label(),
            calls: shrunk.len(),
        });
        shrunk
    }

    /// Sliding-window compaction: keep only the most recent `window_size`
    /// iterations for the next provider call. Iteration numbers are
    /// preserved — the window is a view, and the authoritative context
    /// keeps the full history.
    pub fn window(&self, context: &Context) -> Context {
        let Some(size) = self.config.window_size else {
            return context.clone();
        };
        compact(context, size)
    }

    fn strategy_label(&self) -> String {
        let mut parts = Vec::new();
        if self.config.sample.is_some() {
            parts.push("sample");
        }
        if self.config.summarize {
            parts.push("summarize");
        }
        if self.config.truncate.is_some() {
            parts.push("truncate");
        }
        parts.join("+")
    }
}

/// Keep the suffix of the most recent `window_size` iterations.
///
/// If `window_size >= len`, the context is returned unchanged.
pub fn compact(context: &Context, window_size: usize) -> Context {
    let len = context.iterations.len();
    if window_size >= len {
        return context.clone();
    }
    Context {
        iterations: context.iterations[len - window_size..].to_vec(),
        current_iteration: context.current_iteration,
    }
}
