//! Tool dispatcher — resolution, validation, execution, and outcome
//! normalization for one batch of requested tool calls.
//!
//! All calls requested in a single provider response form one ordered
//! batch. They may execute concurrently (bounded fan-out), but outcomes
//! always merge back in original request order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use ironloop_core::config::ErrorPolicy;
use ironloop_core::error::ToolError;
use ironloop_core::event::{EventBus, EventMeta, RuntimeEvent};
use ironloop_core::message::MessageToolCall;
use ironloop_core::tool::{ExecutionContext, Tool, ToolCall, ToolOutcome, ToolRegistry};

/// Dispatch behavior, carved out of the runner configuration.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Per-call timeout
    pub timeout: Duration,

    /// Bounded retry count for transient failures
    pub max_retries: u32,

    /// Fan-out limit within one batch
    pub max_concurrency: usize,

    /// What a tool error does to the invocation
    pub on_error: ErrorPolicy,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 0,
            max_concurrency: 4,
            on_error: ErrorPolicy::Continue,
        }
    }
}

#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    options: DispatchOptions,
    bus: Arc<EventBus>,
    meta: EventMeta,
}

impl ToolDispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        options: DispatchOptions,
        bus: Arc<EventBus>,
        meta: EventMeta,
    ) -> Self {
        Self { registry, options, bus, meta }
    }

    /// Dispatch one ordered batch of requested tool calls.
    ///
    /// Executions fan out up to `max_concurrency`; completion is a fan-in
    /// barrier and the returned outcomes preserve request order regardless
    /// of completion timing. Under the `Halt` policy the first error
    /// outcome (in request order) aborts the invocation.
    pub async fn dispatch_batch(
        &self,
        requests: &[MessageToolCall],
        iteration: u32,
    ) -> std::result::Result<Vec<ToolCall>, ToolError> {
        // Build the futures eagerly; a lazy closure over `self` is not
        // general enough for the runner's spawned streaming task.
        let futures: Vec<_> = requests
            .iter()
            .map(|request| self.dispatch_one(request, iteration))
            .collect();
        let calls: Vec<ToolCall> = stream::iter(futures)
            .buffered(self.options.max_concurrency)
            .collect()
            .await;

        if self.options.on_error == ErrorPolicy::Halt {
            if let Some(failed) = calls.iter().find(|c| c.outcome.is_error()) {
                let reason = match &failed.outcome {
                    ToolOutcome::Error { reason } => reason.clone(),
                    _ => unreachable!(),
                };
                return Err(ToolError::ExecutionFailed {
                    tool_name: failed.name.clone(),
                    reason,
                });
            }
        }

        Ok(calls)
    }

    /// Resolve, validate, execute, and normalize a single requested call.
    async fn dispatch_one(&self, request: &MessageToolCall, iteration: u32) -> ToolCall {
        let started = Instant::now();
        self.bus.publish(RuntimeEvent::ToolCallStarted {
            meta: self.meta.stamp(),
            call_id: request.id.clone(),
            tool: request.name.clone(),
        });

        let arguments = parse_arguments(&request.arguments);
        let outcome = match &arguments {
            Err(reason) => ToolOutcome::error(reason.clone()),
            Ok(args) => self.resolve_and_execute(request, args.clone(), iteration).await,
        };

        let success = outcome.is_ok();
        if !success {
            warn!(tool = %request.name, call_id = %request.id, "Tool call ended in error outcome");
        }
        self.bus.publish(RuntimeEvent::ToolCallCompleted {
            meta: self.meta.stamp(),
            call_id: request.id.clone(),
            tool: request.name.clone(),
            success,
            duration_ms: started.elapsed().as_millis() as u64,
        });

        ToolCall {
            id: request.id.clone(),
            name: request.name.clone(),
            arguments: arguments.unwrap_or(serde_json::Value::Null),
            outcome,
        }
    }

    async fn resolve_and_execute(
        &self,
        request: &MessageToolCall,
        args: serde_json::Value,
        iteration: u32,
    ) -> ToolOutcome {
        let Some(tool) = self.registry.get(&request.name) else {
            return ToolOutcome::error(ToolError::NotFound(request.name.clone()).to_string());
        };

        // Required-argument validation happens before any execution
        if let Some(missing) = missing_parameters(&tool.parameters_schema(), &args) {
            return ToolOutcome::error(
                ToolError::MissingParameters { tool_name: request.name.clone(), missing }
                    .to_string(),
            );
        }

        let ctx = ExecutionContext {
            agent: self.meta.agent.clone(),
            iteration,
            call_id: request.id.clone(),
            extras: serde_json::Map::new(),
        };

        let attempts = self.options.max_retries + 1;
        let mut last_error: Option<ToolError> = None;
        for attempt in 1..=attempts {
            match self.execute_once(tool.clone(), &request.name, args.clone(), ctx.clone()).await {
                Ok(value) => return ToolOutcome::from_value(value),
                Err(e) => {
                    if e.is_transient() && attempt < attempts {
                        debug!(tool = %request.name, attempt, "Retrying transient tool failure");
                        self.bus.publish(RuntimeEvent::ToolCallRetry {
                            meta: self.meta.stamp(),
                            call_id: request.id.clone(),
                            tool: request.name.clone(),
                            attempt,
                            reason: e.to_string(),
                        });
                        last_error = Some(e);
                        continue;
                    }
                    return ToolOutcome::error(e.to_string());
                }
            }
        }
        // Retries exhausted on a transient failure
        ToolOutcome::error(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "retries exhausted".into()),
        )
    }

    /// One execution attempt: spawned so a panic inside the tool is
    /// captured as an error outcome, with the configured timeout applied.
    async fn execute_once(
        &self,
        tool: Arc<dyn Tool>,
        name: &str,
        args: serde_json::Value,
        ctx: ExecutionContext,
    ) -> std::result::Result<serde_json::Value, ToolError> {
        let mut handle = tokio::spawn(async move { tool.execute(args, ctx).await });
        match tokio::time::timeout(self.options.timeout, &mut handle).await {
            Err(_) => {
                // Cooperative cancellation: the outcome is recorded as a
                // timeout, the underlying task is aborted best-effort.
                handle.abort();
                Err(ToolError::Timeout {
                    tool_name: name.to_string(),
                    timeout_ms: self.options.timeout.as_millis() as u64,
                })
            }
            Ok(Ok(result)) => result,
            Ok(Err(join)) => {
                let reason = if join.is_panic() {
                    "tool panicked during execution".to_string()
                } else {
                    "tool task was cancelled".to_string()
                };
                Err(ToolError::ExecutionFailed { tool_name: name.to_string(), reason })
            }
        }
    }
}

/// Parse the raw JSON argument string; empty means no arguments.
fn parse_arguments(raw: &str) -> std::result::Result<serde_json::Value, String> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw).map_err(|e| format!("Invalid tool arguments: {e}"))
}

/// Required keys from the tool's JSON schema that are absent from `args`.
fn missing_parameters(schema: &serde_json::Value, args: &serde_json::Value) -> Option<Vec<String>> {
    let required = schema.get("required")?.as_array()?;
    let missing: Vec<String> = required
        .iter()
        .filter_map(|v| v.as_str())
        .filter(|key| args.get(key).is_none())
        .map(String::from)
        .collect();
    if missing.is_empty() { None } else { Some(missing) }
}
