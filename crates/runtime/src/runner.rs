//! The runtime loop — the orchestrator of one agent invocation.
//!
//! Finite-state machine per invocation:
//! `Start → Rendering → Calling → (ToolDispatch → Compacting)* → Completed | Failed`
//!
//! 1. **Start**: validate config, fresh `Context`, usage counter at zero
//! 2. **Rendering**: render the instruction prompt against the windowed
//!    context and the caller arguments
//! 3. **Calling**: invoke the provider with prompt, messages, tool manifest
//! 4. **If tool calls**: dispatch the batch, shrink outcomes, merge in
//!    request order, seal the iteration, run boundary checks, loop
//! 5. **If text only**: seal the final iteration and build a `RunResult`
//!
//! Fatal conditions return a typed error carrying the partial context;
//! local recoveries (hook fallback, tool-continue policy) keep the loop
//! alive with an intact context.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ironloop_core::config::RunnerConfig;
use ironloop_core::context::{Context, Iteration, ResultMetadata, RunResult};
use ironloop_core::error::{Error, ProviderError, RunError};
use ironloop_core::event::{EventBus, EventMeta, RuntimeEvent};
use ironloop_core::hook::{Hook, IterationInfo};
use ironloop_core::message::Message;
use ironloop_core::prompt::PromptTemplate;
use ironloop_core::provider::{Provider, ProviderRequest, ProviderResponse};
use ironloop_core::tool::ToolRegistry;

use crate::budget::{BudgetCheck, BudgetMonitor};
use crate::disclosure::DisclosureController;
use crate::dispatch::{DispatchOptions, ToolDispatcher};
use crate::hooks::HookPipeline;
use crate::stream_event::RunStreamEvent;
use crate::token::estimate_messages_tokens;

/// The agent execution runtime for one configured agent.
///
/// Cheap to clone; a fresh `Context` and budget tracker are created per
/// invocation, so concurrent invocations never share mutable state.
#[derive(Clone)]
pub struct AgentRunner {
    provider: Arc<dyn Provider>,
    template: Arc<dyn PromptTemplate>,
    registry: Arc<ToolRegistry>,
    hooks: Vec<Arc<dyn Hook>>,
    config: RunnerConfig,
    bus: Arc<EventBus>,
}

impl AgentRunner {
    pub fn new(
        provider: Arc<dyn Provider>,
        template: Arc<dyn PromptTemplate>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            provider,
            template,
            registry: Arc::new(ToolRegistry::new()),
            hooks: Vec::new(),
            config,
            bus: Arc::new(EventBus::default()),
        }
    }

    /// Attach a read-only tool registry, shared across invocations.
    pub fn with_tools(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Register a hook. Hooks run in registration order.
    pub fn with_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Replace the observability event bus.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = bus;
        self
    }

    /// The observability event bus for this runner.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    fn meta(&self) -> EventMeta {
        EventMeta::new(&self.config.agent, self.provider.name(), &self.config.client)
    }

    /// Execute one agent invocation to completion.
    pub async fn run(&self, arguments: serde_json::Value) -> Result<RunResult, RunError> {
        self.run_inner(arguments, None).await
    }

    /// Execute one agent invocation, streaming partial results.
    ///
    /// The returned channel carries zero or more `Chunk`/`ToolCall`/
    /// `ToolResult` events and exactly one terminal event. Dropping the
    /// receiver cancels the driving task at the next send.
    pub fn run_streamed(&self, arguments: serde_json::Value) -> mpsc::Receiver<RunStreamEvent> {
        let (tx, rx) = mpsc::channel(64);
        let runner = self.clone();
        tokio::spawn(async move {
            match runner.run_inner(arguments, Some(&tx)).await {
                Ok(result) => {
                    let _ = tx.send(RunStreamEvent::Done { result }).await;
                }
                Err(e) => {
                    let _ = tx.send(RunStreamEvent::Error { message: e.to_string() }).await;
                }
            }
        });
        rx
    }

    async fn run_inner(
        &self,
        arguments: serde_json::Value,
        sink: Option<&mpsc::Sender<RunStreamEvent>>,
    ) -> Result<RunResult, RunError> {
        if let Err(message) = self.config.validate() {
            return Err(RunError::new(Error::Validation(message), Context::new()));
        }

        let meta = self.meta();
        info!(agent = %self.config.agent, provider = %self.provider.name(), "Starting agent invocation");
        self.bus.publish(RuntimeEvent::InvocationStarted { meta: meta.stamp() });

        let started = Instant::now();
        let outcome = self.drive(arguments, sink, &meta).await;

        match &outcome {
            Ok(result) => {
                self.bus.publish(RuntimeEvent::InvocationCompleted {
                    meta: meta.stamp(),
                    iterations: result.metadata.iterations,
                    tokens_used: result.metadata.tokens_used,
                    duration_ms: started.elapsed().as_millis() as u64,
                });
            }
            Err(e) => {
                warn!(agent = %self.config.agent, error = %e, "Agent invocation failed");
                self.bus.publish(RuntimeEvent::InvocationFailed {
                    meta: meta.stamp(),
                    error: e.kind.to_string(),
                });
            }
        }
        outcome
    }

    async fn drive(
        &self,
        arguments: serde_json::Value,
        sink: Option<&mpsc::Sender<RunStreamEvent>>,
        meta: &EventMeta,
    ) -> Result<RunResult, RunError> {
        let started_at = Utc::now();
        let started = Instant::now();

        let mut context = Context::new();
        let mut monitor = BudgetMonitor::new(self.config.token_budget.clone());
        let pipeline = HookPipeline::new(self.hooks.clone(), self.bus.clone(), meta.clone());
        let controller = DisclosureController::new(
            self.config.disclosure.clone(),
            self.bus.clone(),
            meta.clone(),
        );
        let dispatcher = ToolDispatcher::new(
            self.registry.clone(),
            DispatchOptions {
                timeout: Duration::from_millis(self.config.tool_timeout_ms),
                max_retries: self.config.max_retries,
                max_concurrency: self.config.max_concurrency,
                on_error: self.config.on_error,
            },
            self.bus.clone(),
            meta.clone(),
        );
        let tool_definitions = self.registry.definitions();

        loop {
            let number = context.current_iteration + 1;

            // The one hook allowed to stop the loop, before any spend
            let info = IterationInfo {
                number,
                max_iterations: self.config.max_iterations,
                tokens_used: monitor.used(),
                budget: self.config.token_budget.clone(),
            };
            let snapshot = context.clone();
            context = match pipeline.on_iteration_start(&info, context).await {
                Ok(ctx) => ctx,
                Err(e) => return Err(RunError::new(Error::Hook(e), snapshot)),
            };

            debug!(agent = %self.config.agent, iteration = number, "Runtime loop iteration");
            self.bus.publish(RuntimeEvent::IterationStarted { meta: meta.stamp(), number });
            let iteration_started = Instant::now();
            let mut iteration = Iteration::new(number);

            // Rendering
            let windowed = controller.window(&context);
            let prompt = self
                .template
                .render(&arguments, &windowed)
                .map_err(|e| RunError::new(e.into(), context.clone()))?;
            let mut messages = assemble_messages(&arguments, &windowed);
            messages = pipeline.prepare_messages(messages).await;

            // Calling
            let request = ProviderRequest {
                prompt,
                schema: self.config.schema.clone(),
                messages: messages.clone(),
                tools: tool_definitions.clone(),
                options: serde_json::Map::new(),
            };
            self.bus.publish(RuntimeEvent::ProviderCallStarted {
                meta: meta.stamp(),
                messages: messages.len(),
            });
            let call_started = Instant::now();
            let response = self
                .call_provider(request, sink)
                .await
                .map_err(|e| RunError::new(Error::Provider(e), context.clone()))?;
            self.bus.publish(RuntimeEvent::ProviderCallCompleted {
                meta: meta.stamp(),
                model: response.model.clone(),
                tokens_used: response.usage.map(|u| u.total_tokens).unwrap_or(0),
                duration_ms: call_started.elapsed().as_millis() as u64,
            });

            match &response.usage {
                Some(usage) => {
                    monitor.record(usage);
                    iteration.record_usage(usage);
                }
                None => {
                    // Fall back to the heuristic when the provider is silent
                    let estimate = estimate_messages_tokens(&messages)
                        + estimate_messages_tokens(std::slice::from_ref(&response.message));
                    monitor.record_estimate(estimate);
                }
            }
            iteration.metadata.insert("model".into(), response.model.clone().into());

            let tool_requests = response.message.tool_calls.clone();
            iteration.push_message(response.message.clone());

            if tool_requests.is_empty() {
                // Completed: seal the final iteration and build the result
                iteration.complete();
                let sealed = iteration.clone();
                context
                    .append(iteration)
                    .map_err(|e| RunError::new(Error::Context(e), context.clone()))?;
                context = pipeline.prepare_context(context).await;
                context = pipeline.on_iteration_complete(&sealed, context).await;
                self.bus.publish(RuntimeEvent::IterationCompleted {
                    meta: meta.stamp(),
                    number,
                    tool_calls: 0,
                    duration_ms: iteration_started.elapsed().as_millis() as u64,
                });

                // The boundary check runs on the final iteration too; a
                // crossed warn threshold is still reported, and a Halt
                // limit reached by an already-complete answer is not a
                // failure.
                if let BudgetCheck::Warn { used, limit, utilization } = monitor.check() {
                    self.bus.publish(RuntimeEvent::BudgetWarning {
                        meta: meta.stamp(),
                        used,
                        limit,
                        utilization,
                    });
                }

                return Ok(build_result(
                    &response,
                    &self.config,
                    self.provider.name(),
                    monitor.used(),
                    context.current_iteration,
                    started_at,
                    started.elapsed(),
                ));
            }

            // ToolDispatch
            if let Some(tx) = sink {
                for request in &tool_requests {
                    let arguments = serde_json::from_str(&request.arguments)
                        .unwrap_or(serde_json::Value::Null);
                    if tx
                        .send(RunStreamEvent::ToolCall {
                            id: request.id.clone(),
                            name: request.name.clone(),
                            arguments,
                        })
                        .await
                        .is_err()
                    {
                        return Err(RunError::new(
                            Error::Provider(ProviderError::StreamInterrupted(
                                "consumer dropped the stream".into(),
                            )),
                            context.clone(),
                        ));
                    }
                }
            }
            let calls = dispatcher
                .dispatch_batch(&tool_requests, number)
                .await
                .map_err(|e| RunError::new(Error::Tool(e), context.clone()))?;
            if let Some(tx) = sink {
                for call in &calls {
                    let _ = tx
                        .send(RunStreamEvent::ToolResult {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            output: call.outcome.render(),
                            success: call.outcome.is_ok(),
                        })
                        .await;
                }
            }

            // Compacting: shrink outcomes, let hooks inspect, merge in
            // request order
            let calls = controller.shrink_outcomes(calls);
            let calls = pipeline.prepare_tool_results(calls).await;
            let tool_count = calls.len();
            for call in calls {
                // Errors stay visible to the model under the Continue policy
                iteration.push_message(Message::tool_result(&call.id, call.outcome.render()));
                iteration.push_tool_call(call);
            }

            iteration.complete();
            let sealed = iteration.clone();
            context
                .append(iteration)
                .map_err(|e| RunError::new(Error::Context(e), context.clone()))?;
            context = pipeline.prepare_context(context).await;
            context = pipeline.on_iteration_complete(&sealed, context).await;
            self.bus.publish(RuntimeEvent::IterationCompleted {
                meta: meta.stamp(),
                number,
                tool_calls: tool_count,
                duration_ms: iteration_started.elapsed().as_millis() as u64,
            });

            // Boundary checks: budget first, then the iteration ceiling
            match monitor.check() {
                BudgetCheck::Halt { used, limit } => {
                    return Err(RunError::new(
                        Error::BudgetExceeded { used, limit },
                        context.clone(),
                    ));
                }
                BudgetCheck::Warn { used, limit, utilization } => {
                    self.bus.publish(RuntimeEvent::BudgetWarning {
                        meta: meta.stamp(),
                        used,
                        limit,
                        utilization,
                    });
                }
                BudgetCheck::Proceed => {}
            }
            if context.current_iteration >= self.config.max_iterations {
                return Err(RunError::new(
                    Error::MaxIterationsExceeded { iterations: context.current_iteration },
                    context.clone(),
                ));
            }
        }
    }

    /// Invoke the provider: a complete call, or a consumed stream when a
    /// sink is attached. A dropped sink cancels the stream immediately.
    async fn call_provider(
        &self,
        request: ProviderRequest,
        sink: Option<&mpsc::Sender<RunStreamEvent>>,
    ) -> Result<ProviderResponse, ProviderError> {
        let Some(tx) = sink else {
            return self.provider.call(request).await;
        };

        let mut rx = self.provider.stream(request).await?;
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        let mut usage = None;
        let mut model = String::new();
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(delta) = &chunk.content {
                if tx.send(RunStreamEvent::Chunk { content: delta.clone() }).await.is_err() {
                    return Err(ProviderError::StreamInterrupted(
                        "consumer dropped the stream".into(),
                    ));
                }
                content.push_str(delta);
            }
            tool_calls.extend(chunk.tool_calls);
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
            if let Some(m) = chunk.model {
                model = m;
            }
            if chunk.done {
                break;
            }
        }

        Ok(ProviderResponse {
            message: Message::assistant_with_tools(content, tool_calls),
            usage,
            model,
            metadata: serde_json::Map::new(),
        })
    }
}

/// User message plus the windowed history, in order. The rendered prompt
/// travels separately as the request's system instruction.
fn assemble_messages(arguments: &serde_json::Value, windowed: &Context) -> Vec<Message> {
    let user_text = arguments
        .get("input")
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap_or_else(|| arguments.to_string());
    let mut messages = vec![Message::user(user_text)];
    messages.extend(windowed.messages().cloned());
    messages
}

fn build_result(
    response: &ProviderResponse,
    config: &RunnerConfig,
    provider: &str,
    tokens_used: u64,
    iterations: u32,
    started_at: chrono::DateTime<Utc>,
    duration: Duration,
) -> RunResult {
    let content = response.message.content.clone();
    let output = match &config.schema {
        Some(_) => serde_json::from_str(&content).unwrap_or(serde_json::Value::String(content)),
        None => serde_json::Value::String(content),
    };
    let thinking = response
        .metadata
        .get("thinking")
        .and_then(|v| v.as_str())
        .map(String::from);

    RunResult {
        output,
        thinking,
        metadata: ResultMetadata {
            provider: provider.to_string(),
            model: response.model.clone(),
            duration_ms: duration.as_millis() as u64,
            tokens_used,
            iterations,
            started_at,
            completed_at: Utc::now(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ironloop_core::config::{ErrorPolicy, TokenBudget};
    use ironloop_core::error::{HookError, ToolError};
    use ironloop_core::message::MessageToolCall;
    use ironloop_core::prompt::StaticPrompt;
    use ironloop_core::provider::Usage;
    use ironloop_core::tool::{ExecutionContext, Tool};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn usage(total: u32) -> Usage {
        Usage { prompt_tokens: total / 2, completion_tokens: total - total / 2, total_tokens: total }
    }

    fn text_response(content: &str, total_tokens: u32) -> ProviderResponse {
        ProviderResponse {
            message: Message::assistant(content),
            usage: Some(usage(total_tokens)),
            model: "mock-1".into(),
            metadata: serde_json::Map::new(),
        }
    }

    fn tool_response(call_id: &str, total_tokens: u32) -> ProviderResponse {
        ProviderResponse {
            message: Message::assistant_with_tools(
                "",
                vec![MessageToolCall::new(call_id, "echo", r#"{"text": "ping"}"#)],
            ),
            usage: Some(usage(total_tokens)),
            model: "mock-1".into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Pops scripted responses; repeats the last one when exhausted.
    /// Records every request it receives.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<ProviderResponse>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ProviderResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn call(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                Ok(responses.pop_front().unwrap())
            } else {
                responses
                    .front()
                    .cloned()
                    .ok_or_else(|| ProviderError::NotConfigured("no scripted response".into()))
            }
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
            _ctx: ExecutionContext,
        ) -> Result<serde_json::Value, ToolError> {
            Ok(serde_json::json!({ "echo": arguments["text"] }))
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        Arc::new(registry)
    }

    fn runner(provider: Arc<dyn Provider>, config: RunnerConfig) -> AgentRunner {
        AgentRunner::new(provider, Arc::new(StaticPrompt::new("You are a test agent.")), config)
            .with_tools(registry())
    }

    #[tokio::test]
    async fn simple_text_response() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("Hello!", 15)]));
        let r = runner(provider, RunnerConfig::new("qa"));

        let result = r.run(serde_json::json!({"input": "Hi"})).await.unwrap();
        assert_eq!(result.output, serde_json::Value::String("Hello!".into()));
        assert_eq!(result.metadata.iterations, 1);
        assert_eq!(result.metadata.tokens_used, 15);
        assert_eq!(result.metadata.provider, "mock");
    }

    #[tokio::test]
    async fn tool_call_then_final_response() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response("c1", 100),
            text_response("pong", 50),
        ]));
        let r = runner(provider.clone(), RunnerConfig::new("qa"));

        let result = r.run(serde_json::json!({"input": "ping"})).await.unwrap();
        assert_eq!(result.metadata.iterations, 2);
        assert_eq!(result.metadata.tokens_used, 150);

        // The second provider call saw the tool result from iteration 1
        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let tool_msgs: Vec<_> = requests[1]
            .messages
            .iter()
            .filter(|m| m.tool_call_id.as_deref() == Some("c1"))
            .collect();
        assert_eq!(tool_msgs.len(), 1);
        assert!(tool_msgs[0].content.contains("ping"));
    }

    #[tokio::test]
    async fn max_iterations_fails_after_nth_sealed_iteration() {
        let provider = Arc::new(ScriptedProvider::new(vec![tool_response("c1", 10)]));
        let mut config = RunnerConfig::new("qa");
        config.max_iterations = 3;
        let r = runner(provider.clone(), config);

        let err = r.run(serde_json::json!({"input": "go"})).await.unwrap_err();
        assert!(matches!(err.kind, Error::MaxIterationsExceeded { iterations: 3 }));
        // Exactly 3 iterations sealed, never a 4th provider call
        assert_eq!(err.context.current_iteration, 3);
        assert_eq!(provider.requests.lock().unwrap().len(), 3);
        for (i, it) in err.context.iterations.iter().enumerate() {
            assert_eq!(it.number as usize, i + 1);
            assert!(it.is_sealed());
        }
    }

    #[tokio::test]
    async fn budget_halt_trips_at_second_boundary() {
        let provider = Arc::new(ScriptedProvider::new(vec![tool_response("c1", 600)]));
        let mut config = RunnerConfig::new("qa");
        config.token_budget = Some(TokenBudget::halt(1000));
        let r = runner(provider, config);

        let err = r.run(serde_json::json!({"input": "go"})).await.unwrap_err();
        assert!(matches!(err.kind, Error::BudgetExceeded { used: 1200, limit: 1000 }));
        // Iteration 1 remains in the partial context
        assert_eq!(err.context.iterations.len(), 2);
        assert_eq!(err.context.iterations[0].number, 1);
    }

    #[tokio::test]
    async fn budget_warn_emits_event_and_continues() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response("c1", 900),
            text_response("done", 100),
        ]));
        let mut config = RunnerConfig::new("qa");
        config.token_budget = Some(TokenBudget::warn(1000));
        let r = runner(provider, config);
        let mut rx = r.event_bus().subscribe();

        let result = r.run(serde_json::json!({"input": "go"})).await.unwrap();
        assert_eq!(result.metadata.iterations, 2);

        let mut warned = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event.as_ref(), RuntimeEvent::BudgetWarning { used: 900, .. }) {
                warned = true;
            }
        }
        assert!(warned, "expected a BudgetWarning event");
    }

    #[tokio::test]
    async fn budget_warn_fires_on_the_final_iteration_boundary() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("done", 900)]));
        let mut config = RunnerConfig::new("qa");
        config.token_budget = Some(TokenBudget::warn(1000));
        let r = runner(provider, config);
        let mut rx = r.event_bus().subscribe();

        let result = r.run(serde_json::json!({"input": "go"})).await.unwrap();
        assert_eq!(result.metadata.iterations, 1);

        let mut warned = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event.as_ref(), RuntimeEvent::BudgetWarning { used: 900, .. }) {
                warned = true;
            }
        }
        assert!(warned, "expected a BudgetWarning at the final boundary");
    }

    #[tokio::test]
    async fn halt_limit_on_a_completed_final_iteration_is_not_a_failure() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("done", 1500)]));
        let mut config = RunnerConfig::new("qa");
        config.token_budget = Some(TokenBudget::halt(1000));
        let r = runner(provider, config);

        let result = r.run(serde_json::json!({"input": "go"})).await.unwrap();
        assert_eq!(result.output, serde_json::Value::String("done".into()));
    }

    struct FailingContextHook;

    #[async_trait]
    impl Hook for FailingContextHook {
        fn name(&self) -> &str {
            "failing_context"
        }
        async fn prepare_context(&self, _context: Context) -> Result<Context, HookError> {
            Err(HookError::failed("failing_context", "broken"))
        }
    }

    #[tokio::test]
    async fn failing_prepare_context_hook_is_a_noop() {
        let mut config = RunnerConfig::new("qa");
        config.max_iterations = 2;

        let baseline_provider = Arc::new(ScriptedProvider::new(vec![tool_response("c1", 10)]));
        let baseline = runner(baseline_provider, config.clone());
        let baseline_err = baseline.run(serde_json::json!({"input": "go"})).await.unwrap_err();

        let hooked_provider = Arc::new(ScriptedProvider::new(vec![tool_response("c1", 10)]));
        let hooked = runner(hooked_provider, config).with_hook(Arc::new(FailingContextHook));
        let hooked_err = hooked.run(serde_json::json!({"input": "go"})).await.unwrap_err();

        // Hook failure is a no-op, not a data-loss event
        assert_eq!(
            baseline_err.context.iterations.len(),
            hooked_err.context.iterations.len()
        );
        for (a, b) in baseline_err
            .context
            .iterations
            .iter()
            .zip(hooked_err.context.iterations.iter())
        {
            assert_eq!(a.number, b.number);
            assert_eq!(a.messages.len(), b.messages.len());
            assert_eq!(a.tool_calls.len(), b.tool_calls.len());
        }
    }

    struct StopAfterHook {
        stop_at: u32,
    }

    #[async_trait]
    impl Hook for StopAfterHook {
        fn name(&self) -> &str {
            "stop_after"
        }
        async fn on_iteration_start(
            &self,
            info: &IterationInfo,
            context: Context,
        ) -> Result<Context, HookError> {
            if info.number > self.stop_at {
                Err(HookError::stop("stop_after", "done intent detected"))
            } else {
                Ok(context)
            }
        }
    }

    #[tokio::test]
    async fn iteration_start_hook_stops_the_loop() {
        let provider = Arc::new(ScriptedProvider::new(vec![tool_response("c1", 10)]));
        let r = runner(provider, RunnerConfig::new("qa"))
            .with_hook(Arc::new(StopAfterHook { stop_at: 1 }));

        let err = r.run(serde_json::json!({"input": "go"})).await.unwrap_err();
        assert!(matches!(err.kind, Error::Hook(HookError::Stop { .. })));
        // One full iteration ran before the hook stopped the second
        assert_eq!(err.context.current_iteration, 1);
    }

    #[tokio::test]
    async fn tool_error_is_surfaced_to_the_next_provider_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ProviderResponse {
                message: Message::assistant_with_tools(
                    "",
                    vec![MessageToolCall::new("c1", "nonexistent", "{}")],
                ),
                usage: Some(usage(10)),
                model: "mock-1".into(),
                metadata: serde_json::Map::new(),
            },
            text_response("recovered", 10),
        ]));
        let mut config = RunnerConfig::new("qa");
        config.on_error = ErrorPolicy::Continue;
        let r = runner(provider.clone(), config);

        let result = r.run(serde_json::json!({"input": "go"})).await.unwrap();
        assert_eq!(result.output, serde_json::Value::String("recovered".into()));

        let requests = provider.requests.lock().unwrap();
        let surfaced = requests[1]
            .messages
            .iter()
            .any(|m| m.tool_call_id.as_deref() == Some("c1") && m.content.starts_with("Error:"));
        assert!(surfaced, "continued tool error must be visible to the model");
    }

    #[tokio::test]
    async fn halt_policy_fails_the_invocation_on_tool_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![ProviderResponse {
            message: Message::assistant_with_tools(
                "",
                vec![MessageToolCall::new("c1", "nonexistent", "{}")],
            ),
            usage: Some(usage(10)),
            model: "mock-1".into(),
            metadata: serde_json::Map::new(),
        }]));
        let mut config = RunnerConfig::new("qa");
        config.on_error = ErrorPolicy::Halt;
        let r = runner(provider, config);

        let err = r.run(serde_json::json!({"input": "go"})).await.unwrap_err();
        assert!(matches!(err.kind, Error::Tool(_)));
    }

    #[tokio::test]
    async fn sliding_window_limits_messages_sent_to_provider() {
        let provider = Arc::new(ScriptedProvider::new(vec![tool_response("c1", 10)]));
        let mut config = RunnerConfig::new("qa");
        config.max_iterations = 3;
        config.disclosure.window_size = Some(1);
        let r = runner(provider.clone(), config);

        let _ = r.run(serde_json::json!({"input": "go"})).await;

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        // Each iteration adds 2 messages (assistant + tool result); with a
        // window of 1 the third call sees user + one iteration only
        assert_eq!(requests[2].messages.len(), 3);
    }

    #[tokio::test]
    async fn without_window_full_history_is_sent() {
        let provider = Arc::new(ScriptedProvider::new(vec![tool_response("c1", 10)]));
        let mut config = RunnerConfig::new("qa");
        config.max_iterations = 3;
        let r = runner(provider.clone(), config);

        let _ = r.run(serde_json::json!({"input": "go"})).await;

        let requests = provider.requests.lock().unwrap();
        // user + 2 iterations × 2 messages
        assert_eq!(requests[2].messages.len(), 5);
    }

    #[tokio::test]
    async fn invalid_config_fails_fast() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("x", 1)]));
        let mut config = RunnerConfig::new("qa");
        config.disclosure.truncate = Some(0);
        let r = runner(provider.clone(), config);

        let err = r.run(serde_json::json!({"input": "go"})).await.unwrap_err();
        assert!(matches!(err.kind, Error::Validation(_)));
        // No provider spend on a config error
        assert!(provider.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn streamed_run_ends_with_exactly_one_terminal_event() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response("c1", 10),
            text_response("streamed answer", 10),
        ]));
        let r = runner(provider, RunnerConfig::new("qa"));

        let mut rx = r.run_streamed(serde_json::json!({"input": "go"}));
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        let terminals: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminals.len(), 1);
        match terminals[0] {
            RunStreamEvent::Done { result } => {
                assert_eq!(result.output, serde_json::Value::String("streamed answer".into()));
                assert_eq!(result.metadata.iterations, 2);
                // The model travels through the stream's final chunk
                assert_eq!(result.metadata.model, "mock-1");
            }
            other => panic!("expected Done, got {other:?}"),
        }
        assert!(events.iter().any(|e| matches!(e, RunStreamEvent::ToolCall { .. })));
        assert!(events.iter().any(|e| matches!(e, RunStreamEvent::ToolResult { .. })));
    }

    #[tokio::test]
    async fn streamed_failure_ends_with_error_event() {
        let provider = Arc::new(ScriptedProvider::new(vec![tool_response("c1", 10)]));
        let mut config = RunnerConfig::new("qa");
        config.max_iterations = 1;
        let r = runner(provider, config);

        let mut rx = r.run_streamed(serde_json::json!({"input": "go"}));
        let mut terminal = None;
        while let Some(event) = rx.recv().await {
            if event.is_terminal() {
                terminal = Some(event);
            }
        }
        match terminal {
            Some(RunStreamEvent::Error { message }) => {
                assert!(message.contains("Maximum iterations"));
            }
            other => panic!("expected Error terminal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncation_applies_to_tool_outcomes_in_context() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ProviderResponse {
                message: Message::assistant_with_tools(
                    "",
                    vec![MessageToolCall::new(
                        "c1",
                        "echo",
                        &format!(r#"{{"text": "{}"}}"#, "a".repeat(400)),
                    )],
                ),
                usage: Some(usage(10)),
                model: "mock-1".into(),
                metadata: serde_json::Map::new(),
            },
            text_response("done", 10),
        ]));
        let mut config = RunnerConfig::new("qa");
        config.disclosure.truncate = Some(20);
        let r = runner(provider.clone(), config);

        let result = r.run(serde_json::json!({"input": "go"})).await.unwrap();
        assert_eq!(result.metadata.iterations, 2);

        // The tool result forwarded to the model is bounded
        let requests = provider.requests.lock().unwrap();
        let tool_msg = requests[1]
            .messages
            .iter()
            .find(|m| m.tool_call_id.as_deref() == Some("c1"))
            .unwrap();
        assert!(tool_msg.content.len() < 400);
        assert!(tool_msg.content.contains("truncated"));
    }
}
