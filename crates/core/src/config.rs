//! Runtime configuration surface.
//!
//! Owned by the (out-of-scope) definition layer; consumed read-only by the
//! runtime. Validation fails fast at setup, never mid-run.

use serde::{Deserialize, Serialize};

/// Policy applied when cumulative token usage crosses the configured limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStrategy {
    /// Exceeding the limit terminates the invocation
    #[default]
    Halt,
    /// Crossing the warn threshold emits a warning, the loop continues
    Warn,
}

/// Policy applied when a tool call ends in an error outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// The error becomes part of the context and the loop proceeds
    #[default]
    Continue,
    /// The first tool error aborts the invocation
    Halt,
}

/// Token budget for one invocation. Read-only during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBudget {
    /// Cumulative input+output token limit
    pub limit: u64,

    /// What to do when the limit (or warn threshold) is crossed
    #[serde(default)]
    pub strategy: BudgetStrategy,

    /// Fraction of the limit at which `Warn` fires
    #[serde(default = "default_warn_threshold")]
    pub warn_threshold: f64,
}

fn default_warn_threshold() -> f64 {
    0.8
}

impl TokenBudget {
    pub fn halt(limit: u64) -> Self {
        Self { limit, strategy: BudgetStrategy::Halt, warn_threshold: default_warn_threshold() }
    }

    pub fn warn(limit: u64) -> Self {
        Self { limit, strategy: BudgetStrategy::Warn, warn_threshold: default_warn_threshold() }
    }
}

/// Progressive disclosure options, configured per invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisclosureConfig {
    /// Truncate tool outputs to this many characters/items/keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncate: Option<usize>,

    /// Reduce complex tool outputs to descriptive summaries
    #[serde(default)]
    pub summarize: bool,

    /// Keep only the first `n` elements of sequence outputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<usize>,

    /// Keep only the most recent iterations for the next provider call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_size: Option<usize>,
}

impl DisclosureConfig {
    /// True when no shrinking strategy is configured.
    pub fn is_noop(&self) -> bool {
        self.truncate.is_none() && !self.summarize && self.sample.is_none()
    }
}

/// Configuration consumed by the runtime loop for one agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Agent identifier (carried on every observability event)
    pub agent: String,

    /// Client identifier (carried on every observability event)
    #[serde(default)]
    pub client: String,

    /// Iteration ceiling per invocation
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Per-tool-call timeout in milliseconds
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,

    /// Bounded retry count for transient tool failures
    #[serde(default)]
    pub max_retries: u32,

    /// Fan-out limit for concurrent tool dispatch within one iteration
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Tool error policy
    #[serde(default)]
    pub on_error: ErrorPolicy,

    /// Optional token budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_budget: Option<TokenBudget>,

    /// Progressive disclosure options
    #[serde(default)]
    pub disclosure: DisclosureConfig,

    /// Expected output schema, passed through to the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_tool_timeout_ms() -> u64 {
    30_000
}
fn default_max_concurrency() -> usize {
    4
}

impl RunnerConfig {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            client: String::new(),
            max_iterations: default_max_iterations(),
            tool_timeout_ms: default_tool_timeout_ms(),
            max_retries: 0,
            max_concurrency: default_max_concurrency(),
            on_error: ErrorPolicy::default(),
            token_budget: None,
            disclosure: DisclosureConfig::default(),
            schema: None,
        }
    }

    /// Validate the configuration. Bad sizes are programming/config errors
    /// and are rejected before any iteration runs.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_iterations == 0 {
            return Err("max_iterations must be at least 1".into());
        }
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be at least 1".into());
        }
        if self.tool_timeout_ms == 0 {
            return Err("tool_timeout_ms must be positive".into());
        }
        if self.disclosure.truncate == Some(0) {
            return Err("disclosure.truncate must be a positive size".into());
        }
        if self.disclosure.sample == Some(0) {
            return Err("disclosure.sample must be a positive count".into());
        }
        if self.disclosure.window_size == Some(0) {
            return Err("disclosure.window_size must be a positive count".into());
        }
        if let Some(budget) = &self.token_budget {
            if budget.limit == 0 {
                return Err("token_budget.limit must be positive".into());
            }
            if !(0.0..=1.0).contains(&budget.warn_threshold) {
                return Err("token_budget.warn_threshold must be within 0.0..=1.0".into());
            }
        }
        Ok(())
    }
}
