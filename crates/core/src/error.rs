//! Error types for the IronLoop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; expected failure paths are
//! always values (`Result`/`ToolOutcome`), never panics.

use thiserror::Error;

use crate::context::Context;

/// The top-level error type for all runtime operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Input / configuration validation ---
    #[error("Validation error: {0}")]
    Validation(String),

    // --- Prompt rendering ---
    #[error("Render error: {0}")]
    Render(#[from] crate::prompt::RenderError),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Hook errors ---
    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    // --- Context store errors ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    // --- Budget / iteration ceilings ---
    #[error("Token budget exceeded: {used} tokens used, limit is {limit}")]
    BudgetExceeded { used: u64, limit: u64 },

    #[error("Maximum iterations exceeded: {iterations} iterations completed")]
    MaxIterationsExceeded { iterations: u32 },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// A terminal invocation failure.
///
/// Fatal conditions never discard accumulated state: the partial `Context`
/// travels with the typed error so callers can inspect what happened up to
/// the point of failure.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct RunError {
    /// What went wrong.
    #[source]
    pub kind: Error,

    /// The iterations accumulated before the failure.
    pub context: Context,
}

impl RunError {
    pub fn new(kind: Error, context: Context) -> Self {
        Self { kind, context }
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("Transient failure: {tool_name} — {reason}")]
    Transient { tool_name: String, reason: String },

    #[error("Missing required parameters: [{}]", missing.join(", "))]
    MissingParameters { tool_name: String, missing: Vec<String> },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

impl ToolError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transient { .. })
    }
}

#[derive(Debug, Clone, Error)]
pub enum HookError {
    /// The designated stopping-condition signal from `on_iteration_start`.
    #[error("Stop requested by hook '{hook}': {reason}")]
    Stop { hook: String, reason: String },

    /// A hook implementation failed; recoverable everywhere except
    /// `on_iteration_start`.
    #[error("Hook '{hook}' failed: {reason}")]
    Failed { hook: String, reason: String },
}

impl HookError {
    pub fn stop(hook: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Stop { hook: hook.into(), reason: reason.into() }
    }

    pub fn failed(hook: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed { hook: hook.into(), reason: reason.into() }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ContextError {
    #[error("Non-contiguous iteration number: expected {expected}, got {got}")]
    NonContiguous { expected: u32, got: u32 },

    #[error("Iteration {0} appended before being sealed")]
    Unsealed(u32),
}
