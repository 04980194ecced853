//! # IronLoop Core
//!
//! Domain types, traits, and error definitions for the IronLoop agent
//! execution runtime. This crate has **zero framework dependencies** — it
//! defines the domain model that the runtime crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here: the LLM backend
//! (`Provider`), invocable units (`Tool`), prompt rendering
//! (`PromptTemplate`), and extension points (`Hook`). Implementations live
//! outside the runtime. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (the runtime depends inward on core)

pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod hook;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use config::{BudgetStrategy, DisclosureConfig, ErrorPolicy, RunnerConfig, TokenBudget};
pub use context::{Context, Iteration, ResultMetadata, RunResult};
pub use error::{Error, HookError, ProviderError, Result, RunError, ToolError};
pub use event::{EventBus, EventMeta, RuntimeEvent};
pub use hook::{Hook, IterationInfo};
pub use message::{Message, MessageToolCall, Role};
pub use prompt::{PromptTemplate, RenderError, StaticPrompt};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use tool::{ExecutionContext, Tool, ToolCall, ToolDefinition, ToolOutcome, ToolRegistry};
