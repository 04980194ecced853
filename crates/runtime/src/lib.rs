//! The IronLoop execution runtime — the heart of the system.
//!
//! An invocation follows a **Render → Call → Dispatch → Compact** cycle:
//!
//! 1. **Render** the instruction prompt against the accumulated context
//! 2. **Call** the configured provider with messages and the tool manifest
//! 3. **If tool calls**: dispatch the batch, merge outcomes in request
//!    order, seal the iteration, loop back to step 1
//! 4. **If text response**: seal the final iteration and return the result
//!
//! The loop continues until the LLM responds with text only, a hook stops
//! it, the token budget is exhausted, or the iteration ceiling is reached.

pub mod budget;
pub mod disclosure;
pub mod dispatch;
pub mod hooks;
pub mod runner;
pub mod stream_event;
pub mod token;

pub use budget::{BudgetCheck, BudgetMonitor};
pub use disclosure::{compact, sample, summarize, truncate, DisclosureController};
pub use dispatch::{DispatchOptions, ToolDispatcher};
pub use hooks::HookPipeline;
pub use runner::AgentRunner;
pub use stream_event::RunStreamEvent;
