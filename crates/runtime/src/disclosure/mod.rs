//! Progressive disclosure — keeping accumulated context within budget.
//!
//! Large tool outputs and long histories are shrunk by pure, composable
//! transforms (truncate, summarize, sample) plus a sliding-window
//! compaction over the iteration log. The goal is to stay within the token
//! budget without losing task-relevant signal.

pub mod controller;
pub mod processors;

pub use controller::{compact, DisclosureController};
pub use processors::{sample, summarize, truncate, DEFAULT_MARKER};
