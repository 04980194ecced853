//! Prompt rendering collaborator contract.
//!
//! How prompts are templated is out of scope for the runtime; it only needs
//! something that can turn caller arguments plus the current context into an
//! instruction string.

use thiserror::Error;

use crate::context::Context;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct RenderError(pub String);

/// Renders the instruction/system prompt for one provider call.
pub trait PromptTemplate: Send + Sync {
    fn render(
        &self,
        arguments: &serde_json::Value,
        context: &Context,
    ) -> std::result::Result<String, RenderError>;
}

/// A fixed prompt, independent of arguments and context.
pub struct StaticPrompt(pub String);

impl StaticPrompt {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self(prompt.into())
    }
}

impl PromptTemplate for StaticPrompt {
    fn render(
        &self,
        _arguments: &serde_json::Value,
        _context: &Context,
    ) -> std::result::Result<String, RenderError> {
        Ok(self.0.clone())
    }
}
