//! Mention detection and dispatch.
//!
//! A chat message reaches the AI path when it contains the literal
//! trigger `@ai ` (any case) anywhere in its text. All trigger
//! occurrences are stripped and the remainder, trimmed, becomes the
//! prompt. A message that is nothing but triggers fails deterministically
//! instead of sending an empty prompt to the backend.

use std::sync::Arc;

use regex::Regex;

use crate::errors::DispatchError;

use super::GenerationBackend;

/// The literal marker that routes a message to the AI path.
pub const MENTION_TRIGGER: &str = "@ai ";

/// Detects mentions and invokes the generation backend.
pub struct MentionDispatcher {
    backend: Arc<dyn GenerationBackend>,
    trigger: Regex,
}

impl MentionDispatcher {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            trigger: Regex::new(r"(?i)@ai ").expect("trigger pattern is valid"),
        }
    }

    /// Derive the prompt from a message.
    ///
    /// `None` when the text carries no mention; `Err(EmptyPrompt)` when
    /// stripping the trigger leaves nothing.
    pub fn prompt_of(&self, text: &str) -> Option<Result<String, DispatchError>> {
        if !self.trigger.is_match(text) {
            return None;
        }
        let prompt = self.trigger.replace_all(text, "").trim().to_string();
        Some(if prompt.is_empty() {
            Err(DispatchError::EmptyPrompt)
        } else {
            Ok(prompt)
        })
    }

    /// Evaluate a message: detect the mention, invoke the backend, and
    /// return the raw reply text. `Ok(None)` means the message is not an
    /// AI request at all.
    pub async fn handle(&self, text: &str) -> Result<Option<String>, DispatchError> {
        let Some(prompt) = self.prompt_of(text).transpose()? else {
            return Ok(None);
        };
        let reply = self
            .backend
            .generate(&prompt)
            .await
            .map_err(|e| DispatchError::Backend(e.to_string()))?;
        Ok(Some(reply))
    }
}
