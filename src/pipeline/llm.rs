//! Model interaction: one timeout-bounded call into an `LLMProvider`.
//!
//! OCR, structured extraction and chat all funnel through [`LlmBackend::call`].
//! It is intentionally thin: prompts live in [`crate::prompts`], parsing in
//! [`crate::pipeline::extract`]. This module only owns the provider handle,
//! the completion options and the timeout.
//!
//! ## No retries
//!
//! A failed call is reported once as a [`StageError`]. Whether to retry is the
//! caller's product decision; the pipeline itself stays strictly linear.
//!
//! ## Logging
//!
//! Only token counts, lengths and durations are logged. Request and response
//! bodies carry document content and are never written to the log.

use crate::config::AdvisorConfig;
use crate::error::StageError;
use crate::progress::Stage;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// Speaker of one chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A provider-independent chat message.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }

    fn to_message(&self) -> ChatMessage {
        match self.role {
            ChatRole::System => ChatMessage::system(&self.content),
            ChatRole::User => ChatMessage::user(&self.content),
            ChatRole::Assistant => ChatMessage::assistant(&self.content),
        }
    }
}

// Content is user text; keep it out of debug output.
impl fmt::Debug for ChatTurn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatTurn")
            .field("role", &self.role)
            .field("content_len", &self.content.len())
            .finish()
    }
}

/// A provider handle bound to one stage, with its options and timeout.
///
/// `provider` is `None` when provider resolution failed at startup; every call
/// then reports [`StageError::NotConfigured`] instead of the process refusing
/// to start.
#[derive(Clone)]
pub struct LlmBackend {
    provider: Option<Arc<dyn LLMProvider>>,
    missing_hint: String,
    stage: Stage,
    options: CompletionOptions,
    timeout_secs: u64,
}

impl fmt::Debug for LlmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmBackend")
            .field("stage", &self.stage)
            .field("configured", &self.provider.is_some())
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl LlmBackend {
    /// Bind a resolved provider to `stage`.
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        stage: Stage,
        timeout_secs: u64,
        config: &AdvisorConfig,
    ) -> Self {
        Self {
            provider: Some(provider),
            missing_hint: String::new(),
            stage,
            options: build_options(config),
            timeout_secs,
        }
    }

    /// A backend whose every call fails with [`StageError::NotConfigured`].
    pub fn unconfigured(
        stage: Stage,
        hint: impl Into<String>,
        timeout_secs: u64,
        config: &AdvisorConfig,
    ) -> Self {
        Self {
            provider: None,
            missing_hint: hint.into(),
            stage,
            options: build_options(config),
            timeout_secs,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Send `messages` and return the response text.
    pub async fn call(&self, messages: &[ChatMessage]) -> Result<String, StageError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| StageError::NotConfigured {
                stage: self.stage,
                hint: self.missing_hint.clone(),
            })?;

        let start = Instant::now();
        let response = timeout(
            Duration::from_secs(self.timeout_secs),
            provider.chat(messages, Some(&self.options)),
        )
        .await
        .map_err(|_| {
            warn!(stage = %self.stage, secs = self.timeout_secs, "model call timed out");
            StageError::Timeout {
                stage: self.stage,
                secs: self.timeout_secs,
            }
        })?
        .map_err(|e| {
            warn!(stage = %self.stage, "model call failed: {}", e);
            StageError::Unavailable {
                stage: self.stage,
                detail: e.to_string(),
            }
        })?;

        debug!(
            stage = %self.stage,
            input_tokens = response.prompt_tokens,
            output_tokens = response.completion_tokens,
            response_len = response.content.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "model call complete"
        );

        if response.content.trim().is_empty() {
            return Err(StageError::EmptyResponse { stage: self.stage });
        }
        Ok(response.content)
    }

    /// Convenience wrapper for provider-independent turns.
    pub async fn call_turns(&self, turns: &[ChatTurn]) -> Result<String, StageError> {
        let messages: Vec<ChatMessage> = turns.iter().map(ChatTurn::to_message).collect();
        self.call(&messages).await
    }
}

/// Build `CompletionOptions` from the advisor config.
fn build_options(config: &AdvisorConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = AdvisorConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(2048));
    }

    #[tokio::test]
    async fn unconfigured_backend_reports_not_configured() {
        let config = AdvisorConfig::default();
        let backend = LlmBackend::unconfigured(Stage::Ocr, "set OPENAI_API_KEY", 5, &config);
        assert!(!backend.is_configured());

        let err = backend
            .call_turns(&[ChatTurn::user("hello")])
            .await
            .unwrap_err();
        match err {
            StageError::NotConfigured { stage, hint } => {
                assert_eq!(stage, Stage::Ocr);
                assert!(hint.contains("OPENAI_API_KEY"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn chat_turn_debug_hides_content() {
        let turn = ChatTurn::user("my IBAN is AE070331234567890123456");
        assert!(!format!("{turn:?}").contains("AE07"));
    }
}
