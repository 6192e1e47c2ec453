//! Chat request and reply types.
//!
//! The advisor keeps no session. Whatever it needs from an earlier turn (the
//! confirmed monthly income) travels in [`ContinuationState`], which the
//! caller echoes back on the next request.

use crate::error::{AdvisorError, FailureReason, StageError};
use crate::pipeline::llm::{ChatRole, ChatTurn, LlmBackend};
use crate::salary::{IncomeSource, MonthlyIncome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Longest conversation accepted in one request.
pub const MAX_MESSAGES: usize = 50;

/// Longest single message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 8_000;

/// A base64 document attached to a chat request.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpload {
    pub mime_type: String,
    pub data_base64: String,
}

impl std::fmt::Debug for DocumentUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentUpload")
            .field("mime_type", &self.mime_type)
            .field("encoded_len", &self.data_base64.len())
            .finish()
    }
}

/// Request-scoped state carried by the caller between turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationState {
    pub monthly_income: f64,
    pub income_source: IncomeSource,
    pub currency: String,
}

impl ContinuationState {
    pub fn new(income: &MonthlyIncome, currency: impl Into<String>) -> Self {
        Self {
            monthly_income: income.amount,
            income_source: income.source,
            currency: currency.into(),
        }
    }

    fn validate(&self) -> Result<(), AdvisorError> {
        if !self.monthly_income.is_finite() || self.monthly_income < 0.0 {
            return Err(AdvisorError::invalid("state.monthlyIncome must be a non-negative number"));
        }
        let c = self.currency.as_str();
        if c.len() != 3 || !c.chars().all(|ch| ch.is_ascii_uppercase()) {
            return Err(AdvisorError::invalid("state.currency must be a 3-letter ISO code"));
        }
        Ok(())
    }
}

/// One inbound chat turn: messages, optionally a document, optionally state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentUpload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ContinuationState>,
}

impl ChatRequest {
    /// Check the request shape before anything external is called.
    ///
    /// A request carrying a document may have no messages. Otherwise the
    /// conversation must be non-empty and end with a user turn.
    pub fn validate(&self) -> Result<(), AdvisorError> {
        if self.messages.len() > MAX_MESSAGES {
            return Err(AdvisorError::invalid(format!(
                "at most {MAX_MESSAGES} messages are accepted, got {}",
                self.messages.len()
            )));
        }
        for (i, turn) in self.messages.iter().enumerate() {
            if turn.content.trim().is_empty() {
                return Err(AdvisorError::invalid(format!("message {i} is empty")));
            }
            if turn.content.chars().count() > MAX_MESSAGE_CHARS {
                return Err(AdvisorError::invalid(format!(
                    "message {i} exceeds {MAX_MESSAGE_CHARS} characters"
                )));
            }
            if turn.role == ChatRole::System {
                return Err(AdvisorError::invalid(format!(
                    "message {i}: system messages are not accepted"
                )));
            }
        }

        if self.document.is_none() {
            match self.messages.last() {
                None => return Err(AdvisorError::invalid("no messages and no document")),
                Some(last) if last.role != ChatRole::User => {
                    return Err(AdvisorError::invalid("the last message must be from the user"));
                }
                Some(_) => {}
            }
        }

        if let Some(state) = &self.state {
            state.validate()?;
        }
        Ok(())
    }
}

/// The advisor's answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorReply {
    /// User-safe text. Never contains a reason code or PII.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ContinuationState>,
    /// Set when the request did not succeed. Kept out of the wire format.
    #[serde(skip)]
    pub failure: Option<FailureReason>,
}

impl AdvisorReply {
    pub fn success(message: impl Into<String>, state: Option<ContinuationState>) -> Self {
        Self {
            message: message.into(),
            state,
            failure: None,
        }
    }

    /// A failure reply; the caller's state is echoed back untouched.
    pub fn failure(reason: FailureReason, state: Option<ContinuationState>) -> Self {
        Self {
            message: reason.user_message().to_string(),
            state,
            failure: Some(reason),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Free-form advisor model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn reply(&self, turns: &[ChatTurn]) -> Result<String, StageError>;

    fn is_configured(&self) -> bool {
        true
    }
}

/// [`ChatModel`] backed by an [`LlmBackend`].
#[derive(Debug, Clone)]
pub struct LlmChatModel {
    backend: LlmBackend,
}

impl LlmChatModel {
    pub fn new(backend: LlmBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ChatModel for LlmChatModel {
    async fn reply(&self, turns: &[ChatTurn]) -> Result<String, StageError> {
        self.backend.call_turns(turns).await
    }

    fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }
}
