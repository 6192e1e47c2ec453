//! Error types for the mortgage-advisor library.
//!
//! Three distinct types reflect three distinct failure modes:
//!
//! * [`AdvisorError`]: **Fatal / caller**: the request cannot even enter the
//!   pipeline (unreadable file, unsupported MIME type, provider misconfigured,
//!   invalid builder settings). Returned as `Err(AdvisorError)`.
//!
//! * [`StageError`]: **External stage**: an OCR or reasoning call failed
//!   (credential missing, service unreachable, timeout). Never shown to the
//!   end user; the orchestration converts it into a [`FailureReason`].
//!
//! * [`FailureReason`]: **Pipeline outcome**: the user-facing taxonomy. A
//!   validation-gate block is one of these, not an error: it is an expected,
//!   designed-for branch of the pipeline.

use crate::progress::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the mortgage-advisor library.
#[derive(Debug, Error)]
pub enum AdvisorError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The caller-supplied payload is malformed.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// Declared MIME type is not an image format or PDF.
    #[error("Unsupported document type '{mime}': upload an image (PNG, JPEG, WebP, GIF, HEIC) or a PDF")]
    UnsupportedMimeType { mime: String },

    /// The bytes do not look like the declared MIME type.
    #[error("Document content does not match its declared type '{declared}' (looks like {detected})")]
    MimeMismatch { declared: String, detected: String },

    /// Document is larger than the configured maximum.
    #[error("Document is {size} bytes; the limit is {limit} bytes")]
    DocumentTooLarge { size: usize, limit: usize },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AdvisorError {
    /// Shorthand for [`AdvisorError::InvalidInput`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        AdvisorError::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Whether this error describes a bad caller payload (as opposed to a
    /// local I/O or configuration problem).
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            AdvisorError::InvalidInput { .. }
                | AdvisorError::UnsupportedMimeType { .. }
                | AdvisorError::MimeMismatch { .. }
                | AdvisorError::DocumentTooLarge { .. }
        )
    }
}

/// Failure of one external pipeline stage.
///
/// The `detail` strings come from the provider SDK. They are logged for
/// operators but never forwarded to the end user.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// No provider / credential is configured for this stage.
    #[error("{stage} stage is not configured: {hint}")]
    NotConfigured { stage: Stage, hint: String },

    /// The external service could not be reached or returned an error.
    #[error("{stage} stage unavailable: {detail}")]
    Unavailable { stage: Stage, detail: String },

    /// The external call exceeded its timeout.
    #[error("{stage} stage timed out after {secs}s")]
    Timeout { stage: Stage, secs: u64 },

    /// The service answered with no content at all.
    #[error("{stage} stage returned an empty response")]
    EmptyResponse { stage: Stage },
}

impl StageError {
    /// The stage that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            StageError::NotConfigured { stage, .. }
            | StageError::Unavailable { stage, .. }
            | StageError::Timeout { stage, .. }
            | StageError::EmptyResponse { stage } => *stage,
        }
    }
}

/// Why a document (or chat) request did not succeed.
///
/// Serialises as the snake_case reason code used in logs and in the
/// structured CLI output. The code itself is internal; callers show
/// [`FailureReason::user_message`] to end users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// OCR service unreachable or its credential is absent.
    OcrUnavailable,
    /// The validation gate found PII in the scrubbed text.
    PiiDetectedAfterScrub,
    /// The reasoning model's answer violated the JSON contract.
    MalformedModelOutput,
    /// The model decided the document is not a salary document.
    NotASalaryDocument,
    /// The caller's payload was rejected before any external call.
    InvalidInput,
    /// The reasoning service was unreachable or unconfigured.
    ModelUnavailable,
    /// An external stage exceeded its timeout.
    Timeout,
}

impl FailureReason {
    /// The internal reason code, e.g. `pii_detected_after_scrub`.
    pub fn code(self) -> &'static str {
        match self {
            FailureReason::OcrUnavailable => "ocr_unavailable",
            FailureReason::PiiDetectedAfterScrub => "pii_detected_after_scrub",
            FailureReason::MalformedModelOutput => "malformed_model_output",
            FailureReason::NotASalaryDocument => "not_a_salary_document",
            FailureReason::InvalidInput => "invalid_input",
            FailureReason::ModelUnavailable => "model_unavailable",
            FailureReason::Timeout => "timeout",
        }
    }

    /// Text that is safe to show to the end user.
    ///
    /// Never names the reason code, the offending PII kind, or any content
    /// from the document.
    pub fn user_message(self) -> &'static str {
        match self {
            FailureReason::OcrUnavailable => {
                "Document reading is temporarily unavailable. Please try again later."
            }
            FailureReason::PiiDetectedAfterScrub => {
                "We couldn't safely extract data from this document. Please try another document."
            }
            FailureReason::MalformedModelOutput => {
                "Something went wrong while reading your salary details. Please try again."
            }
            FailureReason::NotASalaryDocument => {
                "This doesn't look like a salary certificate or payslip. Please upload a salary document."
            }
            FailureReason::InvalidInput => {
                "That request couldn't be processed. Please send a message or upload an image or PDF document."
            }
            FailureReason::ModelUnavailable => {
                "The advisor is temporarily unavailable. Please try again later."
            }
            FailureReason::Timeout => "That took too long to process. Please try again.",
        }
    }

    /// Map a stage failure onto the taxonomy.
    ///
    /// Timeouts are classified as such regardless of stage; any other OCR
    /// failure is `ocr_unavailable` and any other reasoning failure is
    /// `model_unavailable`.
    pub fn from_stage_error(err: &StageError) -> Self {
        match err {
            StageError::Timeout { .. } => FailureReason::Timeout,
            StageError::EmptyResponse {
                stage: Stage::Extraction,
            } => FailureReason::MalformedModelOutput,
            other => match other.stage() {
                Stage::Ocr => FailureReason::OcrUnavailable,
                _ => FailureReason::ModelUnavailable,
            },
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_snake_case() {
        assert_eq!(
            serde_json::to_string(&FailureReason::PiiDetectedAfterScrub).unwrap(),
            "\"pii_detected_after_scrub\""
        );
        assert_eq!(FailureReason::OcrUnavailable.to_string(), "ocr_unavailable");
    }

    #[test]
    fn user_messages_never_leak_codes() {
        for reason in [
            FailureReason::OcrUnavailable,
            FailureReason::PiiDetectedAfterScrub,
            FailureReason::MalformedModelOutput,
            FailureReason::NotASalaryDocument,
            FailureReason::InvalidInput,
            FailureReason::ModelUnavailable,
            FailureReason::Timeout,
        ] {
            let msg = reason.user_message();
            assert!(!msg.contains(reason.code()), "got: {msg}");
            assert!(!msg.contains('_'), "got: {msg}");
        }
    }

    #[test]
    fn pii_block_message_does_not_name_a_field() {
        let msg = FailureReason::PiiDetectedAfterScrub.user_message().to_lowercase();
        for word in ["iban", "email", "phone", "passport", "emirates"] {
            assert!(!msg.contains(word), "got: {msg}");
        }
    }

    #[test]
    fn stage_errors_map_to_taxonomy() {
        let ocr_down = StageError::Unavailable {
            stage: Stage::Ocr,
            detail: "connection refused".into(),
        };
        assert_eq!(
            FailureReason::from_stage_error(&ocr_down),
            FailureReason::OcrUnavailable
        );

        let no_key = StageError::NotConfigured {
            stage: Stage::Ocr,
            hint: "OPENAI_API_KEY".into(),
        };
        assert_eq!(
            FailureReason::from_stage_error(&no_key),
            FailureReason::OcrUnavailable
        );

        let slow = StageError::Timeout {
            stage: Stage::Extraction,
            secs: 30,
        };
        assert_eq!(FailureReason::from_stage_error(&slow), FailureReason::Timeout);

        let silent = StageError::EmptyResponse {
            stage: Stage::Extraction,
        };
        assert_eq!(
            FailureReason::from_stage_error(&silent),
            FailureReason::MalformedModelOutput
        );
    }

    #[test]
    fn mime_mismatch_display() {
        let e = AdvisorError::MimeMismatch {
            declared: "application/pdf".into(),
            detected: "image/png".into(),
        };
        assert!(e.to_string().contains("application/pdf"));
        assert!(e.is_invalid_input());
    }

    #[test]
    fn provider_error_is_not_invalid_input() {
        let e = AdvisorError::ProviderNotConfigured {
            provider: "openai".into(),
            hint: "missing key".into(),
        };
        assert!(!e.is_invalid_input());
        assert!(e.to_string().contains("openai"));
    }
}
