//! Progress-callback trait for per-stage pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::AdvisorConfigBuilder::progress_callback`] to receive
//! events as a document moves through OCR, scrubbing, the validation gate and
//! structured extraction.
//!
//! Events carry only the stage, timings and the final reason code. They never
//! carry document text, so a callback can forward them anywhere (terminal,
//! metrics, websocket) without widening the PII surface.
//!
//! # Example
//!
//! ```rust
//! use mortgage_advisor::{AdvisorConfig, PipelineProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{stage} done in {elapsed_ms}ms");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = AdvisorConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::FailureReason;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One step of the document pipeline (plus the free-form chat call).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Vision model transcribes the uploaded document.
    Ocr,
    /// Local regex redaction.
    Scrub,
    /// Independent PII re-check.
    Gate,
    /// Reasoning model turns redacted text into salary JSON.
    Extraction,
    /// Free-form advisor conversation (not part of the document pipeline).
    Chat,
}

impl Stage {
    /// Lower-case label used in logs and progress output.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Ocr => "ocr",
            Stage::Scrub => "scrub",
            Stage::Gate => "gate",
            Stage::Extraction => "extraction",
            Stage::Chat => "chat",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called by the pipeline as it moves through each stage.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync`: the HTTP
/// service shares one config across concurrent requests.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called just before a stage starts.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage finished without an error.
    ///
    /// A gate *block* still counts as a completed gate stage; the block shows
    /// up in [`PipelineProgressCallback::on_pipeline_complete`].
    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called once when the pipeline returns.
    ///
    /// * `failure`: `None` on success, otherwise the reason code
    fn on_pipeline_complete(&self, failure: Option<FailureReason>) {
        let _ = failure;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AdvisorConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
