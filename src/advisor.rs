//! The advisor handle and the document pipeline.
//!
//! An [`Advisor`] is built once at process start and shared by reference
//! (`Arc<Advisor>`) with every request handler. It owns the stage
//! implementations and the scrubber; it holds no per-request state, so any
//! number of requests can run through it concurrently.
//!
//! ## Document pipeline
//!
//! ```text
//! DocumentPayload
//!  │
//!  ├─ 1. OCR        vision model          → RawExtractedText   (untrusted)
//!  ├─ 2. Scrub      local regex rules     → RedactedText
//!  ├─ 3. Gate       independent re-check  → VerifiedText       (or block)
//!  ├─ 4. Extract    reasoning model       → raw answer
//!  └─ 5. Parse      first JSON object     → SalaryExtraction
//! ```
//!
//! Strictly linear: no retries, no loops. Every external failure is turned
//! into a [`FailureReason`] here and nowhere else.

use crate::chat::{
    AdvisorReply, ChatModel, ChatRequest, ContinuationState, LlmChatModel,
};
use crate::config::{AdvisorConfig, DEFAULT_MODEL};
use crate::confirm::format_confirmation;
use crate::error::{AdvisorError, FailureReason};
use crate::pipeline::extract::{parse_extraction, LlmSalaryExtractor, ParsedExtraction, SalaryExtractor};
use crate::pipeline::gate;
use crate::pipeline::input::DocumentPayload;
use crate::pipeline::llm::{ChatTurn, LlmBackend};
use crate::pipeline::ocr::{OcrEngine, VisionOcr};
use crate::pipeline::scrub::{RawExtractedText, Scrubber};
use crate::progress::Stage;
use crate::prompts::{continuation_context, ADVISOR_SYSTEM_PROMPT};
use crate::salary::{monthly_income, SalaryExtraction};
use edgequake_llm::{LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of one pass through the document pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum PipelineResult {
    Success(SalaryExtraction),
    Failure(FailureReason),
}

impl PipelineResult {
    pub fn failure(&self) -> Option<FailureReason> {
        match self {
            PipelineResult::Success(_) => None,
            PipelineResult::Failure(reason) => Some(*reason),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success(_))
    }
}

/// Long-lived handle over the configured stages.
pub struct Advisor {
    ocr: Arc<dyn OcrEngine>,
    extractor: Arc<dyn SalaryExtractor>,
    chat: Arc<dyn ChatModel>,
    scrubber: Scrubber,
    config: AdvisorConfig,
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advisor")
            .field("ocr_configured", &self.ocr_configured())
            .field("reasoning_configured", &self.reasoning_configured())
            .field("rules", &self.scrubber.patterns().len())
            .field("config", &self.config)
            .finish()
    }
}

impl Advisor {
    /// Assemble an advisor from explicit stage implementations.
    pub fn new(
        ocr: Arc<dyn OcrEngine>,
        extractor: Arc<dyn SalaryExtractor>,
        chat: Arc<dyn ChatModel>,
        config: AdvisorConfig,
    ) -> Self {
        Self {
            ocr,
            extractor,
            chat,
            scrubber: Scrubber::default(),
            config,
        }
    }

    /// Resolve providers from `config` and the environment.
    ///
    /// A stage whose provider cannot be resolved is still constructed; its
    /// calls fail with `ocr_unavailable` / `model_unavailable` until the
    /// process is restarted with credentials.
    pub fn from_config(config: AdvisorConfig) -> Self {
        let ocr_backend = match resolve_provider(
            config.ocr_provider.as_ref().or(config.provider.as_ref()),
            config
                .ocr_provider_name
                .as_deref()
                .or(config.provider_name.as_deref()),
            config.ocr_model.as_deref().or(config.model.as_deref()),
        ) {
            Ok(provider) => {
                info!(model = config.vision_model(), "OCR provider ready");
                LlmBackend::new(provider, Stage::Ocr, config.ocr_timeout_secs, &config)
            }
            Err(e) => {
                warn!("OCR provider not configured: {}", e);
                LlmBackend::unconfigured(Stage::Ocr, e.to_string(), config.ocr_timeout_secs, &config)
            }
        };

        let reasoning = resolve_provider(
            config.provider.as_ref(),
            config.provider_name.as_deref(),
            config.model.as_deref(),
        );
        let (extraction_backend, chat_backend) = match reasoning {
            Ok(provider) => {
                info!(model = config.reasoning_model(), "reasoning provider ready");
                (
                    LlmBackend::new(
                        Arc::clone(&provider),
                        Stage::Extraction,
                        config.extraction_timeout_secs,
                        &config,
                    ),
                    LlmBackend::new(provider, Stage::Chat, config.chat_timeout_secs, &config),
                )
            }
            Err(e) => {
                warn!("reasoning provider not configured: {}", e);
                let hint = e.to_string();
                (
                    LlmBackend::unconfigured(
                        Stage::Extraction,
                        hint.clone(),
                        config.extraction_timeout_secs,
                        &config,
                    ),
                    LlmBackend::unconfigured(Stage::Chat, hint, config.chat_timeout_secs, &config),
                )
            }
        };

        Self::new(
            Arc::new(VisionOcr::new(ocr_backend)),
            Arc::new(LlmSalaryExtractor::new(extraction_backend)),
            Arc::new(LlmChatModel::new(chat_backend)),
            config,
        )
    }

    /// Replace the scrubber's rule table.
    pub fn with_scrubber(mut self, scrubber: Scrubber) -> Self {
        self.scrubber = scrubber;
        self
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    pub fn ocr_configured(&self) -> bool {
        self.ocr.is_configured()
    }

    pub fn reasoning_configured(&self) -> bool {
        self.extractor.is_configured() && self.chat.is_configured()
    }

    // ── Document pipeline ────────────────────────────────────────────────

    /// Run OCR → scrub → gate → extraction on one document.
    pub async fn extract_salary_from_document(&self, document: &DocumentPayload) -> PipelineResult {
        let start = Instant::now();
        let result = self.run_pipeline(document).await;

        match &result {
            PipelineResult::Success(_) => info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                "salary extraction succeeded"
            ),
            PipelineResult::Failure(reason) => info!(
                reason = %reason,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "salary extraction failed"
            ),
        }
        if let Some(cb) = &self.config.progress_callback {
            cb.on_pipeline_complete(result.failure());
        }
        result
    }

    async fn run_pipeline(&self, document: &DocumentPayload) -> PipelineResult {
        // ── 1. OCR ───────────────────────────────────────────────────────
        let t = self.stage_started(Stage::Ocr);
        let transcribed = self.ocr.transcribe(document).await;
        self.stage_completed(Stage::Ocr, t);
        let raw = match transcribed {
            Ok(raw) => raw,
            Err(e) => {
                warn!(stage = %e.stage(), "OCR failed: {}", e);
                return PipelineResult::Failure(FailureReason::from_stage_error(&e));
            }
        };
        if raw.is_blank() {
            info!("OCR found no readable text");
            return PipelineResult::Failure(FailureReason::NotASalaryDocument);
        }

        // ── 2. Scrub ─────────────────────────────────────────────────────
        let t = self.stage_started(Stage::Scrub);
        let redaction = self.scrubber.scrub(&raw);
        drop(raw);
        self.stage_completed(Stage::Scrub, t);
        debug!(
            redactions = redaction.total(),
            kinds = ?redaction.counts,
            "scrubbed OCR text"
        );

        // ── 3. Gate ──────────────────────────────────────────────────────
        let t = self.stage_started(Stage::Gate);
        let admitted = gate::admit(redaction.text);
        self.stage_completed(Stage::Gate, t);
        let verified = match admitted {
            Ok(verified) => verified,
            Err(verdict) => {
                warn!(verdict = %verdict, "validation gate blocked document");
                return PipelineResult::Failure(FailureReason::PiiDetectedAfterScrub);
            }
        };

        // ── 4. Extraction ────────────────────────────────────────────────
        let t = self.stage_started(Stage::Extraction);
        let answer = self.extractor.extract(&verified).await;
        self.stage_completed(Stage::Extraction, t);
        let answer = match answer {
            Ok(answer) => answer,
            Err(e) => {
                warn!(stage = %e.stage(), "extraction failed: {}", e);
                return PipelineResult::Failure(FailureReason::from_stage_error(&e));
            }
        };

        // ── 5. Parse ─────────────────────────────────────────────────────
        match parse_extraction(&answer) {
            Ok(ParsedExtraction::Salary(salary)) => PipelineResult::Success(salary),
            Ok(ParsedExtraction::NotSalaryDocument) => {
                PipelineResult::Failure(FailureReason::NotASalaryDocument)
            }
            Err(reason) => {
                warn!(response_len = answer.len(), "model answer broke the JSON contract");
                PipelineResult::Failure(reason)
            }
        }
    }

    fn stage_started(&self, stage: Stage) -> Instant {
        if let Some(cb) = &self.config.progress_callback {
            cb.on_stage_start(stage);
        }
        Instant::now()
    }

    fn stage_completed(&self, stage: Stage, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(stage = %stage, elapsed_ms, "stage complete");
        if let Some(cb) = &self.config.progress_callback {
            cb.on_stage_complete(stage, elapsed_ms);
        }
    }

    // ── Chat turns ───────────────────────────────────────────────────────

    /// Answer one chat request.
    ///
    /// A request carrying a document runs the pipeline and replies with the
    /// confirmation text plus fresh continuation state. Otherwise the
    /// scrubbed conversation goes to the chat model.
    pub async fn respond(&self, request: ChatRequest) -> AdvisorReply {
        if let Err(e) = request.validate() {
            debug!("rejected chat request: {}", e);
            return AdvisorReply::failure(FailureReason::InvalidInput, request.state);
        }

        let ChatRequest {
            messages,
            document,
            state,
        } = request;

        match document {
            Some(upload) => {
                match DocumentPayload::from_base64(
                    &upload.data_base64,
                    &upload.mime_type,
                    self.config.max_document_bytes,
                ) {
                    Ok(document) => self.respond_to_document(&document, state).await,
                    Err(e) => {
                        debug!("rejected document upload: {}", e);
                        AdvisorReply::failure(FailureReason::InvalidInput, state)
                    }
                }
            }
            None => self.respond_to_conversation(&messages, state).await,
        }
    }

    async fn respond_to_document(
        &self,
        document: &DocumentPayload,
        state: Option<ContinuationState>,
    ) -> AdvisorReply {
        match self.extract_salary_from_document(document).await {
            PipelineResult::Success(salary) => {
                let income = monthly_income(&salary);
                let message = format_confirmation(&salary, income.as_ref());
                let state = income
                    .map(|income| ContinuationState::new(&income, salary.currency.clone()))
                    .or(state);
                AdvisorReply::success(message, state)
            }
            PipelineResult::Failure(reason) => AdvisorReply::failure(reason, state),
        }
    }

    async fn respond_to_conversation(
        &self,
        messages: &[ChatTurn],
        state: Option<ContinuationState>,
    ) -> AdvisorReply {
        let mut turns = Vec::with_capacity(messages.len() + 2);
        turns.push(ChatTurn::system(ADVISOR_SYSTEM_PROMPT));
        if let Some(state) = &state {
            turns.push(ChatTurn::system(continuation_context(state)));
        }
        for message in messages {
            let scrubbed = self.scrubber.scrub(&RawExtractedText::new(message.content.as_str()));
            if scrubbed.total() > 0 {
                debug!(kinds = ?scrubbed.counts, "redacted chat message");
            }
            turns.push(ChatTurn {
                role: message.role,
                content: scrubbed.text.into_string(),
            });
        }

        let t = self.stage_started(Stage::Chat);
        let reply = self.chat.reply(&turns).await;
        self.stage_completed(Stage::Chat, t);

        match reply {
            Ok(text) => AdvisorReply::success(text, state),
            Err(e) => {
                warn!(stage = %e.stage(), "chat reply failed: {}", e);
                AdvisorReply::failure(FailureReason::from_stage_error(&e), state)
            }
        }
    }
}

// ── Provider resolution ──────────────────────────────────────────────────────

/// Instantiate a named provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, AdvisorError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        AdvisorError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve a provider, from most-specific to least-specific:
///
/// 1. a pre-built provider
/// 2. a provider name, with `model` or [`DEFAULT_MODEL`]
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` (an explicit `model` wins)
/// 4. `OPENAI_API_KEY`, preferring OpenAI when several keys are present
/// 5. `ProviderFactory::from_env`
fn resolve_provider(
    explicit: Option<&Arc<dyn LLMProvider>>,
    provider_name: Option<&str>,
    model: Option<&str>,
) -> Result<Arc<dyn LLMProvider>, AdvisorError> {
    if let Some(provider) = explicit {
        return Ok(Arc::clone(provider));
    }

    if let Some(name) = provider_name {
        return create_provider(name, model.unwrap_or(DEFAULT_MODEL));
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, model.unwrap_or(&env_model));
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", model.unwrap_or(DEFAULT_MODEL));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| AdvisorError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
