//! Configuration for the mortgage advisor.
//!
//! All behaviour is controlled through [`AdvisorConfig`], built via its
//! [`AdvisorConfigBuilder`]. One struct holds every knob so the HTTP service
//! and the CLI share exactly the same settings, and so two deployments can be
//! diffed field by field.
//!
//! The config is read once at process start to build an
//! [`crate::advisor::Advisor`]; request handlers only ever see that handle.

use crate::error::AdvisorError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Longest timeout accepted for any external call, in seconds.
pub const MAX_STAGE_TIMEOUT_SECS: u64 = 120;

/// Default maximum document size: 10 MiB.
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

/// Default model for both the OCR and the reasoning stage.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Configuration for the advisor service.
///
/// Built via [`AdvisorConfig::builder()`] or using
/// [`AdvisorConfig::default()`].
///
/// # Example
/// ```rust
/// use mortgage_advisor::AdvisorConfig;
///
/// let config = AdvisorConfig::builder()
///     .model("gpt-4.1-mini")
///     .ocr_timeout_secs(20)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AdvisorConfig {
    /// Reasoning model identifier, e.g. "gpt-4.1-mini". If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// Reasoning provider name (e.g. "openai", "anthropic", "gemini").
    pub provider_name: Option<String>,

    /// Pre-constructed reasoning provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Vision model used for OCR. Falls back to `model` when None.
    pub ocr_model: Option<String>,

    /// Provider name for OCR. Falls back to the reasoning provider chain when None.
    pub ocr_provider_name: Option<String>,

    /// Pre-constructed OCR provider. Takes precedence over `ocr_provider_name`.
    pub ocr_provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for every model call. Default: 0.0.
    ///
    /// Both OCR and extraction are transcription tasks; any creativity here
    /// turns into invented salary figures.
    pub temperature: f32,

    /// Maximum tokens per model response. Default: 2048.
    pub max_tokens: usize,

    /// Timeout for the OCR call in seconds (1–120). Default: 30.
    pub ocr_timeout_secs: u64,

    /// Timeout for the structured-extraction call in seconds (1–120). Default: 30.
    pub extraction_timeout_secs: u64,

    /// Timeout for a free-form chat reply in seconds (1–120). Default: 30.
    pub chat_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Largest accepted document in bytes. Default: 10 MiB.
    pub max_document_bytes: usize,

    /// Optional stage-progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            ocr_model: None,
            ocr_provider_name: None,
            ocr_provider: None,
            temperature: 0.0,
            max_tokens: 2048,
            ocr_timeout_secs: 30,
            extraction_timeout_secs: 30,
            chat_timeout_secs: 30,
            download_timeout_secs: 60,
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AdvisorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisorConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("ocr_model", &self.ocr_model)
            .field("ocr_provider_name", &self.ocr_provider_name)
            .field(
                "ocr_provider",
                &self.ocr_provider.as_ref().map(|_| "<dyn LLMProvider>"),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("extraction_timeout_secs", &self.extraction_timeout_secs)
            .field("chat_timeout_secs", &self.chat_timeout_secs)
            .field("max_document_bytes", &self.max_document_bytes)
            .finish()
    }
}

impl AdvisorConfig {
    /// Create a new builder for `AdvisorConfig`.
    pub fn builder() -> AdvisorConfigBuilder {
        AdvisorConfigBuilder {
            config: Self::default(),
        }
    }

    /// The reasoning model that will be requested from a named provider.
    pub fn reasoning_model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// The vision model that will be requested for OCR.
    pub fn vision_model(&self) -> &str {
        self.ocr_model
            .as_deref()
            .or(self.model.as_deref())
            .unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`AdvisorConfig`].
pub struct AdvisorConfigBuilder {
    config: AdvisorConfig,
}

impl fmt::Debug for AdvisorConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisorConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl AdvisorConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn ocr_model(mut self, model: impl Into<String>) -> Self {
        self.config.ocr_model = Some(model.into());
        self
    }

    pub fn ocr_provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.ocr_provider_name = Some(name.into());
        self
    }

    pub fn ocr_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.ocr_provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn extraction_timeout_secs(mut self, secs: u64) -> Self {
        self.config.extraction_timeout_secs = secs;
        self
    }

    pub fn chat_timeout_secs(mut self, secs: u64) -> Self {
        self.config.chat_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_document_bytes(mut self, bytes: usize) -> Self {
        self.config.max_document_bytes = bytes;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AdvisorConfig, AdvisorError> {
        let c = &self.config;
        for (name, secs) in [
            ("OCR timeout", c.ocr_timeout_secs),
            ("extraction timeout", c.extraction_timeout_secs),
            ("chat timeout", c.chat_timeout_secs),
        ] {
            if secs == 0 || secs > MAX_STAGE_TIMEOUT_SECS {
                return Err(AdvisorError::InvalidConfig(format!(
                    "{name} must be 1–{MAX_STAGE_TIMEOUT_SECS}s, got {secs}"
                )));
            }
        }
        if c.max_document_bytes == 0 {
            return Err(AdvisorError::InvalidConfig(
                "Maximum document size must be ≥ 1 byte".into(),
            ));
        }
        if c.max_tokens < 256 {
            return Err(AdvisorError::InvalidConfig(format!(
                "max_tokens must be ≥ 256, got {}",
                c.max_tokens
            )));
        }
        Ok(self.config)
    }
}
