//! Stage 1: OCR through a vision model.
//!
//! The OCR service is treated as untrusted: whatever it returns is wrapped in
//! [`RawExtractedText`] and goes straight to the scrubber. Nothing downstream
//! of the gate ever sees it.

use crate::error::StageError;
use crate::pipeline::input::DocumentPayload;
use crate::pipeline::llm::LlmBackend;
use crate::pipeline::scrub::RawExtractedText;
use crate::prompts::OCR_SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, ImageData};
use tracing::debug;

/// Turns a document into raw text.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn transcribe(&self, document: &DocumentPayload) -> Result<RawExtractedText, StageError>;

    /// Whether a provider is available at all. Used by health checks.
    fn is_configured(&self) -> bool {
        true
    }
}

/// [`OcrEngine`] backed by a multimodal chat model.
#[derive(Debug, Clone)]
pub struct VisionOcr {
    backend: LlmBackend,
}

impl VisionOcr {
    pub fn new(backend: LlmBackend) -> Self {
        Self { backend }
    }
}

/// Wrap the document as a base64 attachment carrying its declared MIME type.
///
/// `detail: "high"` keeps small print legible on GPT-4-class models.
fn encode_document(document: &DocumentPayload) -> ImageData {
    let b64 = document.to_base64();
    debug!(
        mime = document.mime_type(),
        bytes = document.len(),
        encoded = b64.len(),
        "encoded document for OCR"
    );
    ImageData::new(b64, document.mime_type()).with_detail("high")
}

#[async_trait]
impl OcrEngine for VisionOcr {
    async fn transcribe(&self, document: &DocumentPayload) -> Result<RawExtractedText, StageError> {
        let messages = vec![
            ChatMessage::system(OCR_SYSTEM_PROMPT),
            ChatMessage::user_with_images("", vec![encode_document(document)]),
        ];

        match self.backend.call(&messages).await {
            Ok(text) => Ok(RawExtractedText::new(text)),
            // A blank transcription is a valid answer: nothing readable.
            Err(StageError::EmptyResponse { .. }) => Ok(RawExtractedText::new(String::new())),
            Err(e) => Err(e),
        }
    }

    fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdvisorConfig;
    use crate::progress::Stage;

    #[test]
    fn encodes_with_declared_mime() {
        let doc = DocumentPayload::new(b"%PDF-1.4 test".to_vec(), "application/pdf", 1024).unwrap();
        let image = encode_document(&doc);
        assert_eq!(image.mime_type, "application/pdf");
        assert_eq!(image.data, doc.to_base64());
    }

    #[tokio::test]
    async fn unconfigured_backend_fails_fast() {
        let config = AdvisorConfig::default();
        let ocr = VisionOcr::new(LlmBackend::unconfigured(Stage::Ocr, "no key", 5, &config));
        assert!(!ocr.is_configured());

        let doc = DocumentPayload::new(b"%PDF-1.4 test".to_vec(), "application/pdf", 1024).unwrap();
        let err = ocr.transcribe(&doc).await.unwrap_err();
        assert!(matches!(err, StageError::NotConfigured { stage: Stage::Ocr, .. }));
    }
}
