//! # uae-mortgage-advisor
//!
//! A conversational UAE mortgage advisor. A hosted language model handles the
//! conversation; a small deterministic module does every piece of financial
//! arithmetic; and a privacy pipeline makes sure no personal data from an
//! uploaded payslip ever reaches the reasoning model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! payslip / salary certificate (image or PDF)
//!  │
//!  ├─ 1. OCR      vision model transcribes the document       (untrusted)
//!  ├─ 2. Scrub    ordered regex rules → [REDACTED_*] tokens    (local)
//!  ├─ 3. Gate     independent PII re-check; block on survivors (local)
//!  ├─ 4. Extract  reasoning model → salary JSON                (gated text only)
//!  └─ 5. Confirm  summary + monthly income for the next turn
//! ```
//!
//! Stage 4 takes a [`VerifiedText`], which only the gate can construct, so
//! text that failed the gate cannot be sent to the reasoning model.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mortgage_advisor::{Advisor, AdvisorConfig, DocumentPayload, PipelineResult};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = AdvisorConfig::default();
//!     let advisor = Advisor::from_config(config);
//!
//!     let bytes = std::fs::read("payslip.pdf")?;
//!     let document = DocumentPayload::new(bytes, "application/pdf", 10 * 1024 * 1024)?;
//!     match advisor.extract_salary_from_document(&document).await {
//!         PipelineResult::Success(salary) => println!("{salary:?}"),
//!         PipelineResult::Failure(reason) => eprintln!("{}", reason.user_message()),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | The `mortgage-advisor` binary (clap + anyhow + tracing-subscriber) |
//! | `server` | on      | The axum HTTP service behind `mortgage-advisor serve` |
//!
//! Disable both when embedding only the library:
//! ```toml
//! uae-mortgage-advisor = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod advisor;
pub mod chat;
pub mod config;
pub mod confirm;
pub mod error;
pub mod finance;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod salary;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use advisor::{Advisor, PipelineResult};
pub use chat::{AdvisorReply, ChatModel, ChatRequest, ContinuationState, DocumentUpload};
pub use config::{AdvisorConfig, AdvisorConfigBuilder};
pub use confirm::{format_amount, format_confirmation};
pub use error::{AdvisorError, FailureReason, StageError};
pub use finance::{
    buy_vs_rent_recommendation, calculate_emi, enforce_ltv, BuyVsRentInput, BuyVsRentResult,
    EmiBreakdown, LtvAssessment, LtvIssue, Recommendation,
};
pub use pipeline::extract::{parse_extraction, ParsedExtraction, SalaryExtractor};
pub use pipeline::gate::{validate, ValidationResult, VerifiedText};
pub use pipeline::input::{resolve_document, DocumentPayload};
pub use pipeline::llm::{ChatRole, ChatTurn};
pub use pipeline::ocr::OcrEngine;
pub use pipeline::scrub::{PiiKind, PiiPatternSet, RawExtractedText, RedactedText, Scrubber};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, Stage};
pub use salary::{monthly_income, Allowance, IncomeSource, MonthlyIncome, SalaryExtraction};
