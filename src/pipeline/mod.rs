//! Pipeline stages for salary-document extraction.
//!
//! Each submodule implements exactly one step, and the types between them
//! enforce the order: only the scrubber makes a [`scrub::RedactedText`], only
//! the gate makes a [`gate::VerifiedText`], and only a `VerifiedText` can be
//! sent to the reasoning model.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ ocr ──▶ scrub ──▶ gate ──▶ extract
//! (bytes)   (VLM)   (regex)   (regex)  (LLM + JSON parse)
//! ```
//!
//! 1. [`input`]  : validate the upload: size, MIME type, content sniffing
//! 2. [`ocr`]    : transcribe the document with a vision model
//! 3. [`scrub`]  : replace PII with typed placeholders; local and pure
//! 4. [`gate`]   : independent re-detection; blocks on any survivor
//! 5. [`extract`]: structured extraction and tolerant JSON parsing
//!
//! [`llm`] is the shared, timeout-bounded model call used by stages 2 and 5
//! and by the chat turn.

pub mod extract;
pub mod gate;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod scrub;
