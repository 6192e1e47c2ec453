//! Offline integration tests for the document pipeline and chat turns.
//!
//! Every external stage is replaced by a stub implementing the library's
//! stage traits, so these tests run without network access or API keys.

use async_trait::async_trait;
use mortgage_advisor::{
    Advisor, AdvisorConfig, ChatModel, ChatRequest, ChatTurn, ContinuationState, DocumentPayload,
    DocumentUpload, FailureReason, IncomeSource, OcrEngine, PiiKind, PiiPatternSet,
    PipelineProgressCallback, PipelineResult, RawExtractedText, SalaryExtractor, Scrubber, Stage,
    StageError, VerifiedText,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const SPEC_LINE: &str = "Name: John Smith, IBAN: AE070331234567890123456, salary AED 15,000";

const PAYSLIP: &str = "ACME TRADING LLC\n\
    Salary Certificate - June 2024\n\
    Employee Name: Fatima Al Mansoori\n\
    Emirates ID: 784-1990-1234567-1\n\
    Passport No: N12345678\n\
    Mobile: +971 50 123 4567\n\
    Email: fatima.m@acme.ae\n\
    IBAN: AE07 0331 2345 6789 0123 456\n\
    Basic Salary: AED 15,000.00\n\
    Housing Allowance: AED 6,000.00\n\
    Transport Allowance: AED 1,500.00\n\
    Gross Salary: AED 22,500.00\n\
    Deductions: AED 500.00\n\
    Net Salary: AED 22,000.00";

const PAYSLIP_JSON: &str = r#"Here you go:
{"basicSalary": 15000, "housingAllowance": 6000, "transportationAllowance": 1500,
 "otherAllowances": [], "totalGrossSalary": 22500, "deductions": 500, "netSalary": 22000,
 "currency": "AED"}"#;

// ── Stubs ────────────────────────────────────────────────────────────────────

enum OcrBehaviour {
    Text(String),
    Fail(StageError),
}

struct StubOcr {
    behaviour: OcrBehaviour,
    calls: AtomicUsize,
}

impl StubOcr {
    fn text(text: &str) -> Arc<Self> {
        Arc::new(Self {
            behaviour: OcrBehaviour::Text(text.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(err: StageError) -> Arc<Self> {
        Arc::new(Self {
            behaviour: OcrBehaviour::Fail(err),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl OcrEngine for StubOcr {
    async fn transcribe(&self, _: &DocumentPayload) -> Result<RawExtractedText, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            OcrBehaviour::Text(t) => Ok(RawExtractedText::new(t.clone())),
            OcrBehaviour::Fail(e) => Err(e.clone()),
        }
    }
}

/// Records every text it is given and answers with a fixed response.
struct RecordingExtractor {
    answer: Result<String, StageError>,
    seen: Mutex<Vec<String>>,
}

impl RecordingExtractor {
    fn answering(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(answer.to_string()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn failing(err: StageError) -> Arc<Self> {
        Arc::new(Self {
            answer: Err(err),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl SalaryExtractor for RecordingExtractor {
    async fn extract(&self, text: &VerifiedText) -> Result<String, StageError> {
        self.seen.lock().unwrap().push(text.as_str().to_string());
        self.answer.clone()
    }
}

/// Chat stub that records the turns it receives.
struct RecordingChat {
    seen: Mutex<Vec<Vec<ChatTurn>>>,
}

impl RecordingChat {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatModel for RecordingChat {
    async fn reply(&self, turns: &[ChatTurn]) -> Result<String, StageError> {
        self.seen.lock().unwrap().push(turns.to_vec());
        Ok("An 80% LTV applies to most first-time buyers.".to_string())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn advisor_with(ocr: Arc<StubOcr>, extractor: Arc<RecordingExtractor>) -> Advisor {
    init_tracing();
    Advisor::new(ocr, extractor, RecordingChat::new(), AdvisorConfig::default())
}

fn document() -> DocumentPayload {
    DocumentPayload::new(b"%PDF-1.7\nfake payslip".to_vec(), "application/pdf", 1024).unwrap()
}

// ── Document pipeline ───────────────────────────────────────────────────────

#[tokio::test]
async fn labeled_name_and_iban_are_redacted_before_extraction() {
    let extractor = RecordingExtractor::answering(r#"{"basicSalary": 15000}"#);
    let advisor = advisor_with(StubOcr::text(SPEC_LINE), extractor.clone());

    let result = advisor.extract_salary_from_document(&document()).await;
    assert!(result.is_success(), "got {result:?}");

    let seen = extractor.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let sent = &seen[0];
    assert!(!sent.contains("John Smith"), "name leaked: {sent}");
    assert!(!sent.contains("AE070331234567890123456"), "IBAN leaked: {sent}");
    assert!(sent.contains("Name:"), "label should survive: {sent}");
    assert!(sent.contains("AED 15,000"), "salary should survive: {sent}");
}

#[tokio::test]
async fn scrubber_regression_is_caught_by_the_gate() {
    let extractor = RecordingExtractor::answering(r#"{"basicSalary": 15000}"#);
    let advisor = advisor_with(StubOcr::text(SPEC_LINE), extractor.clone()).with_scrubber(
        Scrubber::with_patterns(PiiPatternSet::standard().without(PiiKind::Iban)),
    );

    let result = advisor.extract_salary_from_document(&document()).await;
    assert_eq!(
        result,
        PipelineResult::Failure(FailureReason::PiiDetectedAfterScrub)
    );
    assert_eq!(extractor.calls(), 0, "reasoning stage must never be called");
}

#[tokio::test]
async fn full_payslip_extracts_and_leaks_nothing() {
    let extractor = RecordingExtractor::answering(PAYSLIP_JSON);
    let advisor = advisor_with(StubOcr::text(PAYSLIP), extractor.clone());

    let salary = match advisor.extract_salary_from_document(&document()).await {
        PipelineResult::Success(s) => s,
        other => panic!("expected success, got {other:?}"),
    };
    assert_eq!(salary.net_salary, Some(22_000.0));
    assert_eq!(salary.housing_allowance, Some(6_000.0));

    let sent = extractor.seen.lock().unwrap()[0].clone();
    for secret in [
        "Fatima",
        "Mansoori",
        "784-1990-1234567-1",
        "N12345678",
        "123 4567",
        "fatima.m@acme.ae",
        "0331 2345",
    ] {
        assert!(!sent.contains(secret), "{secret} leaked: {sent}");
    }
    assert!(sent.contains("Basic Salary: AED 15,000.00"));
}

#[tokio::test]
async fn ocr_down_is_ocr_unavailable() {
    let extractor = RecordingExtractor::answering("{}");
    let advisor = advisor_with(
        StubOcr::failing(StageError::NotConfigured {
            stage: Stage::Ocr,
            hint: "set OPENAI_API_KEY".into(),
        }),
        extractor.clone(),
    );
    assert_eq!(
        advisor.extract_salary_from_document(&document()).await,
        PipelineResult::Failure(FailureReason::OcrUnavailable)
    );
    assert_eq!(extractor.calls(), 0);
}

#[tokio::test]
async fn ocr_timeout_is_timeout() {
    let advisor = advisor_with(
        StubOcr::failing(StageError::Timeout {
            stage: Stage::Ocr,
            secs: 30,
        }),
        RecordingExtractor::answering("{}"),
    );
    assert_eq!(
        advisor.extract_salary_from_document(&document()).await,
        PipelineResult::Failure(FailureReason::Timeout)
    );
}

#[tokio::test]
async fn prose_answer_is_malformed() {
    let advisor = advisor_with(
        StubOcr::text("Basic Salary 9,000"),
        RecordingExtractor::answering("I'm sorry, I can't help with that."),
    );
    assert_eq!(
        advisor.extract_salary_from_document(&document()).await,
        PipelineResult::Failure(FailureReason::MalformedModelOutput)
    );
}

#[tokio::test]
async fn not_salary_marker_is_reported() {
    let advisor = advisor_with(
        StubOcr::text("DEWA electricity bill, amount due AED 450"),
        RecordingExtractor::answering(r#"{"isSalaryDocument": false}"#),
    );
    assert_eq!(
        advisor.extract_salary_from_document(&document()).await,
        PipelineResult::Failure(FailureReason::NotASalaryDocument)
    );
}

#[tokio::test]
async fn reasoning_down_is_model_unavailable() {
    let advisor = advisor_with(
        StubOcr::text("Basic Salary 9,000"),
        RecordingExtractor::failing(StageError::Unavailable {
            stage: Stage::Extraction,
            detail: "connection refused".into(),
        }),
    );
    assert_eq!(
        advisor.extract_salary_from_document(&document()).await,
        PipelineResult::Failure(FailureReason::ModelUnavailable)
    );
}

#[tokio::test]
async fn progress_callback_sees_every_stage() {
    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<Stage>>,
        done: Mutex<Option<Option<FailureReason>>>,
    }

    impl PipelineProgressCallback for Recorder {
        fn on_stage_complete(&self, stage: Stage, _elapsed_ms: u64) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_pipeline_complete(&self, failure: Option<FailureReason>) {
            *self.done.lock().unwrap() = Some(failure);
        }
    }

    let recorder = Arc::new(Recorder::default());
    let config = AdvisorConfig::builder()
        .progress_callback(recorder.clone() as Arc<dyn PipelineProgressCallback>)
        .build()
        .unwrap();
    let advisor = Advisor::new(
        StubOcr::text("Basic Salary 9,000"),
        RecordingExtractor::answering(r#"{"basicSalary": 9000}"#),
        RecordingChat::new(),
        config,
    );

    assert!(advisor.extract_salary_from_document(&document()).await.is_success());
    assert_eq!(
        *recorder.stages.lock().unwrap(),
        vec![Stage::Ocr, Stage::Scrub, Stage::Gate, Stage::Extraction]
    );
    assert_eq!(*recorder.done.lock().unwrap(), Some(None));
}

#[tokio::test]
async fn concurrent_requests_are_independent() {
    let extractor = RecordingExtractor::answering(r#"{"netSalary": 12000}"#);
    let advisor = Arc::new(advisor_with(StubOcr::text("Net Salary 12,000"), extractor.clone()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let advisor = Arc::clone(&advisor);
            tokio::spawn(async move { advisor.extract_salary_from_document(&document()).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_success());
    }
    assert_eq!(extractor.calls(), 8);
}

// ── Chat turns ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn document_upload_replies_with_confirmation_and_state() {
    let advisor = advisor_with(
        StubOcr::text(PAYSLIP),
        RecordingExtractor::answering(PAYSLIP_JSON),
    );
    let request = ChatRequest {
        messages: vec![],
        document: Some(DocumentUpload {
            mime_type: "application/pdf".into(),
            data_base64: document().to_base64(),
        }),
        state: None,
    };

    let reply = advisor.respond(request).await;
    assert!(reply.is_success());
    assert!(reply.message.contains("Net salary: AED 22,000"));
    assert!(reply.message.contains("confirm"));

    let state = reply.state.expect("state");
    assert_eq!(state.monthly_income, 22_000.0);
    assert_eq!(state.income_source, IncomeSource::NetSalary);
}

#[tokio::test]
async fn document_state_round_trips_into_the_next_turn() {
    let chat = RecordingChat::new();
    let advisor = Advisor::new(
        StubOcr::text("Net Salary: Dhs. 15,000"),
        RecordingExtractor::answering(r#"{"netSalary": 15000, "currency": "Dhs."}"#),
        chat.clone(),
        AdvisorConfig::default(),
    );
    let upload = ChatRequest {
        document: Some(DocumentUpload {
            mime_type: "application/pdf".into(),
            data_base64: document().to_base64(),
        }),
        ..Default::default()
    };

    let first = advisor.respond(upload).await;
    assert!(first.is_success(), "got {:?}", first.failure);
    let state = first.state.expect("state");
    assert_eq!(state.currency, "AED");

    let follow_up = ChatRequest {
        messages: vec![
            ChatTurn::assistant(first.message),
            ChatTurn::user("Yes, that's right. What can I afford?"),
        ],
        document: None,
        state: Some(state.clone()),
    };
    assert!(follow_up.validate().is_ok());

    let second = advisor.respond(follow_up).await;
    assert!(second.is_success(), "got {:?}", second.failure);
    assert_eq!(second.state, Some(state));
    assert_eq!(chat.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn bad_upload_is_invalid_input_without_ocr() {
    let ocr = StubOcr::text("unused");
    let advisor = advisor_with(ocr.clone(), RecordingExtractor::answering("{}"));
    let request = ChatRequest {
        messages: vec![],
        document: Some(DocumentUpload {
            mime_type: "text/html".into(),
            data_base64: "PGh0bWw+".into(),
        }),
        state: None,
    };

    let reply = advisor.respond(request).await;
    assert_eq!(reply.failure, Some(FailureReason::InvalidInput));
    assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn gate_block_reply_is_user_safe() {
    let advisor = advisor_with(
        StubOcr::text(SPEC_LINE),
        RecordingExtractor::answering("{}"),
    )
    .with_scrubber(Scrubber::with_patterns(
        PiiPatternSet::standard().without(PiiKind::Iban),
    ));
    let request = ChatRequest {
        document: Some(DocumentUpload {
            mime_type: "application/pdf".into(),
            data_base64: document().to_base64(),
        }),
        ..Default::default()
    };

    let reply = advisor.respond(request).await;
    assert_eq!(reply.failure, Some(FailureReason::PiiDetectedAfterScrub));
    assert!(!reply.message.contains("pii"));
    assert!(!reply.message.contains("IBAN"));
    assert!(!reply.message.contains("AE07"));
}

#[tokio::test]
async fn chat_state_is_echoed_and_described_to_the_model() {
    let chat = RecordingChat::new();
    let advisor = Advisor::new(
        StubOcr::text(""),
        RecordingExtractor::answering("{}"),
        chat.clone(),
        AdvisorConfig::default(),
    );
    let state = ContinuationState {
        monthly_income: 25_000.0,
        income_source: IncomeSource::TotalGrossSalary,
        currency: "AED".into(),
    };
    let request = ChatRequest {
        messages: vec![ChatTurn::user(
            "Call me on 0501234567 or mail me at me@example.com. How much can I borrow?",
        )],
        document: None,
        state: Some(state.clone()),
    };

    let reply = advisor.respond(request).await;
    assert!(reply.is_success());
    assert_eq!(reply.state, Some(state));

    let seen = chat.seen.lock().unwrap();
    let turns = &seen[0];
    assert!(turns.iter().any(|t| t.content.contains("AED 25,000")));
    let user = &turns.last().unwrap().content;
    assert!(!user.contains("0501234567"));
    assert!(!user.contains("me@example.com"));
    assert!(user.contains("How much can I borrow?"));
}

#[tokio::test]
async fn invalid_chat_request_makes_no_calls() {
    let chat = RecordingChat::new();
    let advisor = Advisor::new(
        StubOcr::text(""),
        RecordingExtractor::answering("{}"),
        chat.clone(),
        AdvisorConfig::default(),
    );
    let request = ChatRequest {
        messages: vec![ChatTurn::assistant("Hello!")],
        ..Default::default()
    };

    let reply = advisor.respond(request).await;
    assert_eq!(reply.failure, Some(FailureReason::InvalidInput));
    assert!(chat.seen.lock().unwrap().is_empty());
}
