//! HTTP surface for the web chat front end.
//!
//! The router holds one [`AppState`] with an `Arc<Advisor>` built at startup.
//! Handlers never build providers or compile patterns themselves.
//!
//! | Route | Body | Reply |
//! |-------|------|-------|
//! | `GET /health` | none | stage readiness |
//! | `POST /api/chat` | [`ChatRequest`] | [`AdvisorReply`] |
//! | `POST /api/tools/ltv` | [`LtvRequest`] | [`LtvAssessment`] |
//! | `POST /api/tools/emi` | [`EmiRequest`] | [`EmiBreakdown`] |
//! | `POST /api/tools/buy-vs-rent` | [`BuyVsRentInput`] | [`BuyVsRentResult`] |
//!
//! Chat failures map to 400 (invalid input), 503 (a stage is unavailable),
//! 504 (timeout) or 422 (anything else the pipeline rejected). The body is
//! always the user-safe [`AdvisorReply`], never the reason code.

use crate::advisor::Advisor;
use crate::chat::{AdvisorReply, ChatRequest};
use crate::error::{AdvisorError, FailureReason};
use crate::finance::{
    buy_vs_rent_recommendation, calculate_emi, enforce_ltv, BuyVsRentInput, BuyVsRentResult,
    EmiBreakdown, LtvAssessment,
};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Headroom on top of the stage timeouts for the whole request.
const REQUEST_TIMEOUT_SLACK_SECS: u64 = 10;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub advisor: Arc<Advisor>,
}

impl AppState {
    pub fn new(advisor: Arc<Advisor>) -> Self {
        Self { advisor }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub ocr_configured: bool,
    pub reasoning_configured: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LtvRequest {
    pub price: f64,
    #[serde(default)]
    pub down_payment: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmiRequest {
    pub loan_amount: f64,
    #[serde(default)]
    pub annual_rate: Option<f64>,
    pub tenure_years: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Error type for the calculator endpoints.
pub struct ToolError(AdvisorError);

impl IntoResponse for ToolError {
    fn into_response(self) -> Response {
        let status = if self.0.is_invalid_input() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

impl From<AdvisorError> for ToolError {
    fn from(e: AdvisorError) -> Self {
        ToolError(e)
    }
}

impl From<JsonRejection> for ToolError {
    fn from(e: JsonRejection) -> Self {
        ToolError(AdvisorError::invalid(e.body_text()))
    }
}

/// HTTP status for a chat reply.
pub fn status_for(reply: &AdvisorReply) -> StatusCode {
    match reply.failure {
        None => StatusCode::OK,
        Some(FailureReason::InvalidInput) => StatusCode::BAD_REQUEST,
        Some(FailureReason::OcrUnavailable | FailureReason::ModelUnavailable) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        Some(FailureReason::Timeout) => StatusCode::GATEWAY_TIMEOUT,
        Some(
            FailureReason::PiiDetectedAfterScrub
            | FailureReason::MalformedModelOutput
            | FailureReason::NotASalaryDocument,
        ) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let ocr = state.advisor.ocr_configured();
    let reasoning = state.advisor.reasoning_configured();
    Json(HealthResponse {
        status: if ocr && reasoning { "ok" } else { "degraded" }.to_string(),
        ocr_configured: ocr,
        reasoning_configured: reasoning,
    })
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> (StatusCode, Json<AdvisorReply>) {
    let reply = match payload {
        Ok(Json(request)) => state.advisor.respond(request).await,
        Err(rejection) => {
            debug!("rejected chat body: {}", rejection.body_text());
            AdvisorReply::failure(FailureReason::InvalidInput, None)
        }
    };
    (status_for(&reply), Json(reply))
}

async fn ltv_handler(
    payload: Result<Json<LtvRequest>, JsonRejection>,
) -> Result<Json<LtvAssessment>, ToolError> {
    let Json(req) = payload?;
    Ok(Json(enforce_ltv(req.price, req.down_payment)?))
}

async fn emi_handler(
    payload: Result<Json<EmiRequest>, JsonRejection>,
) -> Result<Json<EmiBreakdown>, ToolError> {
    let Json(req) = payload?;
    Ok(Json(calculate_emi(req.loan_amount, req.annual_rate, req.tenure_years)?))
}

async fn buy_vs_rent_handler(
    payload: Result<Json<BuyVsRentInput>, JsonRejection>,
) -> Result<Json<BuyVsRentResult>, ToolError> {
    let Json(req) = payload?;
    Ok(Json(buy_vs_rent_recommendation(&req)?))
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let config = state.advisor.config();
    // base64 inflates by 4/3; leave room for the messages and JSON framing.
    let body_limit = config.max_document_bytes / 3 * 4 + 256 * 1024;
    let request_timeout = Duration::from_secs(
        (config.ocr_timeout_secs + config.extraction_timeout_secs).max(config.chat_timeout_secs)
            + REQUEST_TIMEOUT_SLACK_SECS,
    );

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/tools/ltv", post(ltv_handler))
        .route("/api/tools/emi", post(emi_handler))
        .route("/api/tools/buy-vs-rent", post(buy_vs_rent_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, advisor: Arc<Advisor>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(AppState::new(advisor)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
}
