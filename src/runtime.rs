// src/runtime.rs

//! JSON API consumed by the editor front-end.

use crate::analysis::Analyzer;
use crate::auth::{api_key_auth, ApiKey};
use crate::checks::{code_statistics, precheck, CodeStatistics, PrecheckReport};
use crate::config::Config;
use crate::engine::events::RunEvent;
use crate::language::{Language, LANGUAGES};
use crate::mentor::{AssistRequest, Mentor};
use crate::report::{build_report, ReportInput};
use crate::runner::{ExecutionRequest, ExecutionResult, RunError, Runner};
use crate::sinks::collecting::CollectingEventSink;
use crate::templates::{template, Problem};
use crate::toolchain::check_all;

use anyhow::Context;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;
use tracing::Span;

/* ---------------- state ---------------- */

#[derive(Clone)]
pub struct AppState {
    runner: Runner,
    config: Arc<Config>,
    permits: Arc<Semaphore>,
    mentor: Mentor,
    analyzer: Analyzer,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let mentor = Mentor::new(config.mentor.clone())?;

        Ok(Self {
            runner: Runner::from_config(&config),
            analyzer: Analyzer::from_config(&config),
            permits: Arc::new(Semaphore::new(config.execution.max_concurrent_runs.max(1))),
            config: Arc::new(config),
            mentor,
        })
    }
}

/* ---------------- server ---------------- */

pub fn router(state: AppState) -> Router {
    let api_key = ApiKey::new(state.config.server.api_key.as_deref());

    let protected = Router::new()
        .route("/run", post(run))
        .route("/check", post(check))
        .route("/analyze", post(analyze))
        .route("/assist", post(assist))
        .route("/report", post(report))
        .layer(middleware::from_fn_with_state(api_key, api_key_auth));

    Router::new()
        .route("/health", get(health))
        .route("/languages", get(languages))
        .route("/toolchains", get(toolchains))
        .route("/analysis/tools", get(analysis_tools))
        .route("/templates/:language", get(templates))
        .merge(protected)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<Body>| {
                    tracing::info_span!(
                        "http_request",
                        method = %req.method(),
                        path = %req.uri().path(),
                    )
                })
                .on_response(|res: &Response, latency: Duration, _span: &Span| {
                    tracing::info!(
                        status = res.status().as_u16(),
                        latency_ms = latency.as_millis(),
                        "request completed"
                    );
                }),
        )
}

pub async fn serve(config: Config, addr: &str) -> anyhow::Result<()> {
    let socket: SocketAddr = addr
        .parse()
        .with_context(|| format!("Invalid listen address {:?}", addr))?;

    if config.server.api_key.is_none() {
        tracing::warn!("CODEMENTOR_API_KEY not set, API is unauthenticated");
    }

    let state = AppState::new(config)?;
    if !state.mentor.is_configured() {
        tracing::info!("OPENAI_API_KEY not set, /assist will serve canned hints");
    }

    let app = router(state);
    let listener = TcpListener::bind(socket).await?;

    tracing::info!("codementor API listening on http://{}", socket);

    axum::serve(listener, app).await?;
    Ok(())
}

/* ---------------- errors ---------------- */

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    details: Vec<String>,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            details: Vec::new(),
        }
    }

    fn rejected(details: Vec<String>) -> Self {
        Self {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: "Code rejected before execution".to_string(),
            details,
        }
    }

    fn shutting_down() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "Runner is shutting down".to_string(),
            details: Vec::new(),
        }
    }
}

impl From<RunError> for ApiError {
    fn from(e: RunError) -> Self {
        let status = match &e {
            RunError::UnsupportedLanguage(_) => StatusCode::BAD_REQUEST,
            RunError::ToolchainMissing { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RunError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
            details: Vec::new(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "ok": false,
            "error": self.message,
        });
        if !self.details.is_empty() {
            body["details"] = serde_json::json!(self.details);
        }
        (self.status, Json(body)).into_response()
    }
}

/* ---------------- request models ---------------- */

#[derive(Debug, Deserialize)]
struct RunRequest {
    language: String,
    code: String,
    #[serde(default)]
    stdin: Option<String>,
    /// Lower the configured timeout for this run; never raises it.
    #[serde(default)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
struct RunResponse {
    ok: bool,
    result: ExecutionResult,
    warnings: Vec<String>,
    events: Vec<RunEvent>,
}

#[derive(Debug, Deserialize)]
struct CheckRequest {
    language: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Serialize)]
struct CheckResponse {
    precheck: PrecheckReport,
    statistics: CodeStatistics,
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    #[serde(default = "default_analyze_language")]
    language: String,
    code: String,
}

fn default_analyze_language() -> String {
    "python".to_string()
}

#[derive(Debug, Deserialize)]
struct TemplateQuery {
    #[serde(default)]
    problem: Option<String>,
}

/* ---------------- endpoints ---------------- */

async fn health() -> &'static str {
    "ok"
}

async fn languages() -> impl IntoResponse {
    Json(LANGUAGES)
}

async fn toolchains(State(state): State<AppState>) -> impl IntoResponse {
    Json(check_all(state.runner.toolchains()).await)
}

async fn templates(
    Path(language): Path<String>,
    Query(query): Query<TemplateQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let language: Language = language.parse()?;
    let problem: Problem = match query.problem {
        Some(p) => p.parse().map_err(|e: anyhow::Error| ApiError::bad_request(e.to_string()))?,
        None => Problem::default(),
    };

    Ok(Json(serde_json::json!({
        "language": language,
        "problem": problem,
        "statement": problem.statement(),
        "code": template(language, problem),
    })))
}

async fn run(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let language: Language = req.language.parse()?;

    let pre = precheck(&req.code, language, state.config.execution.max_code_length);
    if !pre.is_valid {
        return Err(ApiError::rejected(pre.errors));
    }

    let limit = state.config.execution.timeout();
    let timeout = match req.timeout_secs {
        Some(0) => return Err(ApiError::bad_request("timeout_secs must be greater than 0")),
        Some(secs) => Duration::from_secs(secs).min(limit),
        None => limit,
    };

    let _permit = state.permits.acquire().await.map_err(|_| ApiError::shutting_down())?;

    let mut request = ExecutionRequest::new(language, req.code);
    if let Some(stdin) = req.stdin {
        request = request.with_stdin(stdin);
    }

    let mut sink = CollectingEventSink::new();
    let result = state.runner.run(&request, timeout, &mut sink).await?;

    Ok(Json(RunResponse {
        ok: result.succeeded,
        result,
        warnings: pre.warnings,
        events: sink.into_events(),
    }))
}

async fn check(
    State(state): State<AppState>,
    Json(req): Json<CheckRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let language: Language = req.language.parse()?;

    Ok(Json(CheckResponse {
        precheck: precheck(&req.code, language, state.config.execution.max_code_length),
        statistics: code_statistics(&req.code, language),
    }))
}

async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let language: Language = req.language.parse()?;

    let pre = precheck(&req.code, language, state.config.execution.max_code_length);
    if !pre.is_valid {
        return Err(ApiError::rejected(pre.errors));
    }

    // the tools are subprocesses too, so they share the run permits
    let _permit = state.permits.acquire().await.map_err(|_| ApiError::shutting_down())?;
    let result = state.analyzer.analyze(language, &req.code).await?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "analysis": result,
    })))
}

async fn analysis_tools(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.analyzer.check_dependencies().await)
}

async fn assist(
    State(state): State<AppState>,
    Json(req): Json<AssistRequest>,
) -> impl IntoResponse {
    Json(state.mentor.assist(&req).await)
}

async fn report(Json(input): Json<ReportInput>) -> impl IntoResponse {
    Json(build_report(&input))
}
