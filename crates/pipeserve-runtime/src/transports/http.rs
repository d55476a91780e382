//! REST transport.
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | `GET` | `/health` | `{"status": "ok"}` |
//! | `GET` | `/config` | `{"available_pipelines": [{name, task}], "mcp_enabled": bool}` |
//! | `GET` | `/tools` | registry listing |
//! | `POST` | `/pipeline/{name}` | JSON array of result records |
//! | `POST` | `/transform` | `{"took": ms, "results": [...]}` |
//! | `GET` | `/search?q=` | `{"took": ms, "results": [...]}` |
//! | `POST` | `/ai` | `{"output": text, "tools_used": [{name, output}]}` |
//!
//! `/transform` takes a JSON array of records and runs it through a pipeline
//! unvalidated; `/search` runs a single `{qid, query}` row. Both use the
//! first registered pipeline unless `?pipeline=name` picks another. `/ai` is
//! only served when an [`Assistant`] is configured.
//!
//! Errors are returned as `{"error": message}` with status 404 for unknown
//! tools, 400 for bad arguments and 500 for pipeline failures.

use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use pipeserve_core::{Frame, Record, ToolInfo};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::warn;

use crate::{
    assistant::{Assistant, AssistantError, AssistantReply},
    runtime::{CallError, LocalRuntime},
};

/// Optional parts of the REST surface.
#[derive(Debug, Clone, Default)]
pub struct RouterOptions {
    /// Reported by `/config`; mounting the MCP endpoint is up to the caller.
    pub mcp_enabled: bool,
    /// Backs `/ai`. Without one the endpoint answers 400.
    pub assistant: Option<Assistant>,
}

#[derive(Clone)]
struct AppState {
    runtime: LocalRuntime,
    mcp_enabled: bool,
    assistant: Option<Assistant>,
}

/// Builds the REST router for `runtime` with no assistant.
#[must_use]
pub fn router(runtime: LocalRuntime, mcp_enabled: bool) -> Router {
    router_with(
        runtime,
        RouterOptions {
            mcp_enabled,
            assistant: None,
        },
    )
}

/// Builds the REST router for `runtime`.
#[must_use]
pub fn router_with(runtime: LocalRuntime, options: RouterOptions) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/config", get(config))
        .route("/tools", get(list_tools))
        .route("/pipeline/{name}", post(call_pipeline))
        .route("/transform", post(transform))
        .route("/search", get(search))
        .route("/ai", post(ask))
        .with_state(AppState {
            runtime,
            mcp_enabled: options.mcp_enabled,
            assistant: options.assistant,
        })
}

#[derive(Debug, Serialize)]
struct PipelineSummary {
    name: String,
    task: String,
}

#[derive(Debug, Serialize)]
struct ConfigResponse {
    available_pipelines: Vec<PipelineSummary>,
    mcp_enabled: bool,
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let available_pipelines = state
        .runtime
        .registry()
        .tools()
        .map(|tool| PipelineSummary {
            name: tool.name().to_string(),
            task: tool.task().unwrap_or(pipeserve_core::DEFAULT_TASK).to_string(),
        })
        .collect();

    Json(ConfigResponse {
        available_pipelines,
        mcp_enabled: state.mcp_enabled,
    })
}

async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolInfo>> {
    Json(state.runtime.list_tools())
}

async fn call_pipeline(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<Record>, JsonRejection>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let Json(args) = body.map_err(|rejection| ApiError::bad_request(&rejection))?;

    let records = state.runtime.call_tool(&name, args).await?;
    Ok(Json(records))
}

#[derive(Debug, Deserialize)]
struct PipelineParam {
    pipeline: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    pipeline: Option<String>,
}

/// Results of a raw pipeline run with its wall time in milliseconds.
#[derive(Debug, Serialize)]
struct TimedResults {
    took: u64,
    results: Vec<Record>,
}

async fn transform(
    State(state): State<AppState>,
    Query(params): Query<PipelineParam>,
    body: Result<Json<Vec<Record>>, JsonRejection>,
) -> Result<Json<TimedResults>, ApiError> {
    let Json(records) = body.map_err(|rejection| ApiError::bad_request(&rejection))?;
    let frame = Frame::from_records(&records);
    run_timed(&state.runtime, params.pipeline.as_deref(), frame).await
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<TimedResults>, ApiError> {
    let query = params
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError {
            status: StatusCode::BAD_REQUEST,
            message: "missing query parameter 'q'".to_string(),
        })?;
    let frame = Frame::single_row([
        ("qid", JsonValue::from("1")),
        ("query", JsonValue::from(query)),
    ]);
    run_timed(&state.runtime, params.pipeline.as_deref(), frame).await
}

async fn run_timed(
    runtime: &LocalRuntime,
    pipeline: Option<&str>,
    frame: Frame,
) -> Result<Json<TimedResults>, ApiError> {
    let started = Instant::now();
    let results = runtime.transform(pipeline, frame).await?;
    let took = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    Ok(Json(TimedResults { took, results }))
}

/// Accepts the request text under `input`, `query`, `text` or `q`.
fn assistant_input(body: &JsonValue) -> Option<&str> {
    ["input", "query", "text", "q"]
        .into_iter()
        .find_map(|key| body[key].as_str())
        .map(str::trim)
        .filter(|input| !input.is_empty())
}

async fn ask(
    State(state): State<AppState>,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> Result<Json<AssistantReply>, ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::bad_request(&rejection))?;
    let assistant = state
        .assistant
        .as_ref()
        .filter(|_| !state.runtime.registry().is_empty())
        .ok_or_else(|| ApiError {
            status: StatusCode::BAD_REQUEST,
            message: "no MCP tools available".to_string(),
        })?;
    let input = assistant_input(&body).ok_or_else(|| ApiError {
        status: StatusCode::BAD_REQUEST,
        message: "missing 'input'".to_string(),
    })?;

    let reply = assistant.ask(input).await?;
    Ok(Json(reply))
}

/// Error body returned by every REST endpoint.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(rejection: &JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
        }
    }
}

impl From<AssistantError> for ApiError {
    fn from(err: AssistantError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<CallError> for ApiError {
    fn from(err: CallError) -> Self {
        let status = match &err {
            CallError::NotFound(_) => StatusCode::NOT_FOUND,
            e if e.is_caller_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, error = %self.message, "Request failed");
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
