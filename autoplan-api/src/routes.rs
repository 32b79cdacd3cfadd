//! HTTP route handlers for the plan/execute API.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::task;
use tracing::warn;

use autoplan::core::types::{ExecutionPlan, TaskUnderstanding};
use autoplan::engine::RunOutcome;
use autoplan::error::{EngineError, classify};
use autoplan::io::run_state::RunState;

use crate::state::AppState;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/plan", post(plan))
        .route("/execute", post(execute))
        .route("/status/{run_id}", get(status))
        .route("/runs", get(runs))
}

#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub task: String,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub task: String,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub understanding: TaskUnderstanding,
    pub plan: ExecutionPlan,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub run: RunOutcome,
}

#[derive(Debug, Serialize)]
pub struct RunsResponse {
    pub runs: Vec<String>,
}

/// Error body `{"error": ...}` with a status derived from the engine error kind.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let status = match classify(&err) {
            Some(EngineError::Validation { .. }) => StatusCode::BAD_REQUEST,
            Some(EngineError::RunNotFound { .. }) => StatusCode::NOT_FOUND,
            Some(EngineError::RunLocked { .. }) => StatusCode::CONFLICT,
            Some(EngineError::StepFailed { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

async fn health() -> &'static str {
    "ok"
}

/// POST /api/plan - produce an understanding and plan without executing.
pub async fn plan(
    State(state): State<AppState>,
    Json(request): Json<PlanRequest>,
) -> Result<Json<PlanResponse>, ApiError> {
    let planner = state.planner.clone();
    let (understanding, plan) = task::spawn_blocking(move || {
        planner.produce(&request.task, request.feedback.as_deref())
    })
    .await
    .map_err(|err| ApiError::internal(err.to_string()))??;
    Ok(Json(PlanResponse {
        understanding,
        plan,
    }))
}

/// POST /api/execute - plan and run a task (or resume `run_id`).
pub async fn execute(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let planner = state.planner.clone();
    let engine = state.engine.clone();
    let outcome = task::spawn_blocking(move || {
        let (understanding, plan) = planner.produce(&request.task, request.feedback.as_deref())?;
        engine.run(&plan, &understanding, request.run_id.as_deref())
    })
    .await
    .map_err(|err| ApiError::internal(err.to_string()))?
    .map_err(|err| {
        warn!(error = %format!("{err:#}"), "execute failed");
        ApiError::from(err)
    })?;
    Ok(Json(ExecuteResponse { run: outcome }))
}

/// GET /api/status/{run_id} - persisted record of a run.
pub async fn status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunState>, ApiError> {
    let engine = state.engine.clone();
    let run_state = task::spawn_blocking(move || engine.store().load(&run_id))
        .await
        .map_err(|err| ApiError::internal(err.to_string()))??;
    Ok(Json(run_state))
}

/// GET /api/runs - known run ids, sorted.
pub async fn runs(State(state): State<AppState>) -> Result<Json<RunsResponse>, ApiError> {
    let engine = state.engine.clone();
    let runs = task::spawn_blocking(move || engine.store().list())
        .await
        .map_err(|err| ApiError::internal(err.to_string()))??;
    Ok(Json(RunsResponse { runs }))
}
