//! Scheduled health jobs and the manual trigger.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use uuid::Uuid;

use bipe_common::error::AppError;
use bipe_scheduler::{EnqueueOutcome, JobInfo};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/run", post(run_now))
        .route("/api/jobs/{name}", get(get_job))
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub job_id: Uuid,
    /// `enqueued` for a fresh job, `replaced` when a pending manual run was superseded.
    pub outcome: &'static str,
}

/// POST /api/jobs/run: Request an immediate one-shot health cycle.
async fn run_now(State(state): State<AppState>) -> (StatusCode, Json<RunResponse>) {
    let outcome = state.triggers.request_manual_run().await;
    let label = match outcome {
        EnqueueOutcome::Enqueued(_) => "enqueued",
        EnqueueOutcome::Replaced(_) => "replaced",
        EnqueueOutcome::Kept(_) => "kept",
    };

    (
        StatusCode::ACCEPTED,
        Json(RunResponse {
            job_id: outcome.job_id(),
            outcome: label,
        }),
    )
}

/// GET /api/jobs: List live jobs.
async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobInfo>> {
    Json(state.triggers.scheduler().jobs().await)
}

/// GET /api/jobs/{name}: Fetch one live job.
async fn get_job(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<JobInfo>, AppError> {
    state
        .triggers
        .scheduler()
        .job_info(&name)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No live job named {}", name)))
}
