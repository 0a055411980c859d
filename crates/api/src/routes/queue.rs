//! Retry-queue status.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use bipe_common::error::AppError;
use bipe_common::types::{JWT_TOKEN_KEY, RETRY_QUEUE_KEY, RetryQueue};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/queue", get(queue_status))
}

#[derive(Debug, Serialize)]
pub struct QueueStatus {
    /// Payloads waiting for the next flush cycle.
    pub pending: usize,
    /// Whether a bearer token is stored; without one nothing is flushed.
    pub has_token: bool,
}

/// GET /api/queue: Report pending payloads. Never exposes the token or payload contents.
async fn queue_status(State(state): State<AppState>) -> Result<Json<QueueStatus>, AppError> {
    let has_token = state.store.get(JWT_TOKEN_KEY).await?.is_some();
    let queue = RetryQueue::parse(state.store.get(RETRY_QUEUE_KEY).await?.as_deref());

    Ok(Json(QueueStatus {
        pending: queue.len(),
        has_token,
    }))
}
