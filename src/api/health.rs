//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::queue::QueueStats;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub kinds: Vec<String>,
    pub queue: QueueStats,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let queue = state.queue.stats();
    let status = if queue.accepting { "healthy" } else { "draining" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        kinds: state
            .renderers
            .kinds()
            .into_iter()
            .map(String::from)
            .collect(),
        queue,
    })
}
