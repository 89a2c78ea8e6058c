//! Notification submission and job status endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::notification::{NotificationKind, NotificationRequest};
use crate::queue::{JobRecord, JobStatus};
use crate::server::AppState;

/// Request to deliver one notification
#[derive(Debug, Deserialize)]
pub struct SubmitNotificationRequest {
    /// Notification kind (e.g., "monthly_report")
    pub kind: String,
    /// Recipient e-mail address
    pub recipient: String,
    /// Kind-specific data
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct SubmitNotificationResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// POST /api/v1/notifications
pub async fn submit_notification(
    State(state): State<AppState>,
    Json(body): Json<SubmitNotificationRequest>,
) -> Result<(StatusCode, Json<SubmitNotificationResponse>)> {
    let kind = NotificationKind::new(body.kind)?;

    if !state.renderers.supports(&kind) {
        return Err(AppError::Validation(format!(
            "Unsupported notification kind '{}'",
            kind
        )));
    }

    let request = NotificationRequest::new(kind, body.recipient, body.data)?;
    let job_id = state.queue.enqueue(request)?;

    tracing::info!(job_id = %job_id, "Notification accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitNotificationResponse {
            job_id,
            status: JobStatus::Queued,
        }),
    ))
}

/// GET /api/v1/notifications/{id}
pub async fn get_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobRecord>> {
    state
        .queue
        .status(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Notification job {} not found", id)))
}
