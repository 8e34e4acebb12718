//! Job intake and introspection endpoints.
//!
//! Enqueue is admission-checked against the account's plan limits, then the
//! job is durably stored and the request returns immediately with the job
//! id. All real work happens in the worker.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::config::PlanLimits;
use crate::domains::accounts::models::UsageCounter;
use crate::domains::repos::jobs::{DeleteRepoJob, DownloadRepoJob, UploadRepoJob};
use crate::kernel::jobs::{JobQueueExt, JobStatus, QueueName};
use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoOperation {
    Upload,
    Delete,
    Download,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub user_id: Uuid,
    pub chat_id: i64,
    pub operation: RepoOperation,
    pub repo_name: String,
    /// Required for uploads: platform file id of the archive.
    pub file_id: Option<String>,
}

#[derive(Serialize)]
pub struct EnqueueResponse {
    pub job_id: Uuid,
}

fn error_body(message: &str) -> Json<serde_json::Value> {
    Json(json!({ "error": message }))
}

pub async fn enqueue_repo_job_handler(
    Extension(state): Extension<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>), (StatusCode, Json<serde_json::Value>)> {
    let user = state
        .server_deps
        .users
        .get_user(request.user_id)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to load user");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("internal error"),
            )
        })?
        .ok_or((StatusCode::NOT_FOUND, error_body("user not found")))?;

    // Admission control happens before enqueue so over-limit requests never
    // consume queue capacity.
    let limits = PlanLimits::for_plan(&user.plan);
    if !limits.allows_api_call(user.api_calls) {
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            error_body("api call limit reached for plan"),
        ));
    }

    let job_id = match request.operation {
        RepoOperation::Upload => {
            if !limits.allows_repo(user.repos_created) {
                return Err((
                    StatusCode::FORBIDDEN,
                    error_body("repository limit reached for plan"),
                ));
            }
            let file_id = request.file_id.ok_or((
                StatusCode::UNPROCESSABLE_ENTITY,
                error_body("file_id is required for uploads"),
            ))?;
            state
                .queue
                .enqueue(UploadRepoJob {
                    user_id: user.id,
                    repo_name: request.repo_name,
                    file_id,
                    chat_id: request.chat_id,
                })
                .await
        }
        RepoOperation::Delete => {
            state
                .queue
                .enqueue(DeleteRepoJob {
                    user_id: user.id,
                    repo_name: request.repo_name,
                    chat_id: request.chat_id,
                })
                .await
        }
        RepoOperation::Download => {
            state
                .queue
                .enqueue(DownloadRepoJob {
                    user_id: user.id,
                    repo_name: request.repo_name,
                    chat_id: request.chat_id,
                })
                .await
        }
    }
    .map_err(|e| {
        error!(error = %e, "failed to enqueue job");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            error_body("job queue unavailable"),
        )
    })?;

    if let Err(e) = state
        .server_deps
        .users
        .increment_usage(user.id, UsageCounter::ApiCalls)
        .await
    {
        error!(error = %e, "failed to count api call");
    }

    Ok((StatusCode::ACCEPTED, Json(EnqueueResponse { job_id })))
}

#[derive(Serialize)]
pub struct JobStatusResponse {
    pub id: Uuid,
    pub queue: String,
    pub job_type: String,
    pub status: JobStatus,
    pub attempt: i32,
    pub max_attempts: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead_letter_reason: Option<String>,
}

pub async fn job_status_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, (StatusCode, Json<serde_json::Value>)> {
    let job = state
        .queue
        .get_job(id)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to load job");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("internal error"),
            )
        })?
        .ok_or((StatusCode::NOT_FOUND, error_body("job not found")))?;

    Ok(Json(JobStatusResponse {
        id: job.id,
        queue: job.queue.as_str().to_string(),
        job_type: job.job_type,
        status: job.status,
        attempt: job.attempt,
        max_attempts: job.max_attempts,
        error_message: job.error_message,
        dead_letter_reason: job.dead_letter_reason,
    }))
}

pub async fn queue_stats_handler(
    Extension(state): Extension<AppState>,
    Path(queue): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let queue = QueueName::parse(&queue)
        .ok_or((StatusCode::NOT_FOUND, error_body("unknown queue")))?;

    let stats = state.queue.stats(queue).await.map_err(|e| {
        error!(error = %e, "failed to load queue stats");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_body("internal error"),
        )
    })?;

    Ok(Json(json!({
        "queue": queue.as_str(),
        "waiting": stats.waiting,
        "delayed": stats.delayed,
        "active": stats.active,
        "succeeded": stats.succeeded,
        "dead_letter": stats.dead_letter,
    })))
}

pub async fn recent_activity_handler(
    Extension(state): Extension<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let logs = state
        .server_deps
        .users
        .recent_activity(user_id, 20)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to load activity");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("internal error"),
            )
        })?;

    Ok(Json(json!({ "activity": logs })))
}
