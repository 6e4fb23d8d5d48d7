//! Queue endpoints: trigger a runner pass, enqueue sound jobs, list jobs.

use std::str::FromStr;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use soundtrace_core::{Job, JobStatus, JobType};
use soundtrace_jobs::{JobError, RunSummary};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_store_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RunRequest {
    #[serde(default)]
    pub start_now: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct EnqueueRequest {
    pub workspace_id: Uuid,
    pub sound_id: Uuid,
    pub job_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct EnqueuedJob {
    job_id: Uuid,
    job_type: JobType,
    sound_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub(super) struct JobsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct JobItem {
    id: Uuid,
    workspace_id: Uuid,
    job_type: JobType,
    status: JobStatus,
    run_at: DateTime<Utc>,
    attempts: i32,
    max_attempts: i32,
    lock_owner: Option<String>,
    locked_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Job> for JobItem {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            workspace_id: job.workspace_id,
            job_type: job.job_type,
            status: job.status,
            run_at: job.run_at,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            lock_owner: job.lock_owner,
            locked_at: job.locked_at,
            last_error: job.last_error,
            payload: job.payload,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// POST /api/v1/jobs/run: run one runner pass and return its summary.
///
/// The body is optional; `{"startNow": true}` is accepted for callers that
/// send it, and every call runs a pass.
pub(super) async fn run_jobs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Bytes,
) -> Result<Json<RunSummary>, ApiError> {
    let request: RunRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RunRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            ApiError::new(
                req_id.0.clone(),
                "validation_error",
                format!("invalid run request body: {e}"),
            )
        })?
    };
    tracing::info!(request_id = %req_id.0, start_now = request.start_now, "runner pass triggered");

    let summary = state.runner.run_once().await.map_err(|e| {
        tracing::error!(error = %e, "runner pass aborted");
        ApiError::new(req_id.0.clone(), "service_unavailable", e.to_string())
    })?;
    Ok(Json(summary))
}

fn map_enqueue_error(request_id: &str, error: &JobError) -> ApiError {
    match error {
        JobError::NotSoundLevel { .. } => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        JobError::Store(e) => map_store_error(request_id.to_owned(), e),
        other => {
            tracing::error!(error = %other, "enqueue failed");
            ApiError::new(request_id, "internal_error", "enqueue failed")
        }
    }
}

/// POST /api/v1/jobs: enqueue a sound-level job due now.
pub(super) async fn enqueue_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<ApiResponse<EnqueuedJob>>), ApiError> {
    let rid = &req_id.0;

    let job_type = match body.job_type.as_deref() {
        None => JobType::RefreshSound,
        Some(raw) => JobType::from_str(raw)
            .map_err(|e| ApiError::new(rid, "validation_error", e.to_string()))?,
    };
    if job_type == JobType::RefreshPostMetrics {
        return Err(ApiError::new(
            rid,
            "validation_error",
            "jobType must be 'refresh_sound' or 'discover_posts'",
        ));
    }

    let sound = state
        .store
        .get_sound(body.sound_id)
        .await
        .map_err(|e| map_store_error(rid.clone(), &e))?
        .filter(|s| s.workspace_id == body.workspace_id)
        .ok_or_else(|| {
            ApiError::new(
                rid,
                "not_found",
                format!("sound {} not found in workspace", body.sound_id),
            )
        })?;

    let job_id = soundtrace_jobs::enqueue_sound_job(
        state.store.as_ref(),
        state.policy(),
        sound.workspace_id,
        sound.id,
        job_type,
        Utc::now(),
    )
    .await
    .map_err(|e| map_enqueue_error(rid, &e))?;

    tracing::info!(%job_id, %job_type, sound_id = %sound.id, "job enqueued");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: EnqueuedJob {
                job_id,
                job_type,
                sound_id: sound.id,
            },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// GET /api/v1/jobs: most recently updated jobs, optionally by status.
pub(super) async fn list_jobs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<JobsQuery>,
) -> Result<Json<ApiResponse<Vec<JobItem>>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(JobStatus::from_str)
        .transpose()
        .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.to_string()))?;

    let jobs = state
        .store
        .list_jobs(status, normalize_limit(query.limit))
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: jobs.into_iter().map(JobItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_request_defaults_start_now() {
        let parsed: RunRequest = serde_json::from_str("{}").expect("parse");
        assert!(!parsed.start_now);
        let parsed: RunRequest = serde_json::from_str(r#"{"startNow":true}"#).expect("parse");
        assert!(parsed.start_now);
    }

    #[test]
    fn post_level_enqueue_maps_to_validation_error() {
        let err = map_enqueue_error(
            "req-1",
            &JobError::NotSoundLevel {
                job_type: JobType::RefreshPostMetrics,
            },
        );
        assert_eq!(err.error.code, "validation_error");
    }

    #[test]
    fn job_item_serializes_camel_case() {
        let now = Utc::now();
        let item = JobItem::from(Job {
            id: Uuid::nil(),
            workspace_id: Uuid::nil(),
            job_type: JobType::RefreshSound,
            status: JobStatus::Failed,
            run_at: now,
            attempts: 6,
            max_attempts: 6,
            lock_owner: None,
            locked_at: None,
            last_error: Some("boom".to_string()),
            payload: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        });
        let json = serde_json::to_value(&item).expect("serialize");
        assert_eq!(json["jobType"], "refresh_sound");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["maxAttempts"], 6);
        assert_eq!(json["lastError"], "boom");
    }
}
