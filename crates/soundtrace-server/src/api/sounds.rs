use std::str::FromStr;

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use soundtrace_core::Platform;
use soundtrace_jobs::{JobError, TrackSoundRequest};
use soundtrace_providers::ProviderError;
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_store_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TrackSoundBody {
    pub workspace_id: Uuid,
    pub platform: String,
    pub url: String,
    pub created_by: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TrackedSoundItem {
    sound_id: Uuid,
    platform: Platform,
    platform_sound_id: String,
    source_url: String,
    refresh_job_id: Uuid,
}

fn map_track_error(request_id: &str, error: &JobError) -> ApiError {
    match error {
        JobError::Provider(ProviderError::InvalidUrl { .. }) => {
            ApiError::new(request_id, "invalid_url", error.to_string())
        }
        JobError::Provider(ProviderError::UnsupportedUrlForm { .. }) => {
            ApiError::new(request_id, "unsupported_url_form", error.to_string())
        }
        JobError::Provider(ProviderError::MissingConfig { .. }) => {
            ApiError::new(request_id, "platform_not_configured", error.to_string())
        }
        JobError::Store(e) => map_store_error(request_id.to_owned(), e),
        other => {
            tracing::error!(error = %other, "sound onboarding failed");
            ApiError::new(request_id, "internal_error", "sound onboarding failed")
        }
    }
}

/// POST /api/v1/sounds: resolve a sound link, track it and queue its
/// first refresh.
pub(super) async fn track_sound(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<TrackSoundBody>,
) -> Result<(StatusCode, Json<ApiResponse<TrackedSoundItem>>), ApiError> {
    let rid = &req_id.0;

    let platform = Platform::from_str(body.platform.trim())
        .map_err(|e| ApiError::new(rid, "validation_error", e.to_string()))?;
    let url = body.url.trim().to_owned();
    if url.is_empty() {
        return Err(ApiError::new(rid, "validation_error", "url must not be empty"));
    }

    let tracked = soundtrace_jobs::track_sound(
        state.store.as_ref(),
        &state.providers,
        state.policy(),
        TrackSoundRequest {
            workspace_id: body.workspace_id,
            platform,
            url,
            created_by: body.created_by,
        },
        Utc::now(),
    )
    .await
    .map_err(|e| map_track_error(rid, &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: TrackedSoundItem {
                sound_id: tracked.sound.id,
                platform: tracked.sound.platform,
                platform_sound_id: tracked.sound.platform_sound_id,
                source_url: tracked.sound.source_url,
                refresh_job_id: tracked.refresh_job_id,
            },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}
