//! Entry points that put work on the queue: onboarding a sound URL,
//! enqueueing a job for an existing sound, and the periodic re-scrape.

use chrono::{DateTime, Utc};
use soundtrace_core::{JobPayload, JobType, NewJob, NewTrackedSound, Platform, TrackedSound};
use soundtrace_providers::ProviderRegistry;
use uuid::Uuid;

use crate::error::{JobError, StoreError};
use crate::queue::QueuePolicy;
use crate::store::JobStore;

/// A user-submitted sound link.
#[derive(Debug, Clone)]
pub struct TrackSoundRequest {
    pub workspace_id: Uuid,
    pub platform: Platform,
    pub url: String,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TrackedSoundResult {
    pub sound: TrackedSound,
    pub refresh_job_id: Uuid,
}

/// Resolves the request URL on its platform, stores the sound and queues a
/// `refresh_sound` job due at `now`.
///
/// # Errors
///
/// [`JobError::Provider`] for unconfigured platforms and URLs that do not
/// resolve; [`JobError::Store`] on persistence failure.
pub async fn track_sound(
    store: &dyn JobStore,
    providers: &ProviderRegistry,
    policy: &QueuePolicy,
    request: TrackSoundRequest,
    now: DateTime<Utc>,
) -> Result<TrackedSoundResult, JobError> {
    let TrackSoundRequest {
        workspace_id,
        platform,
        url,
        created_by,
    } = request;
    let provider = providers.require(platform)?;
    let resolved = provider.resolve_sound_from_url(&url)?;

    let sound = store
        .insert_sound(&NewTrackedSound {
            workspace_id,
            platform,
            platform_sound_id: resolved.platform_sound_id,
            source_url: resolved.canonical_url,
            title: None,
            artist: None,
            thumbnail_url: None,
            created_by,
        })
        .await?;
    let refresh_job_id =
        enqueue_sound_job(store, policy, workspace_id, sound.id, JobType::RefreshSound, now)
            .await?;

    tracing::info!(
        sound_id = %sound.id,
        %platform,
        platform_sound_id = %sound.platform_sound_id,
        "tracking sound"
    );
    Ok(TrackedSoundResult {
        sound,
        refresh_job_id,
    })
}

/// Queues a sound-level job (`refresh_sound`, or `discover_posts` to skip
/// straight to onboarding discovery).
///
/// # Errors
///
/// [`JobError::NotSoundLevel`] if `job_type` is post-level, or
/// [`JobError::Store`] on any store failure.
pub async fn enqueue_sound_job(
    store: &dyn JobStore,
    policy: &QueuePolicy,
    workspace_id: Uuid,
    sound_id: Uuid,
    job_type: JobType,
    now: DateTime<Utc>,
) -> Result<Uuid, JobError> {
    let payload = match job_type {
        JobType::RefreshSound => JobPayload::RefreshSound { sound_id },
        JobType::DiscoverPosts => JobPayload::DiscoverPosts { sound_id },
        JobType::RefreshPostMetrics => return Err(JobError::NotSoundLevel { job_type }),
    };
    let ids = store
        .enqueue_jobs(&[NewJob::new(workspace_id, payload, now, policy.max_attempts)])
        .await?;
    ids.into_iter()
        .next()
        .ok_or_else(|| StoreError::Corrupt("enqueue returned no id".to_string()).into())
}

/// Queues `refresh_sound` for every sound without one already open.
/// Returns the number of jobs enqueued.
///
/// # Errors
///
/// Any store failure; nothing is enqueued in that case.
pub async fn enqueue_due_refreshes(
    store: &dyn JobStore,
    policy: &QueuePolicy,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let sounds = store.list_sounds_due_for_refresh().await?;
    let jobs: Vec<NewJob> = sounds
        .iter()
        .map(|s| {
            NewJob::new(
                s.workspace_id,
                JobPayload::RefreshSound { sound_id: s.id },
                now,
                policy.max_attempts,
            )
        })
        .collect();
    let ids = store.enqueue_jobs(&jobs).await?;
    tracing::info!(enqueued = ids.len(), "periodic sound refresh enqueued");
    Ok(ids.len())
}
