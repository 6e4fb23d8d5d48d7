//! One handler per job type.
//!
//! Handlers return `Ok` for blocked provider responses after recording a
//! blocked snapshot; only genuine failures become a [`JobError`].

use std::future::Future;
use std::time::Duration;

use soundtrace_core::{
    JobPayload, NewJob, NewPostSnapshot, NewSoundSnapshot, Platform, TrackedSound,
};
use soundtrace_providers::{ProviderError, ProviderRegistry};
use uuid::Uuid;

use crate::clock::Clock;
use crate::discovery;
use crate::error::JobError;
use crate::runner::RunnerConfig;
use crate::store::JobStore;

/// Everything a handler needs for one job.
pub struct HandlerContext<'a> {
    pub store: &'a dyn JobStore,
    pub providers: &'a ProviderRegistry,
    pub config: &'a RunnerConfig,
    /// Read when a response arrives: snapshot times, `last_seen_at`, `run_at`
    /// of follow-up jobs.
    pub clock: &'a dyn Clock,
    pub workspace_id: Uuid,
}

/// Successful handler result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerReport {
    pub blocked: bool,
    pub detail: serde_json::Value,
}

/// Bounds a provider call by `timeout`.
pub(crate) async fn bounded<T, F>(
    platform: Platform,
    timeout: Duration,
    call: F,
) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            platform,
            secs: timeout.as_secs(),
        }),
    }
}

/// Dispatches a decoded payload to its handler.
///
/// # Errors
///
/// Whatever the handler reports.
pub async fn dispatch(
    ctx: &HandlerContext<'_>,
    payload: &JobPayload,
) -> Result<HandlerReport, JobError> {
    match payload {
        JobPayload::RefreshSound { sound_id } => refresh_sound(ctx, *sound_id).await,
        JobPayload::DiscoverPosts { sound_id } => discover_posts(ctx, *sound_id).await,
        JobPayload::RefreshPostMetrics { post_id } => refresh_post_metrics(ctx, *post_id).await,
    }
}

async fn load_sound(ctx: &HandlerContext<'_>, sound_id: Uuid) -> Result<TrackedSound, JobError> {
    ctx.store
        .get_sound(sound_id)
        .await?
        .ok_or(JobError::MissingEntity {
            entity: "sound",
            id: sound_id,
        })
}

/// Snapshots sound aggregates, backfills metadata and queues discovery.
async fn refresh_sound(ctx: &HandlerContext<'_>, sound_id: Uuid) -> Result<HandlerReport, JobError> {
    let sound = load_sound(ctx, sound_id).await?;
    let provider = ctx.providers.require(sound.platform)?;

    let aggregates = bounded(
        sound.platform,
        ctx.config.provider_timeout,
        provider.get_sound_aggregates(&sound.platform_sound_id),
    )
    .await;
    let observed_at = ctx.clock.now();

    let placeholder = matches!(&aggregates, Ok(a) if a.is_placeholder());
    let (snapshot, blocked) = match aggregates {
        Ok(aggregates) => {
            if placeholder {
                tracing::info!(
                    sound_id = %sound.id,
                    platform = %sound.platform,
                    note = ?aggregates.metadata.get("note"),
                    "provider returned placeholder aggregates"
                );
            }
            let wants_backfill = (sound.title.is_none() && aggregates.title.is_some())
                || (sound.artist.is_none() && aggregates.artist.is_some())
                || (sound.thumbnail_url.is_none() && aggregates.thumbnail_url.is_some());
            if wants_backfill {
                ctx.store
                    .backfill_sound_metadata(
                        sound.id,
                        aggregates.title.as_deref(),
                        aggregates.artist.as_deref(),
                        aggregates.thumbnail_url.as_deref(),
                    )
                    .await?;
            }
            let snapshot = NewSoundSnapshot {
                sound_id: sound.id,
                captured_at: observed_at,
                total_uses: Some(aggregates.total_uses),
                blocked: false,
                metadata: aggregates.metadata,
            };
            (snapshot, false)
        }
        Err(ProviderError::Blocked { reason, .. }) => {
            tracing::warn!(
                sound_id = %sound.id,
                platform = %sound.platform,
                %reason,
                "sound aggregates blocked, recording placeholder"
            );
            (
                NewSoundSnapshot::blocked(sound.id, observed_at, reason.as_str()),
                true,
            )
        }
        Err(e) => return Err(e.into()),
    };

    ctx.store.insert_sound_snapshot(&snapshot).await?;
    let discover = NewJob::new(
        ctx.workspace_id,
        JobPayload::DiscoverPosts { sound_id: sound.id },
        ctx.clock.now(),
        ctx.config.policy.max_attempts,
    );
    ctx.store.enqueue_jobs(&[discover]).await?;

    Ok(HandlerReport {
        blocked,
        detail: serde_json::json!({
            "total_uses": snapshot.total_uses,
            "placeholder": placeholder,
            "discover_enqueued": true,
        }),
    })
}

async fn discover_posts(ctx: &HandlerContext<'_>, sound_id: Uuid) -> Result<HandlerReport, JobError> {
    let sound = load_sound(ctx, sound_id).await?;
    let provider = ctx.providers.require(sound.platform)?;
    let result = discovery::discover_posts(ctx, provider.as_ref(), &sound).await?;

    Ok(HandlerReport {
        blocked: result.blocked.is_some(),
        detail: serde_json::json!({
            "discovered": result.discovered,
            "metric_jobs_enqueued": result.metric_jobs_enqueued,
            "blocked_reason": result.blocked.map(|r| r.as_str()),
        }),
    })
}

/// Snapshots engagement counters for one post.
///
/// A post row that vanished is an integrity failure: it is retried like any
/// other error and ends up `failed`.
async fn refresh_post_metrics(
    ctx: &HandlerContext<'_>,
    post_id: Uuid,
) -> Result<HandlerReport, JobError> {
    let post = ctx
        .store
        .get_post(post_id)
        .await?
        .ok_or(JobError::MissingEntity {
            entity: "post",
            id: post_id,
        })?;
    let provider = ctx.providers.require(post.platform)?;

    let metrics = bounded(
        post.platform,
        ctx.config.provider_timeout,
        provider.get_post_metrics(&post.platform_post_id),
    )
    .await;
    let observed_at = ctx.clock.now();

    let (snapshot, blocked) = match metrics {
        Ok(m) => (
            NewPostSnapshot {
                post_id: post.id,
                captured_at: observed_at,
                views: m.views,
                likes: m.likes,
                comments: m.comments,
                shares: m.shares,
                blocked: false,
                metadata: m.metadata,
            },
            false,
        ),
        Err(ProviderError::Blocked { reason, .. }) => {
            tracing::warn!(
                post_id = %post.id,
                platform = %post.platform,
                %reason,
                "post metrics blocked, recording placeholder"
            );
            (
                NewPostSnapshot::blocked(post.id, observed_at, reason.as_str()),
                true,
            )
        }
        Err(e) => return Err(e.into()),
    };

    ctx.store.insert_post_snapshot(&snapshot).await?;
    Ok(HandlerReport {
        blocked,
        detail: serde_json::json!({ "views": snapshot.views }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_turns_slow_calls_into_timeouts() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, ProviderError>(1)
        };
        let err = bounded(Platform::Tiktok, Duration::from_millis(10), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { .. }));
    }

    #[tokio::test]
    async fn bounded_passes_through_fast_results() {
        let fast = async { Ok::<_, ProviderError>(7) };
        let value = bounded(Platform::Tiktok, Duration::from_secs(1), fast)
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
