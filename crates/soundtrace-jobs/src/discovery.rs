//! Post discovery for one tracked sound.
//!
//! Lists posts in `top` then `recent` order, keeps the first occurrence of
//! each platform post id, upserts all of them and fans out metric refreshes
//! for the most-viewed subset. A blocked listing ends the run successfully
//! with nothing discovered.

use std::collections::HashSet;
use std::time::Duration;

use soundtrace_core::{AppConfig, JobPayload, NewJob, TrackedSound};
use soundtrace_providers::{
    BlockedReason, DiscoveredPost, ListMode, ProviderError, SoundProvider,
};

use crate::error::JobError;
use crate::handlers::{bounded, HandlerContext};

pub const DEFAULT_TOP_N: usize = 50;
pub const DEFAULT_MAX_PAGES: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Upper bound on `refresh_post_metrics` jobs per run.
    pub top_n: usize,
    /// Pages followed per ranking mode.
    pub max_pages: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl DiscoveryConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            top_n: config.discovery_top_n,
            max_pages: config.discovery_max_pages.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResult {
    /// Unique posts after merging both modes.
    pub discovered: usize,
    pub metric_jobs_enqueued: usize,
    pub blocked: Option<BlockedReason>,
}

impl DiscoveryResult {
    fn blocked(reason: BlockedReason) -> Self {
        Self {
            discovered: 0,
            metric_jobs_enqueued: 0,
            blocked: Some(reason),
        }
    }
}

/// Concatenates `top` and `recent` and drops later duplicates by platform
/// post id, so a post present in both keeps its top-mode data.
#[must_use]
pub fn merge_and_dedupe(
    top: Vec<DiscoveredPost>,
    recent: Vec<DiscoveredPost>,
) -> Vec<DiscoveredPost> {
    let mut seen = HashSet::new();
    top.into_iter()
        .chain(recent)
        .filter(|p| seen.insert(p.platform_post_id.clone()))
        .collect()
}

/// Picks up to `n` posts by descending view count, missing counts as zero.
/// Ties keep merge order.
#[must_use]
pub fn select_for_refresh(posts: &[DiscoveredPost], n: usize) -> Vec<&DiscoveredPost> {
    let mut ranked: Vec<&DiscoveredPost> = posts.iter().collect();
    ranked.sort_by_key(|p| std::cmp::Reverse(p.views.unwrap_or(0)));
    ranked.truncate(n);
    ranked
}

async fn list_mode(
    provider: &dyn SoundProvider,
    sound_id: &str,
    mode: ListMode,
    max_pages: u32,
    timeout: Duration,
) -> Result<Vec<DiscoveredPost>, ProviderError> {
    let platform = provider.platform();
    let mut posts = Vec::new();
    let mut cursor: Option<String> = None;

    for _ in 0..max_pages {
        let page = bounded(
            platform,
            timeout,
            provider.list_sound_posts(sound_id, mode, cursor.as_deref()),
        )
        .await?;
        posts.extend(page.posts);
        match page.next_cursor {
            Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
            _ => break,
        }
    }
    Ok(posts)
}

/// Runs discovery for `sound`.
///
/// # Errors
///
/// Non-blocked provider failures and store failures.
pub async fn discover_posts(
    ctx: &HandlerContext<'_>,
    provider: &dyn SoundProvider,
    sound: &TrackedSound,
) -> Result<DiscoveryResult, JobError> {
    let config = ctx.config.discovery;
    let timeout = ctx.config.provider_timeout;

    let mut by_mode = Vec::with_capacity(2);
    for mode in [ListMode::Top, ListMode::Recent] {
        match list_mode(provider, &sound.platform_sound_id, mode, config.max_pages, timeout).await {
            Ok(posts) => by_mode.push(posts),
            Err(ProviderError::Blocked { reason, .. }) => {
                tracing::warn!(
                    sound_id = %sound.id,
                    platform = %sound.platform,
                    mode = mode.as_str(),
                    %reason,
                    "discovery blocked, recording zero posts"
                );
                return Ok(DiscoveryResult::blocked(reason));
            }
            Err(e) => return Err(e.into()),
        }
    }
    let recent = by_mode.pop().unwrap_or_default();
    let top = by_mode.pop().unwrap_or_default();

    let seen_at = ctx.clock.now();
    let merged = merge_and_dedupe(top, recent);
    let new_posts: Vec<_> = merged.iter().map(DiscoveredPost::to_new_post).collect();
    let stored = ctx
        .store
        .upsert_posts(
            sound.workspace_id,
            sound.id,
            sound.platform,
            &new_posts,
            seen_at,
        )
        .await?;

    let jobs: Vec<NewJob> = select_for_refresh(&merged, config.top_n)
        .into_iter()
        .filter_map(|post| {
            stored
                .iter()
                .find(|s| s.platform_post_id == post.platform_post_id)
        })
        .map(|s| {
            NewJob::new(
                sound.workspace_id,
                JobPayload::RefreshPostMetrics { post_id: s.id },
                seen_at,
                ctx.config.policy.max_attempts,
            )
        })
        .collect();
    ctx.store.enqueue_jobs(&jobs).await?;

    tracing::info!(
        sound_id = %sound.id,
        discovered = merged.len(),
        metric_jobs = jobs.len(),
        "discovery complete"
    );

    Ok(DiscoveryResult {
        discovered: merged.len(),
        metric_jobs_enqueued: jobs.len(),
        blocked: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str, views: Option<i64>) -> DiscoveredPost {
        DiscoveredPost {
            platform_post_id: id.to_string(),
            post_url: format!("https://example.com/{id}"),
            creator_handle: None,
            creator_id: None,
            posted_at: None,
            views,
        }
    }

    #[test]
    fn merge_keeps_first_occurrence() {
        let merged = merge_and_dedupe(
            vec![post("p", Some(500)), post("a", Some(1))],
            vec![post("p", Some(0)), post("b", None)],
        );
        let ids: Vec<_> = merged.iter().map(|p| p.platform_post_id.as_str()).collect();
        assert_eq!(ids, vec!["p", "a", "b"]);
        assert_eq!(merged[0].views, Some(500));
    }

    #[test]
    fn merge_dedupes_within_one_mode() {
        let merged = merge_and_dedupe(vec![post("x", Some(1)), post("x", Some(2))], vec![]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].views, Some(1));
    }

    #[test]
    fn selection_ranks_by_views_with_missing_as_zero() {
        let posts = vec![
            post("none", None),
            post("low", Some(3)),
            post("high", Some(90)),
            post("zero", Some(0)),
        ];
        let picked: Vec<_> = select_for_refresh(&posts, 3)
            .iter()
            .map(|p| p.platform_post_id.as_str())
            .collect();
        assert_eq!(picked, vec!["high", "low", "none"]);
    }

    #[test]
    fn selection_is_bounded() {
        let posts: Vec<_> = (0..80).map(|i| post(&i.to_string(), Some(i))).collect();
        let picked = select_for_refresh(&posts, 50);
        assert_eq!(picked.len(), 50);
        assert_eq!(picked[0].views, Some(79));
        assert_eq!(picked[49].views, Some(30));
    }
}
