//! YouTube provider backed by the YouTube Data API v3.
//!
//! A Shorts sound is identified by the id of the video it was taken from
//! (`youtube.com/source/<id>/shorts`). The Data API exposes neither a usage
//! count nor a listing of Shorts using a source, so aggregates are a tagged
//! placeholder and listing is blocked.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Url};
use serde_json::Value;
use soundtrace_core::Platform;

use crate::error::{BlockedReason, ProviderError};
use crate::http::{
    build_client, json_i64, json_string, parse_base_url, parse_platform_url, retry_with_backoff,
    send_json, HttpSettings,
};
use crate::types::{ListMode, PostMetrics, PostPage, ResolvedSound, SoundAggregates};
use crate::SoundProvider;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/";

const HOSTS: &[&str] = &["youtube.com", "www.youtube.com", "m.youtube.com"];

static SOURCE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/source/([A-Za-z0-9_-]{11})(?:/shorts)?/?$").expect("valid source regex")
});

pub struct YoutubeProvider {
    client: Client,
    api_key: String,
    base_url: Url,
    max_retries: u32,
    retry_backoff_base_ms: u64,
}

impl YoutubeProvider {
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the client cannot be built, or
    /// [`ProviderError::InvalidUrl`] for a malformed base URL.
    pub(crate) fn new(
        api_key: &str,
        base_url: Option<&str>,
        settings: &HttpSettings,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(settings)?,
            api_key: api_key.to_owned(),
            base_url: parse_base_url(Platform::Youtube, base_url.unwrap_or(DEFAULT_BASE_URL))?,
            max_retries: settings.max_retries,
            retry_backoff_base_ms: settings.retry_backoff_base_ms,
        })
    }

    /// Fetches `videos?part=<part>&id=<id>` and returns the first item, if any.
    async fn video(&self, id: &str, part: &str) -> Result<Option<Value>, ProviderError> {
        let mut url = self
            .base_url
            .join("youtube/v3/videos")
            .map_err(|e| ProviderError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: e.to_string(),
            })?;
        url.query_pairs_mut()
            .append_pair("part", part)
            .append_pair("id", id)
            .append_pair("key", &self.api_key);

        let context = format!("videos(part={part}, id={id})");
        let body = retry_with_backoff(
            Platform::Youtube,
            self.max_retries,
            self.retry_backoff_base_ms,
            || send_json(Platform::Youtube, self.client.get(url.clone()), &context),
        )
        .await?;

        Ok(body
            .get("items")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .cloned())
    }
}

#[async_trait]
impl SoundProvider for YoutubeProvider {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    fn resolve_sound_from_url(&self, url: &str) -> Result<ResolvedSound, ProviderError> {
        if parse_platform_url(url, &["youtu.be"]).is_ok() {
            return Err(ProviderError::UnsupportedUrlForm {
                url: url.to_string(),
                hint: "video links must be resolved to their /source/<id>/shorts page".to_string(),
            });
        }

        let parsed = parse_platform_url(url, HOSTS)?;
        let path = parsed.path();
        if let Some(caps) = SOURCE_PATH.captures(path) {
            let id = caps[1].to_string();
            return Ok(ResolvedSound {
                platform: Platform::Youtube,
                canonical_url: format!("https://www.youtube.com/source/{id}/shorts"),
                platform_sound_id: id,
            });
        }
        if path.starts_with("/shorts/") || path == "/watch" {
            return Err(ProviderError::UnsupportedUrlForm {
                url: url.to_string(),
                hint: "video links must be resolved to their /source/<id>/shorts page".to_string(),
            });
        }
        Err(ProviderError::InvalidUrl {
            url: url.to_string(),
            reason: "expected a /source/<id>/shorts path".to_string(),
        })
    }

    async fn get_sound_aggregates(&self, sound_id: &str) -> Result<SoundAggregates, ProviderError> {
        let Some(item) = self.video(sound_id, "snippet").await? else {
            return Ok(SoundAggregates::unavailable("sound_not_found"));
        };
        let snippet = item.get("snippet");
        let thumbnails = snippet.and_then(|s| s.get("thumbnails"));
        let thumbnail_url = ["high", "medium", "default"]
            .iter()
            .find_map(|size| thumbnails.and_then(|t| json_string(t.get(*size)?.get("url"))));

        Ok(SoundAggregates {
            title: snippet.and_then(|s| json_string(s.get("title"))),
            artist: snippet.and_then(|s| json_string(s.get("channelTitle"))),
            thumbnail_url,
            ..SoundAggregates::unavailable("usage_count_not_exposed")
        })
    }

    async fn list_sound_posts(
        &self,
        _sound_id: &str,
        _mode: ListMode,
        _cursor: Option<&str>,
    ) -> Result<PostPage, ProviderError> {
        Err(ProviderError::Blocked {
            platform: Platform::Youtube,
            reason: BlockedReason::Unsupported,
        })
    }

    async fn get_post_metrics(&self, post_id: &str) -> Result<PostMetrics, ProviderError> {
        let item = self
            .video(post_id, "statistics")
            .await?
            .ok_or_else(|| ProviderError::NotFound {
                platform: Platform::Youtube,
                resource: format!("video {post_id}"),
            })?;
        let stats = item.get("statistics");

        Ok(PostMetrics {
            views: stats.and_then(|s| json_i64(s.get("viewCount"))),
            likes: stats.and_then(|s| json_i64(s.get("likeCount"))),
            comments: stats.and_then(|s| json_i64(s.get("commentCount"))),
            shares: None,
            metadata: serde_json::json!({ "source": "youtube", "shares_exposed": false }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> YoutubeProvider {
        let settings = HttpSettings {
            timeout_secs: 5,
            user_agent: "test".to_string(),
            max_retries: 0,
            retry_backoff_base_ms: 0,
        };
        YoutubeProvider::new("key", None, &settings).expect("client construction should not fail")
    }

    #[test]
    fn resolves_source_url() {
        let resolved = provider()
            .resolve_sound_from_url("https://www.youtube.com/source/dQw4w9WgXcQ/shorts")
            .unwrap();
        assert_eq!(resolved.platform_sound_id, "dQw4w9WgXcQ");
    }

    #[test]
    fn video_urls_are_unsupported_forms() {
        for url in [
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
        ] {
            let err = provider().resolve_sound_from_url(url).unwrap_err();
            assert!(
                matches!(err, ProviderError::UnsupportedUrlForm { .. }),
                "{url}: {err:?}"
            );
        }
    }

    #[test]
    fn channel_url_is_invalid() {
        let err = provider()
            .resolve_sound_from_url("https://www.youtube.com/@somechannel")
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn listing_is_blocked_as_unsupported() {
        let err = provider()
            .list_sound_posts("dQw4w9WgXcQ", ListMode::Top, None)
            .await
            .unwrap_err();
        assert_eq!(err.blocked_reason(), Some(BlockedReason::Unsupported));
    }
}
