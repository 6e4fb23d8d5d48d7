//! TikTok provider backed by a third-party TikTok data API.
//!
//! Endpoints (relative to the base URL, authenticated with `x-api-key`):
//!
//! | Call | Path |
//! |------|------|
//! | aggregates | `GET music/info?music_id=` |
//! | listing | `GET music/posts?music_id=&sort=top\|recent&cursor=` |
//! | metrics | `GET video/info?video_id=` |

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Url};
use serde_json::Value;
use soundtrace_core::Platform;

use crate::error::ProviderError;
use crate::http::{
    build_client, json_i64, json_string, parse_base_url, parse_platform_url, retry_with_backoff,
    send_json, unix_to_datetime, HttpSettings,
};
use crate::types::{
    DiscoveredPost, ListMode, PostMetrics, PostPage, ResolvedSound, SoundAggregates,
};
use crate::SoundProvider;

pub const DEFAULT_BASE_URL: &str = "https://api.tikapi.io/public/";

const HOSTS: &[&str] = &["tiktok.com", "www.tiktok.com", "m.tiktok.com"];
const SHORT_HOSTS: &[&str] = &["vm.tiktok.com", "vt.tiktok.com"];

static MUSIC_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/music/(?:[^/]*-)?(\d{6,})/?$").expect("valid music regex"));
static VIDEO_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/@[^/]+/video/(\d+)/?$").expect("valid video regex"));

pub struct TiktokProvider {
    client: Client,
    api_key: String,
    base_url: Url,
    max_retries: u32,
    retry_backoff_base_ms: u64,
}

impl TiktokProvider {
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
            base_url: parse_base_url(Platform::Tiktok, base_url.unwrap_or(DEFAULT_BASE_URL))?,
            max_retries: settings.max_retries,
            retry_backoff_base_ms: settings.retry_backoff_base_ms,
        })
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, ProviderError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| ProviderError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: e.to_string(),
            })?;
        url.query_pairs_mut().extend_pairs(params);
        Ok(url)
    }

    async fn get(&self, url: Url, context: &str) -> Result<Value, ProviderError> {
        retry_with_backoff(
            Platform::Tiktok,
            self.max_retries,
            self.retry_backoff_base_ms,
            || {
                let request = self
                    .client
                    .get(url.clone())
                    .header("x-api-key", &self.api_key);
                send_json(Platform::Tiktok, request, context)
            },
        )
        .await
    }
}

fn parse_video(item: &Value) -> Option<DiscoveredPost> {
    let id = json_string(item.get("id"))?;
    let author = item.get("author");
    let handle = author.and_then(|a| json_string(a.get("unique_id")));
    let post_url = match &handle {
        Some(h) => format!("https://www.tiktok.com/@{h}/video/{id}"),
        None => format!("https://www.tiktok.com/video/{id}"),
    };
    Some(DiscoveredPost {
        post_url,
        creator_id: author.and_then(|a| json_string(a.get("id"))),
        creator_handle: handle,
        posted_at: unix_to_datetime(json_i64(item.get("create_time"))),
        views: item.get("stats").and_then(|s| json_i64(s.get("play_count"))),
        platform_post_id: id,
    })
}

#[async_trait]
impl SoundProvider for TiktokProvider {
    fn platform(&self) -> Platform {
        Platform::Tiktok
    }

    fn resolve_sound_from_url(&self, url: &str) -> Result<ResolvedSound, ProviderError> {
        let host_check = parse_platform_url(url, SHORT_HOSTS);
        if host_check.is_ok() {
            return Err(ProviderError::UnsupportedUrlForm {
                url: url.to_string(),
                hint: "short links must be expanded to a /music/ URL first".to_string(),
            });
        }

        let parsed = parse_platform_url(url, HOSTS)?;
        let path = parsed.path();
        if let Some(caps) = MUSIC_PATH.captures(path) {
            let id = caps[1].to_string();
            return Ok(ResolvedSound {
                platform: Platform::Tiktok,
                canonical_url: format!("https://www.tiktok.com{}", path.trim_end_matches('/')),
                platform_sound_id: id,
            });
        }
        if VIDEO_PATH.is_match(path) || path.starts_with("/t/") {
            return Err(ProviderError::UnsupportedUrlForm {
                url: url.to_string(),
                hint: "video URLs must be resolved to their sound's /music/ URL first".to_string(),
            });
        }
        Err(ProviderError::InvalidUrl {
            url: url.to_string(),
            reason: "expected a /music/<name>-<id> path".to_string(),
        })
    }

    async fn get_sound_aggregates(&self, sound_id: &str) -> Result<SoundAggregates, ProviderError> {
        let url = self.endpoint("music/info", &[("music_id", sound_id)])?;
        let body = match self.get(url, &format!("music/info({sound_id})")).await {
            Ok(body) => body,
            Err(ProviderError::NotFound { .. }) => {
                return Ok(SoundAggregates::unavailable("sound_not_found"));
            }
            Err(e) => return Err(e),
        };

        let Some(music) = body.get("music") else {
            return Ok(SoundAggregates::unavailable("music_missing_from_response"));
        };
        let Some(total_uses) = json_i64(music.get("user_count")) else {
            return Ok(SoundAggregates {
                title: json_string(music.get("title")),
                artist: json_string(music.get("author")),
                thumbnail_url: json_string(music.get("cover_large")),
                ..SoundAggregates::unavailable("usage_count_missing")
            });
        };

        Ok(SoundAggregates {
            total_uses,
            title: json_string(music.get("title")),
            artist: json_string(music.get("author")),
            thumbnail_url: json_string(music.get("cover_large")),
            metadata: serde_json::json!({
                "source": "tiktok",
                "original": music.get("original").cloned().unwrap_or(Value::Null),
                "duration": music.get("duration").cloned().unwrap_or(Value::Null),
            }),
        })
    }

    async fn list_sound_posts(
        &self,
        sound_id: &str,
        mode: ListMode,
        cursor: Option<&str>,
    ) -> Result<PostPage, ProviderError> {
        let mut params = vec![("music_id", sound_id), ("sort", mode.as_str())];
        if let Some(c) = cursor {
            params.push(("cursor", c));
        }
        let url = self.endpoint("music/posts", &params)?;
        let body = self
            .get(url, &format!("music/posts({sound_id}, {})", mode.as_str()))
            .await?;

        let posts = body
            .get("videos")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_video).collect())
            .unwrap_or_default();
        let has_more = body.get("has_more").and_then(Value::as_bool).unwrap_or(false);
        let next_cursor = if has_more {
            json_string(body.get("cursor"))
        } else {
            None
        };

        Ok(PostPage { posts, next_cursor })
    }

    async fn get_post_metrics(&self, post_id: &str) -> Result<PostMetrics, ProviderError> {
        let url = self.endpoint("video/info", &[("video_id", post_id)])?;
        let body = self.get(url, &format!("video/info({post_id})")).await?;
        let stats = body
            .get("video")
            .and_then(|v| v.get("stats"))
            .ok_or_else(|| ProviderError::NotFound {
                platform: Platform::Tiktok,
                resource: format!("stats for video {post_id}"),
            })?;

        Ok(PostMetrics {
            views: json_i64(stats.get("play_count")),
            likes: json_i64(stats.get("digg_count")),
            comments: json_i64(stats.get("comment_count")),
            shares: json_i64(stats.get("share_count")),
            metadata: serde_json::json!({ "source": "tiktok" }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> TiktokProvider {
        let settings = HttpSettings {
            timeout_secs: 5,
            user_agent: "test".to_string(),
            max_retries: 0,
            retry_backoff_base_ms: 0,
        };
        TiktokProvider::new("key", None, &settings).expect("client construction should not fail")
    }

    #[test]
    fn resolves_music_url_with_slug() {
        let resolved = provider()
            .resolve_sound_from_url("https://www.tiktok.com/music/original-sound-7234567890123456789")
            .unwrap();
        assert_eq!(resolved.platform_sound_id, "7234567890123456789");
        assert_eq!(resolved.platform, Platform::Tiktok);
    }

    #[test]
    fn resolves_music_url_without_scheme_and_trailing_slash() {
        let resolved = provider()
            .resolve_sound_from_url("tiktok.com/music/Song-Name-7001234567/?lang=en")
            .unwrap();
        assert_eq!(resolved.platform_sound_id, "7001234567");
    }

    #[test]
    fn video_url_is_unsupported_form() {
        let err = provider()
            .resolve_sound_from_url("https://www.tiktok.com/@someone/video/7300000000000000000")
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedUrlForm { .. }));
    }

    #[test]
    fn short_link_is_unsupported_form() {
        let err = provider()
            .resolve_sound_from_url("https://vm.tiktok.com/ZMabc123/")
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedUrlForm { .. }));
    }

    #[test]
    fn foreign_host_is_invalid() {
        let err = provider()
            .resolve_sound_from_url("https://www.instagram.com/reels/audio/123456789/")
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidUrl { .. }));
    }

    #[test]
    fn parse_video_builds_canonical_url() {
        let item = serde_json::json!({
            "id": "7300000000000000001",
            "author": {"unique_id": "dancer", "id": "6800"},
            "create_time": 1_700_000_000,
            "stats": {"play_count": 1500}
        });
        let post = parse_video(&item).unwrap();
        assert_eq!(
            post.post_url,
            "https://www.tiktok.com/@dancer/video/7300000000000000001"
        );
        assert_eq!(post.views, Some(1500));
        assert!(post.posted_at.is_some());
    }

    #[test]
    fn parse_video_skips_items_without_id() {
        assert!(parse_video(&serde_json::json!({"stats": {}})).is_none());
    }
}
