//! Instagram provider backed by a third-party Instagram data API.
//!
//! Reels audio pages have no ranking option, so both [`ListMode`]s hit the
//! same listing. Shares are not exposed.

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

pub const DEFAULT_BASE_URL: &str = "https://api.hikerapi.com/v1/";

const HOSTS: &[&str] = &["instagram.com", "www.instagram.com", "m.instagram.com"];

static AUDIO_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/reels/audio/(\d+)/?$").expect("valid audio regex"));
static MEDIA_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(?:reels?|p)/[A-Za-z0-9_-]+/?$").expect("valid media regex"));

pub struct InstagramProvider {
    client: Client,
    api_key: String,
    base_url: Url,
    max_retries: u32,
    retry_backoff_base_ms: u64,
}

impl InstagramProvider {
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
            base_url: parse_base_url(Platform::Instagram, base_url.unwrap_or(DEFAULT_BASE_URL))?,
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
            Platform::Instagram,
            self.max_retries,
            self.retry_backoff_base_ms,
            || {
                let request = self
                    .client
                    .get(url.clone())
                    .header("x-api-key", &self.api_key);
                send_json(Platform::Instagram, request, context)
            },
        )
        .await
    }
}

fn parse_reel(item: &Value) -> Option<DiscoveredPost> {
    let code = json_string(item.get("code"))?;
    let user = item.get("user");
    Some(DiscoveredPost {
        post_url: format!("https://www.instagram.com/reel/{code}/"),
        creator_handle: user.and_then(|u| json_string(u.get("username"))),
        creator_id: user.and_then(|u| json_string(u.get("pk"))),
        posted_at: unix_to_datetime(json_i64(item.get("taken_at"))),
        views: json_i64(item.get("play_count")),
        platform_post_id: code,
    })
}

#[async_trait]
impl SoundProvider for InstagramProvider {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn resolve_sound_from_url(&self, url: &str) -> Result<ResolvedSound, ProviderError> {
        let parsed = parse_platform_url(url, HOSTS)?;
        let path = parsed.path();
        if let Some(caps) = AUDIO_PATH.captures(path) {
            let id = caps[1].to_string();
            return Ok(ResolvedSound {
                platform: Platform::Instagram,
                canonical_url: format!("https://www.instagram.com/reels/audio/{id}/"),
                platform_sound_id: id,
            });
        }
        if MEDIA_PATH.is_match(path) {
            return Err(ProviderError::UnsupportedUrlForm {
                url: url.to_string(),
                hint: "open the reel's audio page and submit its /reels/audio/ URL".to_string(),
            });
        }
        Err(ProviderError::InvalidUrl {
            url: url.to_string(),
            reason: "expected a /reels/audio/<id> path".to_string(),
        })
    }

    async fn get_sound_aggregates(&self, sound_id: &str) -> Result<SoundAggregates, ProviderError> {
        let url = self.endpoint("audio/info", &[("audio_id", sound_id)])?;
        let body = match self.get(url, &format!("audio/info({sound_id})")).await {
            Ok(body) => body,
            Err(ProviderError::NotFound { .. }) => {
                return Ok(SoundAggregates::unavailable("sound_not_found"));
            }
            Err(e) => return Err(e),
        };

        let Some(audio) = body.get("audio") else {
            return Ok(SoundAggregates::unavailable("audio_missing_from_response"));
        };
        let title = json_string(audio.get("title"));
        let artist = json_string(audio.get("artist"));
        let thumbnail_url = json_string(audio.get("cover_url"));

        match json_i64(audio.get("reels_count")) {
            Some(total_uses) => Ok(SoundAggregates {
                total_uses,
                title,
                artist,
                thumbnail_url,
                metadata: serde_json::json!({ "source": "instagram" }),
            }),
            None => Ok(SoundAggregates {
                title,
                artist,
                thumbnail_url,
                ..SoundAggregates::unavailable("usage_count_missing")
            }),
        }
    }

    async fn list_sound_posts(
        &self,
        sound_id: &str,
        mode: ListMode,
        cursor: Option<&str>,
    ) -> Result<PostPage, ProviderError> {
        let mut params = vec![("audio_id", sound_id)];
        if let Some(c) = cursor {
            params.push(("cursor", c));
        }
        let url = self.endpoint("audio/reels", &params)?;
        let body = self
            .get(url, &format!("audio/reels({sound_id}, {})", mode.as_str()))
            .await?;

        let posts = body
            .get("items")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_reel).collect())
            .unwrap_or_default();

        Ok(PostPage {
            posts,
            next_cursor: json_string(body.get("next_cursor")),
        })
    }

    async fn get_post_metrics(&self, post_id: &str) -> Result<PostMetrics, ProviderError> {
        let url = self.endpoint("media/info", &[("code", post_id)])?;
        let body = self.get(url, &format!("media/info({post_id})")).await?;
        let media = body.get("media").ok_or_else(|| ProviderError::NotFound {
            platform: Platform::Instagram,
            resource: format!("media {post_id}"),
        })?;

        Ok(PostMetrics {
            views: json_i64(media.get("play_count")),
            likes: json_i64(media.get("like_count")),
            comments: json_i64(media.get("comment_count")),
            shares: None,
            metadata: serde_json::json!({ "source": "instagram", "shares_exposed": false }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> InstagramProvider {
        let settings = HttpSettings {
            timeout_secs: 5,
            user_agent: "test".to_string(),
            max_retries: 0,
            retry_backoff_base_ms: 0,
        };
        InstagramProvider::new("key", None, &settings)
            .expect("client construction should not fail")
    }

    #[test]
    fn resolves_audio_url() {
        let resolved = provider()
            .resolve_sound_from_url("https://www.instagram.com/reels/audio/1234567890123/")
            .unwrap();
        assert_eq!(resolved.platform_sound_id, "1234567890123");
        assert_eq!(
            resolved.canonical_url,
            "https://www.instagram.com/reels/audio/1234567890123/"
        );
    }

    #[test]
    fn reel_and_post_urls_are_unsupported_forms() {
        for url in [
            "https://www.instagram.com/reel/Cx1AbC2dEf/",
            "https://instagram.com/p/Cx1AbC2dEf",
        ] {
            let err = provider().resolve_sound_from_url(url).unwrap_err();
            assert!(
                matches!(err, ProviderError::UnsupportedUrlForm { .. }),
                "{url}: {err:?}"
            );
        }
    }

    #[test]
    fn profile_url_is_invalid() {
        let err = provider()
            .resolve_sound_from_url("https://www.instagram.com/someone/")
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidUrl { .. }));
    }

    #[test]
    fn parse_reel_uses_shortcode_as_post_id() {
        let item = serde_json::json!({
            "code": "Cx1AbC2dEf",
            "user": {"username": "singer", "pk": 42},
            "play_count": "900"
        });
        let post = parse_reel(&item).unwrap();
        assert_eq!(post.platform_post_id, "Cx1AbC2dEf");
        assert_eq!(post.creator_id.as_deref(), Some("42"));
        assert_eq!(post.views, Some(900));
    }
}
