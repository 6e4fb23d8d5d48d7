//! Shared HTTP plumbing: client construction, status mapping and in-call
//! retry with exponential back-off and jitter.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode, Url};
use soundtrace_core::Platform;

use crate::error::{BlockedReason, ProviderError};

/// Longest response body excerpt kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Ceiling on a single in-call retry sleep, before jitter.
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Jitter spread applied to retry sleeps: `[0.75, 1.25)` of the base delay.
const RETRY_JITTER_LOW: f64 = 0.75;
const RETRY_JITTER_SPAN: f64 = 0.5;

#[derive(Debug, Clone)]
pub(crate) struct HttpSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
}

pub(crate) fn build_client(settings: &HttpSettings) -> Result<Client, ProviderError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(settings.user_agent.clone())
        .build()?;
    Ok(client)
}

/// Parses a base URL, normalising it to end in exactly one slash so `join`
/// appends instead of replacing the last segment.
pub(crate) fn parse_base_url(platform: Platform, base_url: &str) -> Result<Url, ProviderError> {
    let normalised = format!("{}/", base_url.trim_end_matches('/'));
    Url::parse(&normalised).map_err(|e| ProviderError::InvalidUrl {
        url: base_url.to_string(),
        reason: format!("invalid {platform} base URL: {e}"),
    })
}

/// Parses a user-submitted URL and checks its host against `hosts`.
///
/// A bare host without scheme is accepted and treated as `https`.
pub(crate) fn parse_platform_url(raw: &str, hosts: &[&str]) -> Result<Url, ProviderError> {
    let trimmed = raw.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let url = Url::parse(&candidate).map_err(|e| ProviderError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProviderError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if !hosts.iter().any(|h| host == *h) {
        return Err(ProviderError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("host '{host}' does not belong to this platform"),
        });
    }
    Ok(url)
}

/// Sends a request and decodes a 2xx JSON body, mapping error statuses onto
/// [`ProviderError`].
pub(crate) async fn send_json(
    platform: Platform,
    request: RequestBuilder,
    context: &str,
) -> Result<serde_json::Value, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(map_status(platform, status, &body, context));
    }

    serde_json::from_str(&body).map_err(|e| ProviderError::Deserialize {
        context: context.to_string(),
        source: e,
    })
}

fn map_status(platform: Platform, status: StatusCode, body: &str, context: &str) -> ProviderError {
    let blocked = |reason| ProviderError::Blocked { platform, reason };
    match status {
        StatusCode::TOO_MANY_REQUESTS => blocked(BlockedReason::RateLimited),
        StatusCode::PAYMENT_REQUIRED => blocked(BlockedReason::QuotaExhausted),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            // Google APIs report exhausted quota as 403 with a reason string.
            if body.contains("quotaExceeded") || body.contains("dailyLimitExceeded") {
                blocked(BlockedReason::QuotaExhausted)
            } else if body.contains("rateLimitExceeded") {
                blocked(BlockedReason::RateLimited)
            } else {
                ProviderError::Unauthorized {
                    platform,
                    status: status.as_u16(),
                }
            }
        }
        StatusCode::NOT_FOUND => ProviderError::NotFound {
            platform,
            resource: context.to_string(),
        },
        _ => ProviderError::UnexpectedStatus {
            platform,
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        },
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on transient
/// errors (transport failures, 5xx). Everything else is returned immediately.
///
/// Delay before retry `n` is `backoff_base_ms * 2^(n-1)` with ±25 % jitter,
/// capped at 30 s.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    platform: Platform,
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retriable() || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let capped = retry_delay_ms(backoff_base_ms, attempt);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64
                    * (rand::random::<f64>() * RETRY_JITTER_SPAN + RETRY_JITTER_LOW))
                    as u64;
                tracing::warn!(
                    %platform,
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "provider transient error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// Un-jittered sleep before retry `attempt` (1-based).
fn retry_delay_ms(backoff_base_ms: u64, attempt: u32) -> u64 {
    backoff_base_ms
        .saturating_mul(1u64 << attempt.saturating_sub(1).min(10))
        .min(MAX_RETRY_DELAY_MS)
}

/// Worst-case wall time of one provider call including every in-call retry:
/// `max_retries + 1` request timeouts plus the longest jittered sleep before
/// each retry.
pub(crate) fn call_budget(settings: &HttpSettings) -> Duration {
    let attempts = settings.max_retries.saturating_add(1);
    let requests = Duration::from_secs(settings.timeout_secs).saturating_mul(attempts);
    let sleeps_ms: u64 = (1..=settings.max_retries)
        .map(|n| retry_delay_ms(settings.retry_backoff_base_ms, n))
        .fold(0u64, u64::saturating_add);
    // Upper edge of the jitter range is 1.25x.
    let sleeps = Duration::from_millis(sleeps_ms.saturating_add(sleeps_ms / 4));
    requests.saturating_add(sleeps)
}

/// Reads an integer that may arrive as a JSON number or a numeric string.
pub(crate) fn json_i64(value: Option<&serde_json::Value>) -> Option<i64> {
    match value? {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn json_string(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Converts a unix timestamp in seconds into a UTC datetime.
pub(crate) fn unix_to_datetime(secs: Option<i64>) -> Option<chrono::DateTime<chrono::Utc>> {
    secs.and_then(|s| chrono::DateTime::from_timestamp(s, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn status_429_is_rate_limited() {
        let err = map_status(Platform::Tiktok, StatusCode::TOO_MANY_REQUESTS, "", "ctx");
        assert_eq!(err.blocked_reason(), Some(BlockedReason::RateLimited));
    }

    #[test]
    fn forbidden_with_quota_reason_is_quota_exhausted() {
        let body = r#"{"error":{"errors":[{"reason":"quotaExceeded"}]}}"#;
        let err = map_status(Platform::Youtube, StatusCode::FORBIDDEN, body, "ctx");
        assert_eq!(err.blocked_reason(), Some(BlockedReason::QuotaExhausted));
    }

    #[test]
    fn plain_forbidden_is_unauthorized() {
        let err = map_status(Platform::Instagram, StatusCode::FORBIDDEN, "nope", "ctx");
        assert!(matches!(err, ProviderError::Unauthorized { status: 403, .. }));
    }

    #[test]
    fn error_body_is_truncated() {
        let body = "x".repeat(1_000);
        let err = map_status(Platform::Tiktok, StatusCode::IM_A_TEAPOT, &body, "ctx");
        match err {
            ProviderError::UnexpectedStatus { body, .. } => {
                assert_eq!(body.len(), MAX_ERROR_BODY_CHARS);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn platform_url_accepts_missing_scheme() {
        let url = parse_platform_url("www.tiktok.com/music/x-1", &["www.tiktok.com"]).unwrap();
        assert_eq!(url.path(), "/music/x-1");
    }

    #[test]
    fn platform_url_rejects_foreign_host() {
        let err = parse_platform_url("https://example.com/music/x-1", &["www.tiktok.com"])
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidUrl { .. }));
    }

    #[test]
    fn json_i64_reads_numeric_strings() {
        let v = serde_json::json!({"a": "42", "b": 7, "c": null});
        assert_eq!(json_i64(v.get("a")), Some(42));
        assert_eq!(json_i64(v.get("b")), Some(7));
        assert_eq!(json_i64(v.get("c")), None);
        assert_eq!(json_i64(v.get("missing")), None);
    }

    fn settings(timeout_secs: u64, max_retries: u32, base_ms: u64) -> HttpSettings {
        HttpSettings {
            timeout_secs,
            user_agent: "test".to_string(),
            max_retries,
            retry_backoff_base_ms: base_ms,
        }
    }

    #[test]
    fn retry_delay_doubles_and_caps() {
        assert_eq!(retry_delay_ms(500, 1), 500);
        assert_eq!(retry_delay_ms(500, 2), 1_000);
        assert_eq!(retry_delay_ms(500, 30), MAX_RETRY_DELAY_MS);
    }

    #[test]
    fn call_budget_without_retries_is_one_timeout() {
        assert_eq!(call_budget(&settings(30, 0, 500)), Duration::from_secs(30));
    }

    #[test]
    fn call_budget_leaves_room_for_every_retry() {
        // 3 x 30 s requests, sleeps of 500 ms and 1 s at 1.25x jitter.
        let budget = call_budget(&settings(30, 2, 500));
        assert_eq!(budget, Duration::from_millis(90_000 + 1_875));
        assert!(budget > Duration::from_secs(30) * 2);
    }

    #[tokio::test]
    async fn retry_does_not_repeat_blocked() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(Platform::Tiktok, 3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(ProviderError::Blocked {
                    platform: Platform::Tiktok,
                    reason: BlockedReason::RateLimited,
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.unwrap_err().is_blocked());
    }

    #[tokio::test]
    async fn retry_repeats_server_errors_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(Platform::Tiktok, 3, 0, || {
            let c = Arc::clone(&c);
            async move {
                let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err(ProviderError::UnexpectedStatus {
                        platform: Platform::Tiktok,
                        status: 502,
                        body: String::new(),
                    })
                } else {
                    Ok(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
