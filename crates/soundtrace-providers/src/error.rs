use soundtrace_core::Platform;
use thiserror::Error;

/// Why a provider could not produce data. Not an application failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockedReason {
    RateLimited,
    QuotaExhausted,
    Unsupported,
}

impl BlockedReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BlockedReason::RateLimited => "rate_limited",
            BlockedReason::QuotaExhausted => "quota_exhausted",
            BlockedReason::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for BlockedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by a [`crate::SoundProvider`].
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The URL is malformed or does not belong to the platform.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The URL is valid but this shape cannot be resolved to a sound directly.
    #[error("unsupported URL form '{url}': {hint}")]
    UnsupportedUrlForm { url: String, hint: String },

    /// Rate limit, quota or unsupported operation.
    #[error("{platform} provider blocked: {reason}")]
    Blocked {
        platform: Platform,
        reason: BlockedReason,
    },

    /// A required credential is not configured.
    #[error("{platform} provider is not configured: {var} is not set")]
    MissingConfig {
        platform: Platform,
        var: &'static str,
    },

    #[error("{platform} rejected the credentials (HTTP {status})")]
    Unauthorized { platform: Platform, status: u16 },

    #[error("{platform} has no {resource}")]
    NotFound { platform: Platform, resource: String },

    #[error("{platform} returned HTTP {status}: {body}")]
    UnexpectedStatus {
        platform: Platform,
        status: u16,
        body: String,
    },

    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{platform} call timed out after {secs}s")]
    Timeout { platform: Platform, secs: u64 },
}

impl ProviderError {
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, ProviderError::Blocked { .. })
    }

    #[must_use]
    pub fn blocked_reason(&self) -> Option<BlockedReason> {
        match self {
            ProviderError::Blocked { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Errors that retrying the same call will never fix: bad input or
    /// missing or rejected credentials.
    #[must_use]
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            ProviderError::InvalidUrl { .. }
                | ProviderError::UnsupportedUrlForm { .. }
                | ProviderError::MissingConfig { .. }
                | ProviderError::Unauthorized { .. }
        )
    }

    /// Transport failures and 5xx responses, worth an immediate in-call retry.
    pub(crate) fn is_retriable(&self) -> bool {
        match self {
            ProviderError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            ProviderError::UnexpectedStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
