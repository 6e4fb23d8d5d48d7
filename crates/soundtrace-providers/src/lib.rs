//! Per-platform sound providers.
//!
//! Every platform implements [`SoundProvider`]. Callers obtain one through
//! [`create_provider`] or a [`ProviderRegistry`] built from an explicit
//! [`ProviderConfig`]; nothing here reads the process environment.

pub mod error;
pub mod factory;
mod http;
pub mod instagram;
pub mod tiktok;
pub mod types;
pub mod youtube;

pub use error::{BlockedReason, ProviderError};
pub use factory::{create_provider, PlatformCredentials, ProviderConfig, ProviderRegistry};
pub use instagram::InstagramProvider;
pub use tiktok::TiktokProvider;
pub use types::{
    DiscoveredPost, ListMode, PostMetrics, PostPage, ResolvedSound, SoundAggregates,
};
pub use youtube::YoutubeProvider;

use async_trait::async_trait;
use soundtrace_core::Platform;

/// Platform adapter for resolving sounds and reading their usage.
///
/// Implementations are stateless apart from their HTTP client and may be
/// called concurrently. "Cannot look right now" is reported as
/// [`ProviderError::Blocked`], never as an empty result.
#[async_trait]
pub trait SoundProvider: Send + Sync {
    fn platform(&self) -> Platform;

    /// Extracts the platform-native sound id from a user-submitted URL.
    ///
    /// # Errors
    ///
    /// [`ProviderError::InvalidUrl`] for malformed or foreign URLs, and
    /// [`ProviderError::UnsupportedUrlForm`] for valid URLs that must be
    /// expanded some other way first.
    fn resolve_sound_from_url(&self, url: &str) -> Result<ResolvedSound, ProviderError>;

    /// Reads the total-uses count and display metadata for a sound.
    ///
    /// Data that is not available right now yields
    /// [`SoundAggregates::unavailable`] rather than an error.
    async fn get_sound_aggregates(&self, sound_id: &str) -> Result<SoundAggregates, ProviderError>;

    /// Lists one page of posts using the sound, ranked by `mode`.
    async fn list_sound_posts(
        &self,
        sound_id: &str,
        mode: ListMode,
        cursor: Option<&str>,
    ) -> Result<PostPage, ProviderError>;

    /// Reads engagement counters for one post by its platform-native id.
    async fn get_post_metrics(&self, post_id: &str) -> Result<PostMetrics, ProviderError>;
}
