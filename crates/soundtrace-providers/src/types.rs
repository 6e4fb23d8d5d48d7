use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use soundtrace_core::{NewTrackedPost, Platform};

/// A sound URL reduced to its stable platform-native identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSound {
    pub platform: Platform,
    pub platform_sound_id: String,
    pub canonical_url: String,
}

/// Sound-level usage as reported by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundAggregates {
    pub total_uses: i64,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub thumbnail_url: Option<String>,
    /// Free-form bag persisted with the snapshot. Carries `note` when the
    /// count is a placeholder.
    pub metadata: serde_json::Value,
}

impl SoundAggregates {
    /// Placeholder for "cannot measure right now": zero uses, tagged with a
    /// `note` so it is distinguishable from a real zero.
    #[must_use]
    pub fn unavailable(note: &str) -> Self {
        Self {
            total_uses: 0,
            title: None,
            artist: None,
            thumbnail_url: None,
            metadata: serde_json::json!({ "note": note }),
        }
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.metadata.get("note").is_some()
    }
}

/// Caller-chosen ranking for post discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListMode {
    Top,
    Recent,
}

impl ListMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ListMode::Top => "top",
            ListMode::Recent => "recent",
        }
    }
}

/// One post returned by a listing call.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPost {
    pub platform_post_id: String,
    pub post_url: String,
    pub creator_handle: Option<String>,
    pub creator_id: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub views: Option<i64>,
}

impl DiscoveredPost {
    #[must_use]
    pub fn to_new_post(&self) -> NewTrackedPost {
        NewTrackedPost {
            platform_post_id: self.platform_post_id.clone(),
            post_url: self.post_url.clone(),
            creator_handle: self.creator_handle.clone(),
            creator_id: self.creator_id.clone(),
            posted_at: self.posted_at,
        }
    }
}

/// One page of a listing. `next_cursor` is `None` on the last page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostPage {
    pub posts: Vec<DiscoveredPost>,
    pub next_cursor: Option<String>,
}

/// Engagement counters for one post. Counters the platform does not expose
/// are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct PostMetrics {
    pub views: Option<i64>,
    pub likes: Option<i64>,
    pub comments: Option<i64>,
    pub shares: Option<i64>,
    pub metadata: serde_json::Value,
}
