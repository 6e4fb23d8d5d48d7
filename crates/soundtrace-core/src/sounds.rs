use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

/// Social platform a sound or post lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Tiktok,
    Instagram,
    Youtube,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Tiktok, Platform::Instagram, Platform::Youtube];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::Youtube => "youtube",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tiktok" => Ok(Platform::Tiktok),
            "instagram" => Ok(Platform::Instagram),
            "youtube" => Ok(Platform::Youtube),
            other => Err(CoreError::UnknownPlatform(other.to_string())),
        }
    }
}

/// One audio clip being monitored for a workspace.
///
/// `title`, `artist` and `thumbnail_url` start out null and are backfilled
/// the first time a provider reports them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedSound {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub platform: Platform,
    pub platform_sound_id: String,
    pub source_url: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub thumbnail_url: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for registering a sound after its URL resolved.
#[derive(Debug, Clone)]
pub struct NewTrackedSound {
    pub workspace_id: Uuid,
    pub platform: Platform,
    pub platform_sound_id: String,
    pub source_url: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub thumbnail_url: Option<String>,
    pub created_by: Option<String>,
}

/// One observed post that uses a tracked sound.
///
/// Unique per `(workspace_id, platform, platform_post_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedPost {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub sound_id: Uuid,
    pub platform: Platform,
    pub platform_post_id: String,
    pub post_url: String,
    pub creator_handle: Option<String>,
    pub creator_id: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// A post as reported by discovery, ready to be upserted.
#[derive(Debug, Clone)]
pub struct NewTrackedPost {
    pub platform_post_id: String,
    pub post_url: String,
    pub creator_handle: Option<String>,
    pub creator_id: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

/// Sound-level observation. `total_uses` is `None` when `blocked` is set.
#[derive(Debug, Clone)]
pub struct NewSoundSnapshot {
    pub sound_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub total_uses: Option<i64>,
    pub blocked: bool,
    pub metadata: serde_json::Value,
}

impl NewSoundSnapshot {
    #[must_use]
    pub fn blocked(sound_id: Uuid, captured_at: DateTime<Utc>, reason: &str) -> Self {
        Self {
            sound_id,
            captured_at,
            total_uses: None,
            blocked: true,
            metadata: serde_json::json!({ "blocked": true, "reason": reason }),
        }
    }
}

/// Post-level observation. All counters are `None` when `blocked` is set.
#[derive(Debug, Clone)]
pub struct NewPostSnapshot {
    pub post_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub views: Option<i64>,
    pub likes: Option<i64>,
    pub comments: Option<i64>,
    pub shares: Option<i64>,
    pub blocked: bool,
    pub metadata: serde_json::Value,
}

impl NewPostSnapshot {
    #[must_use]
    pub fn blocked(post_id: Uuid, captured_at: DateTime<Utc>, reason: &str) -> Self {
        Self {
            post_id,
            captured_at,
            views: None,
            likes: None,
            comments: None,
            shares: None,
            blocked: true,
            metadata: serde_json::json!({ "blocked": true, "reason": reason }),
        }
    }
}
