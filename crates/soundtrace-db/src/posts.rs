//! Database operations for `tracked_posts`.

use chrono::{DateTime, Utc};
use soundtrace_core::{NewTrackedPost, Platform, TrackedPost};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const POST_COLUMNS: &str = "id, workspace_id, sound_id, platform, platform_post_id, post_url, \
                            creator_handle, creator_id, posted_at, first_seen_at, last_seen_at";

/// A row from the `tracked_posts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostRow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub sound_id: Uuid,
    pub platform: String,
    pub platform_post_id: String,
    pub post_url: String,
    pub creator_handle: Option<String>,
    pub creator_id: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl TryFrom<PostRow> for TrackedPost {
    type Error = DbError;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        let platform = row
            .platform
            .parse::<Platform>()
            .map_err(|e| DbError::InvalidRow {
                table: "tracked_posts",
                reason: e.to_string(),
            })?;
        Ok(TrackedPost {
            id: row.id,
            workspace_id: row.workspace_id,
            sound_id: row.sound_id,
            platform,
            platform_post_id: row.platform_post_id,
            post_url: row.post_url,
            creator_handle: row.creator_handle,
            creator_id: row.creator_id,
            posted_at: row.posted_at,
            first_seen_at: row.first_seen_at,
            last_seen_at: row.last_seen_at,
        })
    }
}

/// Fetches a post by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_tracked_post(pool: &PgPool, id: Uuid) -> Result<Option<PostRow>, DbError> {
    let row = sqlx::query_as::<_, PostRow>(&format!(
        "SELECT {POST_COLUMNS} FROM tracked_posts WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Upserts discovered posts keyed on `(workspace_id, platform, platform_post_id)`.
///
/// New posts get `first_seen_at = last_seen_at = seen_at`. Existing posts keep
/// their id and `first_seen_at`, move `last_seen_at` to `seen_at` and take the
/// latest URL; creator fields and `posted_at` are only filled when the new
/// value is present. Runs in one transaction and returns the stored rows in
/// input order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any upsert or the commit fails.
pub async fn upsert_tracked_posts(
    pool: &PgPool,
    workspace_id: Uuid,
    sound_id: Uuid,
    platform: Platform,
    posts: &[NewTrackedPost],
    seen_at: DateTime<Utc>,
) -> Result<Vec<PostRow>, DbError> {
    if posts.is_empty() {
        return Ok(Vec::new());
    }

    let mut tx = pool.begin().await?;
    let mut rows = Vec::with_capacity(posts.len());

    for post in posts {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "INSERT INTO tracked_posts \
                 (id, workspace_id, sound_id, platform, platform_post_id, post_url, \
                  creator_handle, creator_id, posted_at, first_seen_at, last_seen_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10) \
             ON CONFLICT (workspace_id, platform, platform_post_id) DO UPDATE SET \
                 post_url       = EXCLUDED.post_url, \
                 creator_handle = COALESCE(EXCLUDED.creator_handle, tracked_posts.creator_handle), \
                 creator_id     = COALESCE(EXCLUDED.creator_id, tracked_posts.creator_id), \
                 posted_at      = COALESCE(EXCLUDED.posted_at, tracked_posts.posted_at), \
                 last_seen_at   = GREATEST(tracked_posts.last_seen_at, EXCLUDED.last_seen_at) \
             RETURNING {POST_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(workspace_id)
        .bind(sound_id)
        .bind(platform.as_str())
        .bind(&post.platform_post_id)
        .bind(&post.post_url)
        .bind(&post.creator_handle)
        .bind(&post.creator_id)
        .bind(post.posted_at)
        .bind(seen_at)
        .fetch_one(&mut *tx)
        .await?;
        rows.push(row);
    }

    tx.commit().await?;
    Ok(rows)
}
