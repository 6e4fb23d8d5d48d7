//! Append-only `sound_snapshots` and `post_snapshots`.
//!
//! Rows are inserted and read, never updated or deleted.

use chrono::{DateTime, Utc};
use soundtrace_core::{NewPostSnapshot, NewSoundSnapshot};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `sound_snapshots` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SoundSnapshotRow {
    pub id: i64,
    pub sound_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub total_uses: Option<i64>,
    pub blocked: bool,
    pub metadata: serde_json::Value,
}

/// A row from the `post_snapshots` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostSnapshotRow {
    pub id: i64,
    pub post_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub views: Option<i64>,
    pub likes: Option<i64>,
    pub comments: Option<i64>,
    pub shares: Option<i64>,
    pub blocked: bool,
    pub metadata: serde_json::Value,
}

/// Appends a sound-level snapshot and returns its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including a dangling
/// `sound_id`).
pub async fn insert_sound_snapshot(
    pool: &PgPool,
    snapshot: &NewSoundSnapshot,
) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO sound_snapshots (sound_id, captured_at, total_uses, blocked, metadata) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING id",
    )
    .bind(snapshot.sound_id)
    .bind(snapshot.captured_at)
    .bind(snapshot.total_uses)
    .bind(snapshot.blocked)
    .bind(&snapshot.metadata)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Appends a post-level snapshot and returns its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including a dangling
/// `post_id`).
pub async fn insert_post_snapshot(
    pool: &PgPool,
    snapshot: &NewPostSnapshot,
) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO post_snapshots \
             (post_id, captured_at, views, likes, comments, shares, blocked, metadata) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING id",
    )
    .bind(snapshot.post_id)
    .bind(snapshot.captured_at)
    .bind(snapshot.views)
    .bind(snapshot.likes)
    .bind(snapshot.comments)
    .bind(snapshot.shares)
    .bind(snapshot.blocked)
    .bind(&snapshot.metadata)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Lists snapshots for a sound, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sound_snapshots(
    pool: &PgPool,
    sound_id: Uuid,
) -> Result<Vec<SoundSnapshotRow>, DbError> {
    let rows = sqlx::query_as::<_, SoundSnapshotRow>(
        "SELECT id, sound_id, captured_at, total_uses, blocked, metadata \
         FROM sound_snapshots \
         WHERE sound_id = $1 \
         ORDER BY captured_at DESC, id DESC",
    )
    .bind(sound_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Lists snapshots for a post, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_post_snapshots(
    pool: &PgPool,
    post_id: Uuid,
) -> Result<Vec<PostSnapshotRow>, DbError> {
    let rows = sqlx::query_as::<_, PostSnapshotRow>(
        "SELECT id, post_id, captured_at, views, likes, comments, shares, blocked, metadata \
         FROM post_snapshots \
         WHERE post_id = $1 \
         ORDER BY captured_at DESC, id DESC",
    )
    .bind(post_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
