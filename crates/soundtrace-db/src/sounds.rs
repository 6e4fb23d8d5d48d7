//! Database operations for `tracked_sounds`.

use chrono::{DateTime, Utc};
use soundtrace_core::{NewTrackedSound, Platform, TrackedSound};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const SOUND_COLUMNS: &str = "id, workspace_id, platform, platform_sound_id, source_url, \
                             title, artist, thumbnail_url, created_by, created_at";

/// A row from the `tracked_sounds` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SoundRow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub platform: String,
    pub platform_sound_id: String,
    pub source_url: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub thumbnail_url: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<SoundRow> for TrackedSound {
    type Error = DbError;

    fn try_from(row: SoundRow) -> Result<Self, Self::Error> {
        let platform = row
            .platform
            .parse::<Platform>()
            .map_err(|e| DbError::InvalidRow {
                table: "tracked_sounds",
                reason: e.to_string(),
            })?;
        Ok(TrackedSound {
            id: row.id,
            workspace_id: row.workspace_id,
            platform,
            platform_sound_id: row.platform_sound_id,
            source_url: row.source_url,
            title: row.title,
            artist: row.artist,
            thumbnail_url: row.thumbnail_url,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

/// Registers a sound for a workspace.
///
/// Idempotent on `(workspace_id, platform, platform_sound_id)`: re-submitting
/// the same sound returns the existing row, refreshing `source_url` and
/// filling any metadata that was still null.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn insert_tracked_sound(
    pool: &PgPool,
    sound: &NewTrackedSound,
) -> Result<SoundRow, DbError> {
    let row = sqlx::query_as::<_, SoundRow>(&format!(
        "INSERT INTO tracked_sounds \
             (id, workspace_id, platform, platform_sound_id, source_url, \
              title, artist, thumbnail_url, created_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (workspace_id, platform, platform_sound_id) DO UPDATE SET \
             source_url    = EXCLUDED.source_url, \
             title         = COALESCE(tracked_sounds.title, EXCLUDED.title), \
             artist        = COALESCE(tracked_sounds.artist, EXCLUDED.artist), \
             thumbnail_url = COALESCE(tracked_sounds.thumbnail_url, EXCLUDED.thumbnail_url), \
             updated_at    = NOW() \
         RETURNING {SOUND_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(sound.workspace_id)
    .bind(sound.platform.as_str())
    .bind(&sound.platform_sound_id)
    .bind(&sound.source_url)
    .bind(&sound.title)
    .bind(&sound.artist)
    .bind(&sound.thumbnail_url)
    .bind(&sound.created_by)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetches a sound by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_tracked_sound(pool: &PgPool, id: Uuid) -> Result<Option<SoundRow>, DbError> {
    let row = sqlx::query_as::<_, SoundRow>(&format!(
        "SELECT {SOUND_COLUMNS} FROM tracked_sounds WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Fills `title`, `artist` and `thumbnail_url` where they are currently null.
///
/// Existing values are never overwritten. Returns `true` if any column changed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn backfill_sound_metadata(
    pool: &PgPool,
    id: Uuid,
    title: Option<&str>,
    artist: Option<&str>,
    thumbnail_url: Option<&str>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE tracked_sounds SET \
             title         = COALESCE(title, $2), \
             artist        = COALESCE(artist, $3), \
             thumbnail_url = COALESCE(thumbnail_url, $4), \
             updated_at    = NOW() \
         WHERE id = $1 \
           AND ((title IS NULL AND $2::text IS NOT NULL) \
             OR (artist IS NULL AND $3::text IS NOT NULL) \
             OR (thumbnail_url IS NULL AND $4::text IS NOT NULL))",
    )
    .bind(id)
    .bind(title)
    .bind(artist)
    .bind(thumbnail_url)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Returns every sound without an open (`queued` or `running`)
/// `refresh_sound` job, oldest first.
///
/// Used by the periodic re-scrape so overlapping ticks do not pile up
/// duplicate refreshes.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sounds_due_for_refresh(pool: &PgPool) -> Result<Vec<SoundRow>, DbError> {
    let rows = sqlx::query_as::<_, SoundRow>(&format!(
        "SELECT {SOUND_COLUMNS} FROM tracked_sounds s \
         WHERE NOT EXISTS ( \
             SELECT 1 FROM jobs j \
             WHERE j.job_type = 'refresh_sound' \
               AND j.status IN ('queued', 'running') \
               AND j.payload ->> 'sound_id' = s.id::text \
         ) \
         ORDER BY s.created_at ASC, s.id ASC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
