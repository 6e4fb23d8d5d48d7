use async_trait::async_trait;
use chrono::{DateTime, Utc};
use soundtrace_core::{
    Job, JobStatus, NewJob, NewPostSnapshot, NewSoundSnapshot, NewTrackedPost, NewTrackedSound,
    Platform, TrackedPost, TrackedSound,
};
use sqlx::PgPool;
use uuid::Uuid;

use super::JobStore;
use crate::error::StoreError;

/// [`JobStore`] over the Postgres schema in `migrations/`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_i64(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = soundtrace_db::DbError>,
{
    rows.into_iter()
        .map(|row| T::try_from(row).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl JobStore for PgStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        soundtrace_db::health_check(&self.pool).await?;
        Ok(())
    }

    async fn get_sound(&self, id: Uuid) -> Result<Option<TrackedSound>, StoreError> {
        soundtrace_db::get_tracked_sound(&self.pool, id)
            .await?
            .map(TrackedSound::try_from)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn insert_sound(&self, sound: &NewTrackedSound) -> Result<TrackedSound, StoreError> {
        let row = soundtrace_db::insert_tracked_sound(&self.pool, sound).await?;
        Ok(TrackedSound::try_from(row)?)
    }

    async fn backfill_sound_metadata(
        &self,
        id: Uuid,
        title: Option<&str>,
        artist: Option<&str>,
        thumbnail_url: Option<&str>,
    ) -> Result<bool, StoreError> {
        Ok(soundtrace_db::backfill_sound_metadata(&self.pool, id, title, artist, thumbnail_url).await?)
    }

    async fn list_sounds_due_for_refresh(&self) -> Result<Vec<TrackedSound>, StoreError> {
        convert_all(soundtrace_db::list_sounds_due_for_refresh(&self.pool).await?)
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<TrackedPost>, StoreError> {
        soundtrace_db::get_tracked_post(&self.pool, id)
            .await?
            .map(TrackedPost::try_from)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn upsert_posts(
        &self,
        workspace_id: Uuid,
        sound_id: Uuid,
        platform: Platform,
        posts: &[NewTrackedPost],
        seen_at: DateTime<Utc>,
    ) -> Result<Vec<TrackedPost>, StoreError> {
        let rows = soundtrace_db::upsert_tracked_posts(
            &self.pool,
            workspace_id,
            sound_id,
            platform,
            posts,
            seen_at,
        )
        .await?;
        convert_all(rows)
    }

    async fn insert_sound_snapshot(&self, snapshot: &NewSoundSnapshot) -> Result<(), StoreError> {
        soundtrace_db::insert_sound_snapshot(&self.pool, snapshot).await?;
        Ok(())
    }

    async fn insert_post_snapshot(&self, snapshot: &NewPostSnapshot) -> Result<(), StoreError> {
        soundtrace_db::insert_post_snapshot(&self.pool, snapshot).await?;
        Ok(())
    }

    async fn enqueue_jobs(&self, jobs: &[NewJob]) -> Result<Vec<Uuid>, StoreError> {
        Ok(soundtrace_db::enqueue_jobs(&self.pool, jobs).await?)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        soundtrace_db::get_job(&self.pool, id)
            .await?
            .map(Job::try_from)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError> {
        convert_all(soundtrace_db::list_jobs(&self.pool, status, to_i64(limit)).await?)
    }

    async fn reclaim_stale_jobs(&self, stale_before: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(soundtrace_db::reclaim_stale_jobs(&self.pool, stale_before).await?)
    }

    async fn claim_due_jobs(
        &self,
        owner: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError> {
        convert_all(soundtrace_db::claim_due_jobs(&self.pool, owner, now, to_i64(limit)).await?)
    }

    async fn complete_job(&self, id: Uuid, owner: &str) -> Result<(), StoreError> {
        Ok(soundtrace_db::complete_job(&self.pool, id, owner).await?)
    }

    async fn requeue_job(
        &self,
        id: Uuid,
        owner: &str,
        attempts: i32,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        Ok(soundtrace_db::requeue_job(&self.pool, id, owner, attempts, run_at, error).await?)
    }

    async fn fail_job(
        &self,
        id: Uuid,
        owner: &str,
        attempts: i32,
        error: &str,
    ) -> Result<(), StoreError> {
        Ok(soundtrace_db::fail_job(&self.pool, id, owner, attempts, error).await?)
    }
}
