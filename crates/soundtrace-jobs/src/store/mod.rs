//! Persistence port consumed by the engine.
//!
//! [`PgStore`] is the production implementation over `soundtrace-db`;
//! [`MemoryStore`] keeps the same semantics in-process for tests and local
//! runs.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use soundtrace_core::{
    Job, JobStatus, NewJob, NewPostSnapshot, NewSoundSnapshot, NewTrackedPost, NewTrackedSound,
    Platform, TrackedPost, TrackedSound,
};
use uuid::Uuid;

use crate::error::StoreError;

/// Storage operations needed by the runner, its handlers and the
/// onboarding path.
///
/// Every job transition out of `running` must be conditional on
/// `lock_owner = owner` and return [`StoreError::LostLock`] otherwise.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Cheap liveness probe for the backing storage.
    async fn health_check(&self) -> Result<(), StoreError>;

    async fn get_sound(&self, id: Uuid) -> Result<Option<TrackedSound>, StoreError>;

    /// Idempotent on `(workspace_id, platform, platform_sound_id)`.
    async fn insert_sound(&self, sound: &NewTrackedSound) -> Result<TrackedSound, StoreError>;

    /// Fills metadata columns that are still null. Returns `true` on change.
    async fn backfill_sound_metadata(
        &self,
        id: Uuid,
        title: Option<&str>,
        artist: Option<&str>,
        thumbnail_url: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Sounds without an open `refresh_sound` job.
    async fn list_sounds_due_for_refresh(&self) -> Result<Vec<TrackedSound>, StoreError>;

    async fn get_post(&self, id: Uuid) -> Result<Option<TrackedPost>, StoreError>;

    /// Upserts by `(workspace_id, platform, platform_post_id)`, advancing
    /// `last_seen_at` to `seen_at`. Returns stored posts in input order.
    async fn upsert_posts(
        &self,
        workspace_id: Uuid,
        sound_id: Uuid,
        platform: Platform,
        posts: &[NewTrackedPost],
        seen_at: DateTime<Utc>,
    ) -> Result<Vec<TrackedPost>, StoreError>;

    async fn insert_sound_snapshot(&self, snapshot: &NewSoundSnapshot) -> Result<(), StoreError>;

    async fn insert_post_snapshot(&self, snapshot: &NewPostSnapshot) -> Result<(), StoreError>;

    /// Inserts all jobs or none.
    async fn enqueue_jobs(&self, jobs: &[NewJob]) -> Result<Vec<Uuid>, StoreError>;

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError>;

    /// Requeues `running` jobs locked before `stale_before`.
    async fn reclaim_stale_jobs(&self, stale_before: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Atomically moves up to `limit` due `queued` jobs to `running` under
    /// `owner`, oldest `run_at` first.
    async fn claim_due_jobs(
        &self,
        owner: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError>;

    async fn complete_job(&self, id: Uuid, owner: &str) -> Result<(), StoreError>;

    async fn requeue_job(
        &self,
        id: Uuid,
        owner: &str,
        attempts: i32,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError>;

    async fn fail_job(
        &self,
        id: Uuid,
        owner: &str,
        attempts: i32,
        error: &str,
    ) -> Result<(), StoreError>;
}
