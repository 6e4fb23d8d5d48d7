use async_trait::async_trait;
use chrono::{DateTime, Utc};
use soundtrace_core::{
    Job, JobStatus, NewJob, NewPostSnapshot, NewSoundSnapshot, NewTrackedPost, NewTrackedSound,
    Platform, TrackedPost, TrackedSound,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::JobStore;
use crate::error::StoreError;

#[derive(Debug, Default)]
struct State {
    sounds: Vec<TrackedSound>,
    posts: Vec<TrackedPost>,
    sound_snapshots: Vec<NewSoundSnapshot>,
    post_snapshots: Vec<NewPostSnapshot>,
    jobs: Vec<Job>,
}

impl State {
    fn held_job(&mut self, id: Uuid, owner: &str) -> Result<&mut Job, StoreError> {
        self.jobs
            .iter_mut()
            .find(|j| {
                j.id == id && j.status == JobStatus::Running && j.lock_owner.as_deref() == Some(owner)
            })
            .ok_or_else(|| StoreError::LostLock {
                id,
                owner: owner.to_string(),
            })
    }
}

/// In-process [`JobStore`]. All operations run under one lock, so claims
/// are atomic exactly as the conditional update makes them in Postgres.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sounds(&self) -> Vec<TrackedSound> {
        self.state.lock().await.sounds.clone()
    }

    pub async fn posts(&self) -> Vec<TrackedPost> {
        self.state.lock().await.posts.clone()
    }

    pub async fn jobs(&self) -> Vec<Job> {
        self.state.lock().await.jobs.clone()
    }

    pub async fn sound_snapshots(&self) -> Vec<NewSoundSnapshot> {
        self.state.lock().await.sound_snapshots.clone()
    }

    pub async fn post_snapshots(&self) -> Vec<NewPostSnapshot> {
        self.state.lock().await.post_snapshots.clone()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_sound(&self, id: Uuid) -> Result<Option<TrackedSound>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.sounds.iter().find(|s| s.id == id).cloned())
    }

    async fn insert_sound(&self, sound: &NewTrackedSound) -> Result<TrackedSound, StoreError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.sounds.iter_mut().find(|s| {
            s.workspace_id == sound.workspace_id
                && s.platform == sound.platform
                && s.platform_sound_id == sound.platform_sound_id
        }) {
            existing.source_url.clone_from(&sound.source_url);
            existing.title = existing.title.take().or_else(|| sound.title.clone());
            existing.artist = existing.artist.take().or_else(|| sound.artist.clone());
            existing.thumbnail_url = existing
                .thumbnail_url
                .take()
                .or_else(|| sound.thumbnail_url.clone());
            return Ok(existing.clone());
        }

        let stored = TrackedSound {
            id: Uuid::new_v4(),
            workspace_id: sound.workspace_id,
            platform: sound.platform,
            platform_sound_id: sound.platform_sound_id.clone(),
            source_url: sound.source_url.clone(),
            title: sound.title.clone(),
            artist: sound.artist.clone(),
            thumbnail_url: sound.thumbnail_url.clone(),
            created_by: sound.created_by.clone(),
            created_at: Utc::now(),
        };
        state.sounds.push(stored.clone());
        Ok(stored)
    }

    async fn backfill_sound_metadata(
        &self,
        id: Uuid,
        title: Option<&str>,
        artist: Option<&str>,
        thumbnail_url: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let Some(sound) = state.sounds.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        let mut changed = false;
        for (slot, value) in [
            (&mut sound.title, title),
            (&mut sound.artist, artist),
            (&mut sound.thumbnail_url, thumbnail_url),
        ] {
            if slot.is_none() {
                if let Some(v) = value {
                    *slot = Some(v.to_string());
                    changed = true;
                }
            }
        }
        Ok(changed)
    }

    async fn list_sounds_due_for_refresh(&self) -> Result<Vec<TrackedSound>, StoreError> {
        let state = self.state.lock().await;
        let open: Vec<Uuid> = state
            .jobs
            .iter()
            .filter(|j| matches!(j.status, JobStatus::Queued | JobStatus::Running))
            .filter_map(|j| match j.decode_payload() {
                Ok(soundtrace_core::JobPayload::RefreshSound { sound_id }) => Some(sound_id),
                _ => None,
            })
            .collect();
        let mut due: Vec<TrackedSound> = state
            .sounds
            .iter()
            .filter(|s| !open.contains(&s.id))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.created_at);
        Ok(due)
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<TrackedPost>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.posts.iter().find(|p| p.id == id).cloned())
    }

    async fn upsert_posts(
        &self,
        workspace_id: Uuid,
        sound_id: Uuid,
        platform: Platform,
        posts: &[NewTrackedPost],
        seen_at: DateTime<Utc>,
    ) -> Result<Vec<TrackedPost>, StoreError> {
        let mut state = self.state.lock().await;
        if !state.sounds.iter().any(|s| s.id == sound_id) {
            return Err(StoreError::NotFound {
                entity: "sound",
                id: sound_id,
            });
        }

        let mut stored = Vec::with_capacity(posts.len());
        for post in posts {
            let existing = state.posts.iter_mut().find(|p| {
                p.workspace_id == workspace_id
                    && p.platform == platform
                    && p.platform_post_id == post.platform_post_id
            });
            match existing {
                Some(p) => {
                    p.post_url.clone_from(&post.post_url);
                    if post.creator_handle.is_some() {
                        p.creator_handle.clone_from(&post.creator_handle);
                    }
                    if post.creator_id.is_some() {
                        p.creator_id.clone_from(&post.creator_id);
                    }
                    if post.posted_at.is_some() {
                        p.posted_at = post.posted_at;
                    }
                    p.last_seen_at = p.last_seen_at.max(seen_at);
                    stored.push(p.clone());
                }
                None => {
                    let p = TrackedPost {
                        id: Uuid::new_v4(),
                        workspace_id,
                        sound_id,
                        platform,
                        platform_post_id: post.platform_post_id.clone(),
                        post_url: post.post_url.clone(),
                        creator_handle: post.creator_handle.clone(),
                        creator_id: post.creator_id.clone(),
                        posted_at: post.posted_at,
                        first_seen_at: seen_at,
                        last_seen_at: seen_at,
                    };
                    state.posts.push(p.clone());
                    stored.push(p);
                }
            }
        }
        Ok(stored)
    }

    async fn insert_sound_snapshot(&self, snapshot: &NewSoundSnapshot) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.sounds.iter().any(|s| s.id == snapshot.sound_id) {
            return Err(StoreError::NotFound {
                entity: "sound",
                id: snapshot.sound_id,
            });
        }
        state.sound_snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn insert_post_snapshot(&self, snapshot: &NewPostSnapshot) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.posts.iter().any(|p| p.id == snapshot.post_id) {
            return Err(StoreError::NotFound {
                entity: "post",
                id: snapshot.post_id,
            });
        }
        state.post_snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn enqueue_jobs(&self, jobs: &[NewJob]) -> Result<Vec<Uuid>, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut ids = Vec::with_capacity(jobs.len());
        for job in jobs {
            let id = Uuid::new_v4();
            state.jobs.push(Job {
                id,
                workspace_id: job.workspace_id,
                job_type: job.job_type(),
                status: JobStatus::Queued,
                run_at: job.run_at,
                attempts: 0,
                max_attempts: job.max_attempts,
                lock_owner: None,
                locked_at: None,
                last_error: None,
                payload: job.payload.to_json(),
                created_at: now,
                updated_at: now,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let state = self.state.lock().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .iter()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn reclaim_stale_jobs(&self, stale_before: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut reclaimed = 0;
        for job in &mut state.jobs {
            if job.status == JobStatus::Running && job.locked_at.is_some_and(|t| t < stale_before) {
                job.status = JobStatus::Queued;
                job.lock_owner = None;
                job.locked_at = None;
                job.updated_at = now;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn claim_due_jobs(
        &self,
        owner: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let mut state = self.state.lock().await;
        let mut due: Vec<usize> = state
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| j.status == JobStatus::Queued && j.run_at <= now)
            .map(|(i, _)| i)
            .collect();
        due.sort_by(|a, b| {
            let (ja, jb) = (&state.jobs[*a], &state.jobs[*b]);
            ja.run_at.cmp(&jb.run_at).then(ja.created_at.cmp(&jb.created_at))
        });
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for index in due {
            let job = &mut state.jobs[index];
            job.status = JobStatus::Running;
            job.lock_owner = Some(owner.to_string());
            job.locked_at = Some(now);
            job.updated_at = now;
            claimed.push(job.clone());
        }
        Ok(claimed)
    }

    async fn complete_job(&self, id: Uuid, owner: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let job = state.held_job(id, owner)?;
        job.status = JobStatus::Success;
        job.lock_owner = None;
        job.locked_at = None;
        job.last_error = None;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn requeue_job(
        &self,
        id: Uuid,
        owner: &str,
        attempts: i32,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let job = state.held_job(id, owner)?;
        job.status = JobStatus::Queued;
        job.lock_owner = None;
        job.locked_at = None;
        job.attempts = attempts;
        job.run_at = run_at;
        job.last_error = Some(error.to_string());
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn fail_job(
        &self,
        id: Uuid,
        owner: &str,
        attempts: i32,
        error: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let job = state.held_job(id, owner)?;
        job.status = JobStatus::Failed;
        job.lock_owner = None;
        job.locked_at = None;
        job.attempts = attempts;
        job.last_error = Some(error.to_string());
        job.updated_at = Utc::now();
        Ok(())
    }
}
