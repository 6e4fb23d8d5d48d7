//! Database operations for the `jobs` work queue.
//!
//! Every transition out of `running` is conditional on the caller still
//! holding the lock (`status = 'running' AND lock_owner = $owner`). A zero
//! row count means the job was reclaimed or finished by someone else and is
//! surfaced as [`DbError::InvalidJobTransition`].

use chrono::{DateTime, Utc};
use soundtrace_core::{Job, JobStatus, JobType, NewJob};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const JOB_COLUMNS: &str = "id, workspace_id, job_type, status, run_at, attempts, max_attempts, \
                           lock_owner, locked_at, last_error, payload, created_at, updated_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `jobs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub job_type: String,
    pub status: String,
    pub run_at: DateTime<Utc>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub lock_owner: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = DbError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let invalid = |reason: String| DbError::InvalidRow {
            table: "jobs",
            reason,
        };
        let job_type = row
            .job_type
            .parse::<JobType>()
            .map_err(|e| invalid(e.to_string()))?;
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Job {
            id: row.id,
            workspace_id: row.workspace_id,
            job_type,
            status,
            run_at: row.run_at,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            lock_owner: row.lock_owner,
            locked_at: row.locked_at,
            last_error: row.last_error,
            payload: row.payload,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Enqueue / lookup
// ---------------------------------------------------------------------------

/// Inserts a batch of `queued` jobs in one transaction.
///
/// Either every job is inserted or none is. Returns the ids in input order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert or the commit fails.
pub async fn enqueue_jobs(pool: &PgPool, jobs: &[NewJob]) -> Result<Vec<Uuid>, DbError> {
    if jobs.is_empty() {
        return Ok(Vec::new());
    }

    let mut tx = pool.begin().await?;
    let mut ids = Vec::with_capacity(jobs.len());

    for job in jobs {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO jobs (id, workspace_id, job_type, status, run_at, max_attempts, payload) \
             VALUES ($1, $2, $3, 'queued', $4, $5, $6)",
        )
        .bind(id)
        .bind(job.workspace_id)
        .bind(job.job_type().as_str())
        .bind(job.run_at)
        .bind(job.max_attempts)
        .bind(job.payload.to_json())
        .execute(&mut *tx)
        .await?;
        ids.push(id);
    }

    tx.commit().await?;
    Ok(ids)
}

/// Fetches a job by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_job(pool: &PgPool, id: Uuid) -> Result<Option<JobRow>, DbError> {
    let row = sqlx::query_as::<_, JobRow>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Lists jobs, most recently updated first, optionally filtered by status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_jobs(
    pool: &PgPool,
    status: Option<JobStatus>,
    limit: i64,
) -> Result<Vec<JobRow>, DbError> {
    let rows = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs \
         WHERE ($1::text IS NULL OR status = $1) \
         ORDER BY updated_at DESC, id DESC \
         LIMIT $2"
    ))
    .bind(status.map(JobStatus::as_str))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Runner-side transitions
// ---------------------------------------------------------------------------

/// Resets `running` jobs whose lock was taken before `stale_before` back to
/// `queued`, clearing both lock fields. `attempts` is left untouched.
///
/// Returns the number of reclaimed jobs.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn reclaim_stale_jobs(
    pool: &PgPool,
    stale_before: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE jobs \
         SET status = 'queued', lock_owner = NULL, locked_at = NULL, updated_at = NOW() \
         WHERE status = 'running' AND locked_at < $1",
    )
    .bind(stale_before)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Claims up to `limit` due jobs for `owner`, oldest `run_at` first.
///
/// The candidate select and the update run as one statement, and the update
/// re-checks `status = 'queued'`. A concurrent claimer that picked the same
/// candidates updates zero rows for them, so a job is never handed to two
/// owners. Returned rows are sorted by `run_at`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn claim_due_jobs(
    pool: &PgPool,
    owner: &str,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<JobRow>, DbError> {
    let mut rows = sqlx::query_as::<_, JobRow>(&format!(
        "WITH due AS ( \
             SELECT id FROM jobs \
             WHERE status = 'queued' AND run_at <= $1 \
             ORDER BY run_at ASC, created_at ASC \
             LIMIT $2 \
         ) \
         UPDATE jobs \
         SET status = 'running', lock_owner = $3, locked_at = $1, updated_at = NOW() \
         WHERE id IN (SELECT id FROM due) AND status = 'queued' \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(now)
    .bind(limit)
    .bind(owner)
    .fetch_all(pool)
    .await?;

    rows.sort_by(|a, b| a.run_at.cmp(&b.run_at).then(a.created_at.cmp(&b.created_at)));
    Ok(rows)
}

/// Marks a claimed job `success` and clears its lock.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if `owner` no longer holds the
/// job, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_job(pool: &PgPool, id: Uuid, owner: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE jobs \
         SET status = 'success', lock_owner = NULL, locked_at = NULL, \
             last_error = NULL, updated_at = NOW() \
         WHERE id = $1 AND status = 'running' AND lock_owner = $2",
    )
    .bind(id)
    .bind(owner)
    .execute(pool)
    .await?;

    ensure_transitioned(result.rows_affected(), id, owner)
}

/// Puts a claimed job back to `queued` for a later retry.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if `owner` no longer holds the
/// job, or [`DbError::Sqlx`] if the update fails.
pub async fn requeue_job(
    pool: &PgPool,
    id: Uuid,
    owner: &str,
    attempts: i32,
    run_at: DateTime<Utc>,
    last_error: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE jobs \
         SET status = 'queued', lock_owner = NULL, locked_at = NULL, \
             attempts = $3, run_at = $4, last_error = $5, updated_at = NOW() \
         WHERE id = $1 AND status = 'running' AND lock_owner = $2",
    )
    .bind(id)
    .bind(owner)
    .bind(attempts)
    .bind(run_at)
    .bind(last_error)
    .execute(pool)
    .await?;

    ensure_transitioned(result.rows_affected(), id, owner)
}

/// Marks a claimed job terminally `failed`.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if `owner` no longer holds the
/// job, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_job(
    pool: &PgPool,
    id: Uuid,
    owner: &str,
    attempts: i32,
    last_error: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE jobs \
         SET status = 'failed', lock_owner = NULL, locked_at = NULL, \
             attempts = $3, last_error = $4, updated_at = NOW() \
         WHERE id = $1 AND status = 'running' AND lock_owner = $2",
    )
    .bind(id)
    .bind(owner)
    .bind(attempts)
    .bind(last_error)
    .execute(pool)
    .await?;

    ensure_transitioned(result.rows_affected(), id, owner)
}

fn ensure_transitioned(rows_affected: u64, id: Uuid, owner: &str) -> Result<(), DbError> {
    if rows_affected == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "running",
            owner: owner.to_string(),
        });
    }
    Ok(())
}
