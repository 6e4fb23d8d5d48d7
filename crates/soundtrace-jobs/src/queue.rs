//! Queue policy: batch size, stale-lock timeout and retry back-off.
//!
//! Failed jobs go back to `queued` with `run_at = now + 2^attempts` minutes
//! (attempts counted after the failure) until `attempts` reaches the job's
//! `max_attempts`, at which point they become terminally `failed`.

use chrono::{DateTime, TimeDelta, Utc};
use soundtrace_core::{AppConfig, Job};

use crate::error::{JobError, JobErrorKind};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_STALE_LOCK_SECS: i64 = 300;
pub const DEFAULT_MAX_ATTEMPTS: i32 = 6;
pub const DEFAULT_BACKOFF_CAP_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    pub batch_size: usize,
    pub stale_lock_timeout: TimeDelta,
    /// Stamped on newly enqueued jobs.
    pub max_attempts: i32,
    /// Ceiling for the exponential back-off. `None` leaves it unbounded.
    pub backoff_cap: Option<TimeDelta>,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            stale_lock_timeout: TimeDelta::seconds(DEFAULT_STALE_LOCK_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_cap: Some(TimeDelta::minutes(DEFAULT_BACKOFF_CAP_MINUTES)),
        }
    }
}

impl QueuePolicy {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        let secs = i64::try_from(config.runner_stale_lock_secs).unwrap_or(i64::MAX / 1_000);
        let cap = i64::try_from(config.job_backoff_cap_minutes).unwrap_or(i64::MAX / 60_000);
        Self {
            batch_size: usize::try_from(config.runner_batch_size).unwrap_or(DEFAULT_BATCH_SIZE),
            stale_lock_timeout: TimeDelta::try_seconds(secs)
                .unwrap_or(TimeDelta::seconds(DEFAULT_STALE_LOCK_SECS)),
            max_attempts: config.job_max_attempts,
            backoff_cap: TimeDelta::try_minutes(cap),
        }
    }

    /// Delay before the next attempt once a job has failed `attempts` times:
    /// `2^attempts` minutes, clamped to [`Self::backoff_cap`].
    #[must_use]
    pub fn backoff_delay(&self, attempts: i32) -> TimeDelta {
        let exponent = u32::try_from(attempts.max(0)).unwrap_or(0);
        let minutes = 1i64.checked_shl(exponent).filter(|m| *m > 0).unwrap_or(i64::MAX);
        let delay = TimeDelta::try_minutes(minutes).unwrap_or(TimeDelta::MAX);
        match self.backoff_cap {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Locks taken before this instant are considered abandoned.
    #[must_use]
    pub fn stale_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.stale_lock_timeout
    }
}

/// What to write back for a claimed job once its handler finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobCompletion {
    Succeeded,
    Retry {
        attempts: i32,
        run_at: DateTime<Utc>,
        error: String,
    },
    Failed {
        attempts: i32,
        error: String,
    },
}

/// Applies the retry policy to a handler failure observed at `now`.
///
/// Invalid input skips the remaining attempts and fails immediately.
#[must_use]
pub fn decide_failure(
    policy: &QueuePolicy,
    job: &Job,
    error: &JobError,
    now: DateTime<Utc>,
) -> JobCompletion {
    let attempts = job.attempts.saturating_add(1);
    let message = error.to_string();

    if error.kind() == JobErrorKind::InvalidInput || attempts >= job.max_attempts {
        return JobCompletion::Failed {
            attempts,
            error: message,
        };
    }

    let run_at = now
        .checked_add_signed(policy.backoff_delay(attempts))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    JobCompletion::Retry {
        attempts,
        run_at,
        error: message,
    }
}
