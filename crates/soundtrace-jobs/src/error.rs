use soundtrace_core::JobType;
use soundtrace_db::DbError;
use soundtrace_providers::ProviderError;
use thiserror::Error;
use uuid::Uuid;

/// Errors from a [`crate::JobStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The job was reclaimed or finished by someone else since it was claimed.
    #[error("job {id} is no longer held by {owner}")]
    LostLock { id: Uuid, owner: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("invalid stored data: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Db(#[source] DbError),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::InvalidJobTransition { id, owner, .. } => StoreError::LostLock { id, owner },
            DbError::InvalidRow { table, reason } => {
                StoreError::Corrupt(format!("{table}: {reason}"))
            }
            other => StoreError::Db(other),
        }
    }
}

/// How the queue treats a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobErrorKind {
    /// Malformed payload or URL, missing or rejected credential. Never retried.
    InvalidInput,
    /// Network trouble, unexpected upstream shape, store hiccup. Retried with backoff.
    Transient,
    /// A referenced row is gone. Retried like a transient error but will not heal.
    Integrity,
}

impl JobErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobErrorKind::InvalidInput => "invalid_input",
            JobErrorKind::Transient => "transient",
            JobErrorKind::Integrity => "integrity",
        }
    }
}

/// Failure of a single job handler.
///
/// Blocked provider responses are not errors and never reach this type.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("{entity} {id} no longer exists")]
    MissingEntity { entity: &'static str, id: Uuid },

    /// A post-level job type was asked to target a sound.
    #[error("{job_type} is a post-level job and cannot target a sound")]
    NotSoundLevel { job_type: JobType },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl JobError {
    #[must_use]
    pub fn kind(&self) -> JobErrorKind {
        match self {
            JobError::InvalidPayload(_) | JobError::NotSoundLevel { .. } => {
                JobErrorKind::InvalidInput
            }
            JobError::MissingEntity { .. }
            | JobError::Store(StoreError::NotFound { .. } | StoreError::Corrupt(_)) => {
                JobErrorKind::Integrity
            }
            JobError::Provider(e) if e.is_hard() => JobErrorKind::InvalidInput,
            JobError::Provider(_) | JobError::Store(_) => JobErrorKind::Transient,
        }
    }
}

/// Failure of a whole runner pass. Nothing was claimed when this is returned.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to reclaim stale jobs: {0}")]
    Reclaim(#[source] StoreError),

    #[error("failed to claim due jobs: {0}")]
    Claim(#[source] StoreError),
}
