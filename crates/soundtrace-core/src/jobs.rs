use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    RefreshSound,
    DiscoverPosts,
    RefreshPostMetrics,
}

impl JobType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::RefreshSound => "refresh_sound",
            JobType::DiscoverPosts => "discover_posts",
            JobType::RefreshPostMetrics => "refresh_post_metrics",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "refresh_sound" => Ok(JobType::RefreshSound),
            "discover_posts" => Ok(JobType::DiscoverPosts),
            "refresh_post_metrics" => Ok(JobType::RefreshPostMetrics),
            other => Err(CoreError::UnknownJobType(other.to_string())),
        }
    }
}

/// Lifecycle: `queued -> running -> {success | queued (retry) | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "success" => Ok(JobStatus::Success),
            "failed" => Ok(JobStatus::Failed),
            other => Err(CoreError::UnknownJobStatus(other.to_string())),
        }
    }
}

/// Strongly-typed work description, one variant per job type.
///
/// Persisted as JSON with an internal `type` tag that mirrors the job's
/// `job_type` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    RefreshSound { sound_id: Uuid },
    DiscoverPosts { sound_id: Uuid },
    RefreshPostMetrics { post_id: Uuid },
}

impl JobPayload {
    #[must_use]
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::RefreshSound { .. } => JobType::RefreshSound,
            JobPayload::DiscoverPosts { .. } => JobType::DiscoverPosts,
            JobPayload::RefreshPostMetrics { .. } => JobType::RefreshPostMetrics,
        }
    }

    /// JSON form stored in the `payload` column.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        // Serializing a plain enum of UUIDs cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// A unit of scheduled work as stored in the queue.
///
/// A job is `running` exactly when both `lock_owner` and `locked_at` are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
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

impl Job {
    /// Decode the stored payload into its typed form.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the JSON does not parse or
    /// its tag disagrees with `job_type`.
    pub fn decode_payload(&self) -> Result<JobPayload, String> {
        let payload: JobPayload = serde_json::from_value(self.payload.clone())
            .map_err(|e| format!("invalid {} payload: {e}", self.job_type))?;
        if payload.job_type() != self.job_type {
            return Err(format!(
                "payload type {} does not match job type {}",
                payload.job_type(),
                self.job_type
            ));
        }
        Ok(payload)
    }
}

/// Input for enqueueing a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub workspace_id: Uuid,
    pub payload: JobPayload,
    pub run_at: DateTime<Utc>,
    pub max_attempts: i32,
}

impl NewJob {
    #[must_use]
    pub fn new(
        workspace_id: Uuid,
        payload: JobPayload,
        run_at: DateTime<Utc>,
        max_attempts: i32,
    ) -> Self {
        Self {
            workspace_id,
            payload,
            run_at,
            max_attempts,
        }
    }

    #[must_use]
    pub fn job_type(&self) -> JobType {
        self.payload.job_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with(job_type: JobType, payload: serde_json::Value) -> Job {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            job_type,
            status: JobStatus::Queued,
            run_at: now,
            attempts: 0,
            max_attempts: 5,
            lock_owner: None,
            locked_at: None,
            last_error: None,
            payload,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn payload_json_carries_type_tag() {
        let sound_id = Uuid::new_v4();
        let json = JobPayload::DiscoverPosts { sound_id }.to_json();
        assert_eq!(json["type"], "discover_posts");
        assert_eq!(json["sound_id"], sound_id.to_string());
    }

    #[test]
    fn decode_payload_accepts_matching_type() {
        let post_id = Uuid::new_v4();
        let job = job_with(
            JobType::RefreshPostMetrics,
            JobPayload::RefreshPostMetrics { post_id }.to_json(),
        );
        assert_eq!(
            job.decode_payload().unwrap(),
            JobPayload::RefreshPostMetrics { post_id }
        );
    }

    #[test]
    fn decode_payload_rejects_mismatched_type() {
        let job = job_with(
            JobType::RefreshSound,
            JobPayload::DiscoverPosts {
                sound_id: Uuid::new_v4(),
            }
            .to_json(),
        );
        let err = job.decode_payload().unwrap_err();
        assert!(err.contains("does not match"), "unexpected error: {err}");
    }

    #[test]
    fn decode_payload_rejects_garbage() {
        let job = job_with(JobType::RefreshSound, serde_json::json!({"sound": 1}));
        assert!(job.decode_payload().is_err());
    }

    #[test]
    fn job_status_strings_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Success,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }
}
