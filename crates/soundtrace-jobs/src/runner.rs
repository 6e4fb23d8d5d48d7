//! The job runner: one stateless pass per invocation.
//!
//! A pass reclaims stale locks, claims a batch of due jobs under a fresh
//! lock owner, runs the handlers with bounded concurrency and writes each
//! job's completion back. Overlapping passes are safe; the store's
//! conditional claim is the only synchronisation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use soundtrace_core::{AppConfig, Job, JobType};
use soundtrace_providers::{ProviderConfig, ProviderRegistry};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::discovery::DiscoveryConfig;
use crate::error::{JobError, RunnerError};
use crate::handlers::{dispatch, HandlerContext, HandlerReport};
use crate::queue::{decide_failure, JobCompletion, QueuePolicy};
use crate::store::JobStore;

pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    pub policy: QueuePolicy,
    pub discovery: DiscoveryConfig,
    /// Handlers running at once within a pass.
    pub max_concurrency: usize,
    /// Upper bound on any single provider call, in-call retries included.
    pub provider_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            policy: QueuePolicy::default(),
            discovery: DiscoveryConfig::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            provider_timeout: ProviderConfig::default().call_budget(),
        }
    }
}

impl RunnerConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            policy: QueuePolicy::from_app_config(config),
            discovery: DiscoveryConfig::from_app_config(config),
            max_concurrency: config.runner_max_concurrency.max(1),
            provider_timeout: ProviderConfig::from(config).call_budget(),
        }
    }
}

/// Per-job entry of a [`RunSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub job_type: JobType,
    pub success: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub will_retry: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
}

/// Result of one pass, returned to the trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub processed: usize,
    pub reclaimed: u64,
    pub results: Vec<JobOutcome>,
}

pub struct JobRunner {
    store: Arc<dyn JobStore>,
    providers: ProviderRegistry,
    config: RunnerConfig,
    clock: Arc<dyn Clock>,
}

impl JobRunner {
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>, providers: ProviderRegistry, config: RunnerConfig) -> Self {
        Self {
            store,
            providers,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the wall clock, e.g. with a scripted one in tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs one pass. Reclaim and claim use the time the pass starts;
    /// snapshots and retry schedules read the clock when they happen.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if reclaiming or claiming fails; no job is
    /// left claimed in that case.
    pub async fn run_once(&self) -> Result<RunSummary, RunnerError> {
        let now = self.clock.now();
        let owner = format!("runner-{}", Uuid::new_v4());
        let policy = &self.config.policy;

        let reclaimed = self
            .store
            .reclaim_stale_jobs(policy.stale_before(now))
            .await
            .map_err(RunnerError::Reclaim)?;
        if reclaimed > 0 {
            tracing::warn!(reclaimed, "reclaimed stale job locks");
        }

        let jobs = self
            .store
            .claim_due_jobs(&owner, now, policy.batch_size)
            .await
            .map_err(RunnerError::Claim)?;

        // `buffered` keeps results in claim order while running concurrently.
        let pending: Vec<_> = jobs.iter().map(|job| self.process(job, &owner)).collect();
        let results: Vec<JobOutcome> = stream::iter(pending)
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        tracing::info!(
            %owner,
            reclaimed,
            claimed = jobs.len(),
            succeeded = results.iter().filter(|r| r.success).count(),
            "runner pass complete"
        );

        Ok(RunSummary {
            processed: results.len(),
            reclaimed,
            results,
        })
    }

    async fn process(&self, job: &Job, owner: &str) -> JobOutcome {
        let ctx = HandlerContext {
            store: self.store.as_ref(),
            providers: &self.providers,
            config: &self.config,
            clock: self.clock.as_ref(),
            workspace_id: job.workspace_id,
        };

        let result = match job.decode_payload() {
            Ok(payload) => dispatch(&ctx, &payload).await,
            Err(reason) => Err(JobError::InvalidPayload(reason)),
        };

        match result {
            Ok(report) => self.finish_success(job, owner, report).await,
            Err(err) => self.finish_failure(job, owner, &err, self.clock.now()).await,
        }
    }

    async fn finish_success(&self, job: &Job, owner: &str, report: HandlerReport) -> JobOutcome {
        let mut outcome = JobOutcome {
            job_id: job.id,
            job_type: job.job_type,
            success: true,
            blocked: report.blocked,
            error: None,
            will_retry: None,
            next_run_at: None,
        };

        if let Err(e) = self.store.complete_job(job.id, owner).await {
            tracing::error!(job_id = %job.id, error = %e, "failed to mark job as succeeded");
            outcome.success = false;
            outcome.error = Some(e.to_string());
            return outcome;
        }

        tracing::info!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempts = job.attempts,
            blocked = report.blocked,
            detail = %report.detail,
            "job succeeded"
        );
        outcome
    }

    async fn finish_failure(
        &self,
        job: &Job,
        owner: &str,
        err: &JobError,
        failed_at: DateTime<Utc>,
    ) -> JobOutcome {
        let completion = decide_failure(&self.config.policy, job, err, failed_at);
        let mut outcome = JobOutcome {
            job_id: job.id,
            job_type: job.job_type,
            success: false,
            blocked: false,
            error: Some(err.to_string()),
            will_retry: None,
            next_run_at: None,
        };

        let write = match &completion {
            JobCompletion::Retry {
                attempts,
                run_at,
                error,
            } => {
                tracing::warn!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    attempts,
                    kind = err.kind().as_str(),
                    next_run_at = %run_at,
                    error = %error,
                    "job failed, will retry"
                );
                outcome.will_retry = Some(true);
                outcome.next_run_at = Some(*run_at);
                self.store
                    .requeue_job(job.id, owner, *attempts, *run_at, error)
                    .await
            }
            JobCompletion::Failed { attempts, error } => {
                tracing::error!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    attempts,
                    kind = err.kind().as_str(),
                    error = %error,
                    "job failed permanently"
                );
                outcome.will_retry = Some(false);
                self.store.fail_job(job.id, owner, *attempts, error).await
            }
            JobCompletion::Succeeded => Ok(()),
        };

        if let Err(e) = write {
            tracing::error!(job_id = %job.id, error = %e, "failed to record job failure");
            outcome.will_retry = None;
            outcome.next_run_at = None;
            outcome.error = Some(format!("{err}; additionally failed to record outcome: {e}"));
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_camel_case_and_skips_empty_fields() {
        let outcome = JobOutcome {
            job_id: Uuid::nil(),
            job_type: JobType::DiscoverPosts,
            success: true,
            blocked: false,
            error: None,
            will_retry: None,
            next_run_at: None,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "jobId": "00000000-0000-0000-0000-000000000000",
                "jobType": "discover_posts",
                "success": true
            })
        );
    }

    #[test]
    fn retry_outcome_carries_next_run_at() {
        let at = Utc::now();
        let outcome = JobOutcome {
            job_id: Uuid::nil(),
            job_type: JobType::RefreshSound,
            success: false,
            blocked: false,
            error: Some("boom".to_string()),
            will_retry: Some(true),
            next_run_at: Some(at),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["willRetry"], true);
        assert_eq!(json["error"], "boom");
        assert!(json.get("nextRunAt").is_some());
    }
}
