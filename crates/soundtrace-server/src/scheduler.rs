//! Background job scheduler.
//!
//! Registers the recurring runner pass and the periodic sound re-scrape.
//! Overlapping ticks are harmless: the runner's conditional claim keeps two
//! passes from taking the same job.

use std::sync::Arc;

use chrono::Utc;
use soundtrace_core::AppConfig;
use soundtrace_jobs::{enqueue_due_refreshes, JobRunner, JobStore};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    runner: Arc<JobRunner>,
    store: Arc<dyn JobStore>,
    config: &AppConfig,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_runner_job(&scheduler, Arc::clone(&runner), &config.runner_cron).await?;
    register_refresh_job(&scheduler, runner, store, &config.refresh_cron).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Runs one runner pass on every tick of `schedule`.
async fn register_runner_job(
    scheduler: &JobScheduler,
    runner: Arc<JobRunner>,
    schedule: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let runner = Arc::clone(&runner);

        Box::pin(async move {
            match runner.run_once().await {
                Ok(summary) if summary.processed > 0 => {
                    tracing::info!(
                        processed = summary.processed,
                        reclaimed = summary.reclaimed,
                        "scheduler: runner pass complete"
                    );
                }
                Ok(_) => tracing::debug!("scheduler: runner pass found no due jobs"),
                Err(e) => tracing::error!(error = %e, "scheduler: runner pass aborted"),
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(schedule, "scheduler: runner pass registered");
    Ok(())
}

/// Enqueues `refresh_sound` for every sound without an open one.
async fn register_refresh_job(
    scheduler: &JobScheduler,
    runner: Arc<JobRunner>,
    store: Arc<dyn JobStore>,
    schedule: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let runner = Arc::clone(&runner);
        let store = Arc::clone(&store);

        Box::pin(async move {
            let policy = runner.config().policy;
            match enqueue_due_refreshes(store.as_ref(), &policy, Utc::now()).await {
                Ok(n) => tracing::info!(enqueued = n, "scheduler: sound refresh enqueued"),
                Err(e) => tracing::error!(error = %e, "scheduler: sound refresh enqueue failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(schedule, "scheduler: sound refresh registered");
    Ok(())
}
