//! Job queue commands: run one pass, enqueue, list.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use clap::Subcommand;
use soundtrace_core::{AppConfig, JobStatus, JobType};
use soundtrace_jobs::{enqueue_sound_job, JobRunner, JobStore, PgStore, QueuePolicy, RunnerConfig};
use soundtrace_providers::{ProviderConfig, ProviderRegistry};
use uuid::Uuid;

/// Sub-commands available under `jobs`.
#[derive(Debug, Subcommand)]
pub enum JobsCommands {
    /// Run one runner pass and print its JSON summary
    Run,
    /// Queue a refresh (or discovery) job for a tracked sound, due now
    Enqueue {
        /// Workspace that owns the sound
        #[arg(long)]
        workspace: Uuid,
        /// Tracked sound id
        #[arg(long)]
        sound: Uuid,
        /// Queue `discover_posts` instead of `refresh_sound`
        #[arg(long)]
        discover: bool,
    },
    /// List recently updated jobs
    List {
        /// Filter by status (queued, running, success, failed)
        #[arg(long)]
        status: Option<String>,
        /// Maximum number of jobs to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub(crate) async fn run(config: &AppConfig, command: JobsCommands) -> anyhow::Result<()> {
    // Validate arguments before touching the database.
    let status = match &command {
        JobsCommands::List {
            status: Some(raw), ..
        } => Some(JobStatus::from_str(raw)?),
        _ => None,
    };

    let pool = crate::connect(config).await?;
    let store: Arc<dyn JobStore> = Arc::new(PgStore::new(pool));

    match command {
        JobsCommands::Run => run_pass(config, store).await,
        JobsCommands::Enqueue {
            workspace,
            sound,
            discover,
        } => {
            let job_type = if discover {
                JobType::DiscoverPosts
            } else {
                JobType::RefreshSound
            };
            enqueue(config, store.as_ref(), workspace, sound, job_type).await
        }
        JobsCommands::List { limit, .. } => list(store.as_ref(), status, limit).await,
    }
}

async fn run_pass(config: &AppConfig, store: Arc<dyn JobStore>) -> anyhow::Result<()> {
    let providers = ProviderRegistry::from_config(&ProviderConfig::from(config))?;
    let runner = JobRunner::new(store, providers, RunnerConfig::from_app_config(config));
    let summary = runner.run_once().await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn enqueue(
    config: &AppConfig,
    store: &dyn JobStore,
    workspace_id: Uuid,
    sound_id: Uuid,
    job_type: JobType,
) -> anyhow::Result<()> {
    let sound = store
        .get_sound(sound_id)
        .await?
        .filter(|s| s.workspace_id == workspace_id)
        .ok_or_else(|| anyhow::anyhow!("sound {sound_id} not found in workspace {workspace_id}"))?;

    let policy = QueuePolicy::from_app_config(config);
    let job_id = enqueue_sound_job(store, &policy, workspace_id, sound.id, job_type, Utc::now()).await?;
    println!("queued {job_type} job {job_id} for sound {}", sound.id);
    Ok(())
}

async fn list(store: &dyn JobStore, status: Option<JobStatus>, limit: usize) -> anyhow::Result<()> {
    let jobs = store.list_jobs(status, limit.max(1)).await?;
    if jobs.is_empty() {
        println!("no jobs found");
        return Ok(());
    }

    println!(
        "{:<36}  {:<20}  {:<8}  {:>8}  {:<25}  last error",
        "id", "type", "status", "attempts", "run at"
    );
    for job in jobs {
        println!(
            "{:<36}  {:<20}  {:<8}  {:>4}/{:<3}  {:<25}  {}",
            job.id,
            job.job_type,
            job.status,
            job.attempts,
            job.max_attempts,
            job.run_at.format("%Y-%m-%d %H:%M:%S UTC"),
            job.last_error.as_deref().unwrap_or("\u{2014}"),
        );
    }
    Ok(())
}
