//! Sound link commands.

use std::str::FromStr;

use chrono::Utc;
use clap::Subcommand;
use soundtrace_core::{AppConfig, Platform};
use soundtrace_jobs::{track_sound, PgStore, QueuePolicy, TrackSoundRequest};
use soundtrace_providers::{create_provider, ProviderConfig, ProviderRegistry};
use uuid::Uuid;

/// Sub-commands available under `sounds`.
#[derive(Debug, Subcommand)]
pub enum SoundsCommands {
    /// Resolve a sound link to its platform id, optionally tracking it
    Resolve {
        /// Platform the link belongs to (tiktok, instagram, youtube)
        #[arg(long)]
        platform: String,
        /// Sound page URL
        #[arg(long)]
        url: String,
        /// Store the sound and queue its first refresh
        #[arg(long, requires = "workspace")]
        track: bool,
        /// Workspace to track the sound in
        #[arg(long)]
        workspace: Option<Uuid>,
    },
}

pub(crate) async fn run(config: &AppConfig, command: SoundsCommands) -> anyhow::Result<()> {
    match command {
        SoundsCommands::Resolve {
            platform,
            url,
            track,
            workspace,
        } => {
            let platform = Platform::from_str(&platform)?;
            match workspace.filter(|_| track) {
                Some(workspace_id) => track_url(config, platform, url, workspace_id).await,
                None => resolve_only(config, platform, &url),
            }
        }
    }
}

fn resolve_only(config: &AppConfig, platform: Platform, url: &str) -> anyhow::Result<()> {
    let provider = create_provider(platform, &ProviderConfig::from(config))?;
    let resolved = provider.resolve_sound_from_url(url)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "platform": resolved.platform,
            "platformSoundId": resolved.platform_sound_id,
            "canonicalUrl": resolved.canonical_url,
        }))?
    );
    Ok(())
}

async fn track_url(
    config: &AppConfig,
    platform: Platform,
    url: String,
    workspace_id: Uuid,
) -> anyhow::Result<()> {
    let providers = ProviderRegistry::default()
        .with(create_provider(platform, &ProviderConfig::from(config))?);
    let store = PgStore::new(crate::connect(config).await?);

    let tracked = track_sound(
        &store,
        &providers,
        &QueuePolicy::from_app_config(config),
        TrackSoundRequest {
            workspace_id,
            platform,
            url,
            created_by: Some("cli".to_string()),
        },
        Utc::now(),
    )
    .await?;

    println!(
        "tracking {} sound {} as {} (refresh job {})",
        tracked.sound.platform,
        tracked.sound.platform_sound_id,
        tracked.sound.id,
        tracked.refresh_job_id
    );
    Ok(())
}
