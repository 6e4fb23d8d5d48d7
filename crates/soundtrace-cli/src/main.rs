mod jobs;
mod sounds;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::jobs::JobsCommands;
use crate::sounds::SoundsCommands;

#[derive(Debug, Parser)]
#[command(name = "soundtrace-cli")]
#[command(about = "Soundtrace operator command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Inspect and drive the job queue
    Jobs {
        #[command(subcommand)]
        command: JobsCommands,
    },
    /// Resolve and track sound links
    Sounds {
        #[command(subcommand)]
        command: SoundsCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
    /// Check database connectivity
    Ping,
}

/// Connects using the pool settings from `config`.
pub(crate) async fn connect(config: &soundtrace_core::AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool_config = soundtrace_db::PoolConfig::from_app_config(config);
    let pool = soundtrace_db::connect_pool(&config.database_url, pool_config).await?;
    Ok(pool)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("soundtrace-cli ready; run with --help for commands");
        return Ok(());
    };

    let config = soundtrace_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match command {
        Commands::Db { command } => {
            let pool = connect(&config).await?;
            match command {
                DbCommands::Migrate => {
                    soundtrace_db::run_migrations(&pool).await?;
                    println!("migrations applied");
                }
                DbCommands::Ping => {
                    soundtrace_db::health_check(&pool).await?;
                    println!("database ok");
                }
            }
        }
        Commands::Jobs { command } => jobs::run(&config, command).await?,
        Commands::Sounds { command } => sounds::run(&config, command).await?,
    }

    Ok(())
}
