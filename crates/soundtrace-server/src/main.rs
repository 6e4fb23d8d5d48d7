mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use soundtrace_jobs::{JobRunner, JobStore, PgStore, RunnerConfig};
use soundtrace_providers::{ProviderConfig, ProviderRegistry};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = soundtrace_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = soundtrace_db::PoolConfig::from_app_config(&config);
    let pool = soundtrace_db::connect_pool(&config.database_url, pool_config).await?;
    soundtrace_db::run_migrations(&pool).await?;

    let store: Arc<dyn JobStore> = Arc::new(PgStore::new(pool));
    let providers = ProviderRegistry::from_config(&ProviderConfig::from(&config))?;
    tracing::info!(platforms = ?providers.platforms(), "providers configured");

    let runner = Arc::new(JobRunner::new(
        Arc::clone(&store),
        providers.clone(),
        RunnerConfig::from_app_config(&config),
    ));

    let _scheduler =
        scheduler::build_scheduler(Arc::clone(&runner), Arc::clone(&store), &config).await?;

    let auth = AuthState::from_env(matches!(
        config.env,
        soundtrace_core::Environment::Development
    ))?;
    let state = AppState {
        store,
        providers,
        runner,
    };
    let app = build_app(state, auth, default_rate_limit_state());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "soundtrace-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
