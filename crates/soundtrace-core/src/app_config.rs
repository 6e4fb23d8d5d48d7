use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub runner_batch_size: u32,
    pub runner_stale_lock_secs: u64,
    pub runner_max_concurrency: usize,
    pub runner_cron: String,
    pub refresh_cron: String,
    pub job_max_attempts: i32,
    pub job_backoff_cap_minutes: u64,
    pub discovery_top_n: usize,
    pub discovery_max_pages: u32,
    pub provider_timeout_secs: u64,
    pub provider_user_agent: String,
    pub provider_max_retries: u32,
    pub provider_retry_backoff_base_ms: u64,
    pub tiktok_api_key: Option<String>,
    pub tiktok_api_base_url: Option<String>,
    pub instagram_api_key: Option<String>,
    pub instagram_api_base_url: Option<String>,
    pub youtube_api_key: Option<String>,
    pub youtube_api_base_url: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("runner_batch_size", &self.runner_batch_size)
            .field("runner_stale_lock_secs", &self.runner_stale_lock_secs)
            .field("runner_max_concurrency", &self.runner_max_concurrency)
            .field("runner_cron", &self.runner_cron)
            .field("refresh_cron", &self.refresh_cron)
            .field("job_max_attempts", &self.job_max_attempts)
            .field("job_backoff_cap_minutes", &self.job_backoff_cap_minutes)
            .field("discovery_top_n", &self.discovery_top_n)
            .field("discovery_max_pages", &self.discovery_max_pages)
            .field("provider_timeout_secs", &self.provider_timeout_secs)
            .field("provider_user_agent", &self.provider_user_agent)
            .field("provider_max_retries", &self.provider_max_retries)
            .field(
                "provider_retry_backoff_base_ms",
                &self.provider_retry_backoff_base_ms,
            )
            .field(
                "tiktok_api_key",
                &self.tiktok_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("tiktok_api_base_url", &self.tiktok_api_base_url)
            .field(
                "instagram_api_key",
                &self.instagram_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("instagram_api_base_url", &self.instagram_api_base_url)
            .field(
                "youtube_api_key",
                &self.youtube_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("youtube_api_base_url", &self.youtube_api_base_url)
            .finish()
    }
}
