//! Shared domain types and configuration for soundtrace.

mod app_config;
mod config;
pub mod jobs;
pub mod sounds;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use jobs::{Job, JobPayload, JobStatus, JobType, NewJob};
pub use sounds::{
    NewPostSnapshot, NewSoundSnapshot, NewTrackedPost, NewTrackedSound, Platform, TrackedPost,
    TrackedSound,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    #[error("unknown job status: {0}")]
    UnknownJobStatus(String),
}
