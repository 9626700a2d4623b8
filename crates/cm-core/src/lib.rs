//! Shared domain types and configuration for the content pipeline.

pub mod app_config;
pub mod config;
pub mod content;
pub mod lifecycle;
pub mod retry;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, LogFormat};
pub use config::{load_app_config, load_app_config_from_env};
pub use content::{
    load_content_config, parse_content_config, CaptionLimits, ContentConfig, SubredditConfig,
    TimeFilter,
};
pub use lifecycle::{Platform, PostStatus, Stage, StageContract};
pub use retry::{retry_with_backoff, Retriable, RetryPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read content config at {path}: {source}")]
    ContentFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse content config: {0}")]
    ContentFileParse(#[from] serde_yaml::Error),

    #[error("content config validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown post status: {0}")]
    UnknownStatus(String),

    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("unknown stage: {0}")]
    UnknownStage(String),
}
