use std::net::SocketAddr;
use std::path::PathBuf;

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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub log_format: LogFormat,
    pub content_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub pipeline_interval_secs: u64,
    pub batch_size: i64,
    /// Retriable failures a post may accumulate in one stage before the
    /// pipeline stops retrying it.
    pub max_stage_attempts: i32,
    pub auto_publish: bool,
    pub media_dir: PathBuf,
    pub fallback_image_path: Option<PathBuf>,
    pub media_public_base_url: Option<String>,
    pub server_bin: Option<PathBuf>,
    pub reddit_client_id: Option<String>,
    pub reddit_client_secret: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub unsplash_access_key: Option<String>,
    pub pexels_api_key: Option<String>,
    pub pixabay_api_key: Option<String>,
    pub instagram_access_token: Option<String>,
    pub instagram_user_id: Option<String>,
    pub tiktok_access_token: Option<String>,
}

impl AppConfig {
    /// Reddit OAuth credentials, when both halves are configured.
    #[must_use]
    pub fn reddit_credentials(&self) -> Option<(&str, &str)> {
        match (&self.reddit_client_id, &self.reddit_client_secret) {
            (Some(id), Some(secret)) => Some((id.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

fn redact<T>(value: Option<&T>) -> Option<&'static str> {
    value.map(|_| "[redacted]")
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("content_path", &self.content_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_base_ms", &self.retry_backoff_base_ms)
            .field("pipeline_interval_secs", &self.pipeline_interval_secs)
            .field("batch_size", &self.batch_size)
            .field("max_stage_attempts", &self.max_stage_attempts)
            .field("auto_publish", &self.auto_publish)
            .field("media_dir", &self.media_dir)
            .field("fallback_image_path", &self.fallback_image_path)
            .field("media_public_base_url", &self.media_public_base_url)
            .field("server_bin", &self.server_bin)
            .field("reddit_client_id", &redact(self.reddit_client_id.as_ref()))
            .field(
                "reddit_client_secret",
                &redact(self.reddit_client_secret.as_ref()),
            )
            .field(
                "anthropic_api_key",
                &redact(self.anthropic_api_key.as_ref()),
            )
            .field("anthropic_model", &self.anthropic_model)
            .field(
                "unsplash_access_key",
                &redact(self.unsplash_access_key.as_ref()),
            )
            .field("pexels_api_key", &redact(self.pexels_api_key.as_ref()))
            .field("pixabay_api_key", &redact(self.pixabay_api_key.as_ref()))
            .field(
                "instagram_access_token",
                &redact(self.instagram_access_token.as_ref()),
            )
            .field("instagram_user_id", &self.instagram_user_id)
            .field(
                "tiktok_access_token",
                &redact(self.tiktok_access_token.as_ref()),
            )
            .finish()
    }
}
