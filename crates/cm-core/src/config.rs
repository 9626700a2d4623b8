use crate::app_config::{AppConfig, Environment, LogFormat};
use crate::ConfigError;

const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-haiku-20240307";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        let raw = or_default(var, default);
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(invalid(var, format!("expected true/false, got '{other}'"))),
        }
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("CM_ENV", "development"))?;
    let log_format = parse_log_format(&or_default("CM_LOG_FORMAT", "pretty"))?;

    let bind_addr = or_default("CM_BIND_ADDR", "127.0.0.1:8501")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("CM_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("CM_LOG_LEVEL", "info");
    let content_path = PathBuf::from(or_default("CM_CONTENT_PATH", "./config/content.yaml"));

    let db_max_connections = parse_u32("CM_DB_MAX_CONNECTIONS", "5")?;
    let db_min_connections = parse_u32("CM_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("CM_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let http_timeout_secs = parse_u64("CM_HTTP_TIMEOUT_SECS", "30")?;
    let user_agent = or_default("CM_USER_AGENT", "content-machine/0.1");
    let max_retries = parse_u32("CM_MAX_RETRIES", "3")?;
    let retry_backoff_base_ms = parse_u64("CM_RETRY_BACKOFF_BASE_MS", "1000")?;

    let pipeline_interval_secs = parse_u64("CM_PIPELINE_INTERVAL_SECS", "3600")?;
    if pipeline_interval_secs == 0 {
        return Err(invalid(
            "CM_PIPELINE_INTERVAL_SECS",
            "interval must be a positive number of seconds".to_string(),
        ));
    }

    let batch_size = parse_u32("CM_BATCH_SIZE", "50")?;
    if batch_size == 0 {
        return Err(invalid("CM_BATCH_SIZE", "batch size must be at least 1".to_string()));
    }

    let max_stage_attempts = parse_u32("CM_MAX_STAGE_ATTEMPTS", "5")?;
    if max_stage_attempts == 0 {
        return Err(invalid(
            "CM_MAX_STAGE_ATTEMPTS",
            "a stage needs at least one attempt".to_string(),
        ));
    }
    let max_stage_attempts = i32::try_from(max_stage_attempts).map_err(|_| {
        invalid("CM_MAX_STAGE_ATTEMPTS", "value is too large".to_string())
    })?;

    let auto_publish = parse_bool("CM_AUTO_PUBLISH", "false")?;
    let media_dir = PathBuf::from(or_default("CM_MEDIA_DIR", "./media"));
    let fallback_image_path = optional("CM_FALLBACK_IMAGE_PATH").map(PathBuf::from);
    let media_public_base_url =
        optional("CM_MEDIA_PUBLIC_BASE_URL").map(|url| url.trim_end_matches('/').to_string());
    let server_bin = optional("CM_SERVER_BIN").map(PathBuf::from);

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        log_format,
        content_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        http_timeout_secs,
        user_agent,
        max_retries,
        retry_backoff_base_ms,
        pipeline_interval_secs,
        batch_size: i64::from(batch_size),
        max_stage_attempts,
        auto_publish,
        media_dir,
        fallback_image_path,
        media_public_base_url,
        server_bin,
        reddit_client_id: optional("REDDIT_CLIENT_ID"),
        reddit_client_secret: optional("REDDIT_CLIENT_SECRET"),
        anthropic_api_key: optional("ANTHROPIC_API_KEY"),
        anthropic_model: optional("ANTHROPIC_MODEL")
            .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
        unsplash_access_key: optional("UNSPLASH_ACCESS_KEY"),
        pexels_api_key: optional("PEXELS_API_KEY"),
        pixabay_api_key: optional("PIXABAY_API_KEY"),
        instagram_access_token: optional("INSTAGRAM_ACCESS_TOKEN"),
        instagram_user_id: optional("INSTAGRAM_USER_ID"),
        tiktok_access_token: optional("TIKTOK_ACCESS_TOKEN"),
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for unrecognized values.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "CM_ENV".to_string(),
            reason: format!("expected development, test or production, got '{other}'"),
        }),
    }
}

fn parse_log_format(s: &str) -> Result<LogFormat, ConfigError> {
    match s {
        "pretty" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        other => Err(ConfigError::InvalidEnvVar {
            var: "CM_LOG_FORMAT".to_string(),
            reason: format!("expected pretty or json, got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
