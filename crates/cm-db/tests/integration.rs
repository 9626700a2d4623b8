//! Offline tests for cm-db pool configuration and row types.
//! These tests do not require a live database connection.

use cm_core::{AppConfig, Environment, LogFormat, PostStatus, Stage};
use cm_db::{DbError, PoolConfig, PostRow};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8501),
        log_level: "info".to_string(),
        log_format: LogFormat::Pretty,
        content_path: PathBuf::from("./config/content.yaml"),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        http_timeout_secs: 30,
        user_agent: "ua".to_string(),
        max_retries: 3,
        retry_backoff_base_ms: 1000,
        pipeline_interval_secs: 3600,
        batch_size: 50,
        max_stage_attempts: 5,
        auto_publish: false,
        media_dir: PathBuf::from("./media"),
        fallback_image_path: None,
        media_public_base_url: None,
        server_bin: None,
        reddit_client_id: None,
        reddit_client_secret: None,
        anthropic_api_key: None,
        anthropic_model: "claude-3-haiku-20240307".to_string(),
        unsplash_access_key: None,
        pexels_api_key: None,
        pixabay_api_key: None,
        instagram_access_token: None,
        instagram_user_id: None,
        tiktok_access_token: None,
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn post_row_parses_stored_enums() {
    use chrono::Utc;
    use uuid::Uuid;

    let row = PostRow {
        id: 1,
        public_id: Uuid::new_v4(),
        source_id: "abc123".to_string(),
        subreddit: "todayilearned".to_string(),
        permalink: "/r/todayilearned/comments/abc123/til/".to_string(),
        source_url: None,
        author: Some("someone".to_string()),
        upvotes: 1500,
        num_comments: 12,
        source_created_at: None,
        title: "TIL something".to_string(),
        raw_text: String::new(),
        processed_caption: None,
        short_caption: None,
        keywords: vec![],
        hashtags: vec![],
        media_path: None,
        media_source: None,
        media_source_url: None,
        status: "failed".to_string(),
        failed_stage: Some("publish".to_string()),
        platform_targets: vec!["instagram".to_string(), "tiktok".to_string()],
        error_message: Some("timeout".to_string()),
        attempt_count: 1,
        version: 3,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    assert_eq!(row.parsed_status().unwrap(), PostStatus::Failed);
    assert_eq!(row.parsed_failed_stage().unwrap(), Some(Stage::Publish));
    assert_eq!(row.platforms().unwrap().len(), 2);
}

#[test]
fn no_precondition_error_names_the_stage() {
    let err = DbError::NoPrecondition(Stage::Scrape);
    assert_eq!(
        err.to_string(),
        "stage scrape has no precondition status to select posts by"
    );
}
