//! TikTok Content Posting API: photo posts pulled from a public URL.

use std::time::Duration;

use cm_core::{retry_with_backoff, AppConfig, Platform, RetryPolicy};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::PublishError;
use crate::types::{PublishReceipt, PublishRequest};

const API_BASE_URL: &str = "https://open.tiktokapis.com";
const PRIVACY_LEVEL: &str = "PUBLIC_TO_EVERYONE";
const MAX_TITLE_CHARS: usize = 90;

#[derive(Serialize)]
struct PhotoPostRequest<'a> {
    post_info: PostInfo<'a>,
    source_info: SourceInfo<'a>,
    post_mode: &'a str,
    media_type: &'a str,
}

#[derive(Serialize)]
struct PostInfo<'a> {
    title: String,
    description: &'a str,
    privacy_level: &'a str,
    disable_comment: bool,
    auto_add_music: bool,
}

#[derive(Serialize)]
struct SourceInfo<'a> {
    source: &'a str,
    photo_cover_index: u32,
    photo_images: [&'a str; 1],
}

#[derive(Deserialize)]
struct ApiResponse {
    data: Option<PublishData>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct PublishData {
    publish_id: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    message: String,
}

pub struct TikTokClient {
    client: Client,
    base_url: String,
    access_token: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for TikTokClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TikTokClient")
            .field("base_url", &self.base_url)
            .field("access_token", &"[redacted]")
            .finish_non_exhaustive()
    }
}

impl TikTokClient {
    /// # Errors
    ///
    /// Returns [`PublishError::Http`] if the HTTP client cannot be built.
    pub fn new(
        access_token: &str,
        timeout_secs: u64,
        user_agent: &str,
        retry: RetryPolicy,
    ) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: API_BASE_URL.to_string(),
            access_token: access_token.to_string(),
            retry,
        })
    }

    /// `Ok(None)` unless `TIKTOK_ACCESS_TOKEN` is set.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Http`] if the HTTP client cannot be built.
    pub fn from_app_config(config: &AppConfig) -> Result<Option<Self>, PublishError> {
        let Some(token) = config.tiktok_access_token.as_deref() else {
            return Ok(None);
        };
        Self::new(
            token,
            config.http_timeout_secs,
            &config.user_agent,
            RetryPolicy::from_app_config(config),
        )
        .map(Some)
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Starts a direct photo post. TikTok processes it asynchronously; the
    /// receipt carries the `publish_id`.
    ///
    /// # Errors
    ///
    /// Returns the last [`PublishError`] once retries are exhausted.
    pub async fn publish(&self, request: &PublishRequest) -> Result<PublishReceipt, PublishError> {
        let publish_id =
            retry_with_backoff(self.retry, "tiktok", || self.init_photo_post(request)).await?;
        Ok(PublishReceipt {
            platform_post_id: publish_id,
            url: None,
        })
    }

    async fn init_photo_post(&self, request: &PublishRequest) -> Result<String, PublishError> {
        let first_line = request.caption.lines().next().unwrap_or_default();
        let body = PhotoPostRequest {
            post_info: PostInfo {
                title: first_line.chars().take(MAX_TITLE_CHARS).collect(),
                description: &request.caption,
                privacy_level: PRIVACY_LEVEL,
                disable_comment: false,
                auto_add_music: true,
            },
            source_info: SourceInfo {
                source: "PULL_FROM_URL",
                photo_cover_index: 0,
                photo_images: [&request.image_url],
            },
            post_mode: "DIRECT_POST",
            media_type: "PHOTO",
        };

        let response = self
            .client
            .post(format!("{}/v2/post/publish/content/init/", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        let parsed = serde_json::from_str::<ApiResponse>(&text);

        let error = parsed
            .as_ref()
            .ok()
            .and_then(|r| r.error.as_ref())
            .filter(|e| e.code != "ok");
        if status == StatusCode::TOO_MANY_REQUESTS
            || error.is_some_and(|e| e.code == "rate_limit_exceeded")
        {
            return Err(PublishError::RateLimited {
                platform: Platform::TikTok,
            });
        }
        if status == StatusCode::UNAUTHORIZED
            || error.is_some_and(|e| e.code.starts_with("access_token") || e.code == "scope_not_authorized")
        {
            return Err(PublishError::Unauthorized {
                platform: Platform::TikTok,
                message: error.map_or_else(|| format!("HTTP {status}"), |e| e.code.clone()),
            });
        }
        if !status.is_success() || error.is_some() {
            let message = error.map_or_else(
                || format!("HTTP {status}"),
                |e| format!("{}: {}", e.code, e.message),
            );
            return Err(PublishError::Api {
                platform: Platform::TikTok,
                status: status.as_u16(),
                message,
            });
        }

        let parsed = parsed.map_err(|e| PublishError::Deserialize {
            context: "TikTok publish init response".to_string(),
            source: e,
        })?;
        parsed
            .data
            .and_then(|d| d.publish_id)
            .ok_or_else(|| PublishError::Api {
                platform: Platform::TikTok,
                status: status.as_u16(),
                message: "response has no publish_id".to_string(),
            })
    }
}
