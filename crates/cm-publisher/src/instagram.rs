//! Instagram Graph API content publishing: create a media container, then
//! publish it.

use std::time::Duration;

use cm_core::{retry_with_backoff, AppConfig, Platform, RetryPolicy};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

use crate::error::PublishError;
use crate::types::{PublishReceipt, PublishRequest};

const GRAPH_BASE_URL: &str = "https://graph.facebook.com/v19.0";
/// Graph API error code for an expired or invalid token.
const INVALID_TOKEN_CODE: i64 = 190;

#[derive(Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Deserialize)]
struct PermalinkResponse {
    permalink: Option<String>,
}

#[derive(Deserialize)]
struct GraphErrorBody {
    error: GraphError,
}

#[derive(Deserialize)]
struct GraphError {
    message: String,
    #[serde(default)]
    code: i64,
}

pub struct InstagramClient {
    client: Client,
    base_url: String,
    user_id: String,
    access_token: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for InstagramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstagramClient")
            .field("base_url", &self.base_url)
            .field("user_id", &self.user_id)
            .field("access_token", &"[redacted]")
            .finish_non_exhaustive()
    }
}

impl InstagramClient {
    /// # Errors
    ///
    /// Returns [`PublishError::Http`] if the HTTP client cannot be built.
    pub fn new(
        user_id: &str,
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
            base_url: GRAPH_BASE_URL.to_string(),
            user_id: user_id.to_string(),
            access_token: access_token.to_string(),
            retry,
        })
    }

    /// `Ok(None)` unless both `INSTAGRAM_USER_ID` and
    /// `INSTAGRAM_ACCESS_TOKEN` are set.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Http`] if the HTTP client cannot be built.
    pub fn from_app_config(config: &AppConfig) -> Result<Option<Self>, PublishError> {
        let (Some(user_id), Some(token)) = (
            config.instagram_user_id.as_deref(),
            config.instagram_access_token.as_deref(),
        ) else {
            return Ok(None);
        };
        Self::new(
            user_id,
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

    /// Publishes a single image post.
    ///
    /// The container step and the publish step are retried separately, so
    /// a transient failure while publishing does not create a second
    /// container.
    ///
    /// # Errors
    ///
    /// Returns the last [`PublishError`] once retries are exhausted.
    pub async fn publish(&self, request: &PublishRequest) -> Result<PublishReceipt, PublishError> {
        let container_id = retry_with_backoff(self.retry, "instagram", || {
            self.create_container(request)
        })
        .await?;

        let media_id = retry_with_backoff(self.retry, "instagram", || {
            self.publish_container(&container_id)
        })
        .await?;

        let url = match self.permalink(&media_id).await {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(media_id = %media_id, error = %e, "permalink lookup failed");
                None
            }
        };

        Ok(PublishReceipt {
            platform_post_id: media_id,
            url,
        })
    }

    async fn create_container(&self, request: &PublishRequest) -> Result<String, PublishError> {
        let response = self
            .client
            .post(format!("{}/{}/media", self.base_url, self.user_id))
            .form(&[
                ("image_url", request.image_url.as_str()),
                ("caption", request.caption.as_str()),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .await?;
        parse_id(response, "Instagram media container").await
    }

    async fn publish_container(&self, container_id: &str) -> Result<String, PublishError> {
        let response = self
            .client
            .post(format!("{}/{}/media_publish", self.base_url, self.user_id))
            .form(&[
                ("creation_id", container_id),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .await?;
        parse_id(response, "Instagram media_publish").await
    }

    async fn permalink(&self, media_id: &str) -> Result<Option<String>, PublishError> {
        let response = self
            .client
            .get(format!("{}/{media_id}", self.base_url))
            .bearer_auth(&self.access_token)
            .query(&[("fields", "permalink")])
            .send()
            .await?;
        let body = check_status(response).await?;
        let parsed: PermalinkResponse =
            serde_json::from_str(&body).map_err(|e| PublishError::Deserialize {
                context: "Instagram permalink".to_string(),
                source: e,
            })?;
        Ok(parsed.permalink)
    }
}

async fn check_status(response: Response) -> Result<String, PublishError> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        return Ok(body);
    }

    let error = serde_json::from_str::<GraphErrorBody>(&body).ok().map(|b| b.error);
    let message = error
        .as_ref()
        .map_or_else(|| format!("HTTP {status}"), |e| e.message.clone());
    let code = error.as_ref().map_or(0, |e| e.code);

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(PublishError::RateLimited {
            platform: Platform::Instagram,
        });
    }
    if status == StatusCode::UNAUTHORIZED || code == INVALID_TOKEN_CODE {
        return Err(PublishError::Unauthorized {
            platform: Platform::Instagram,
            message,
        });
    }
    Err(PublishError::Api {
        platform: Platform::Instagram,
        status: status.as_u16(),
        message,
    })
}

async fn parse_id(response: Response, context: &str) -> Result<String, PublishError> {
    let body = check_status(response).await?;
    serde_json::from_str::<IdResponse>(&body)
        .map(|r| r.id)
        .map_err(|e| PublishError::Deserialize {
            context: context.to_string(),
            source: e,
        })
}
