use std::time::Duration;

use cm_core::{retry_with_backoff, AppConfig, RetryPolicy, SubredditConfig};
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;

use crate::error::ScraperError;
use crate::types::{Listing, ScrapedPost, TokenResponse};

const OAUTH_BASE_URL: &str = "https://oauth.reddit.com";
const PUBLIC_BASE_URL: &str = "https://www.reddit.com";
const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Reddit application credentials for the client-credentials grant.
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &"[redacted]")
            .field("client_secret", &"[redacted]")
            .finish()
    }
}

/// Reddit listing client.
///
/// With credentials it exchanges them for an application token and reads
/// from `oauth.reddit.com`; without, it reads the public `.json` listings.
/// The token is cached until Reddit answers 401.
pub struct RedditClient {
    client: Client,
    listing_base: String,
    token_url: String,
    credentials: Option<RedditCredentials>,
    token: Mutex<Option<String>>,
    retry: RetryPolicy,
}

impl RedditClient {
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        credentials: Option<RedditCredentials>,
        retry: RetryPolicy,
    ) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        let listing_base = if credentials.is_some() {
            OAUTH_BASE_URL
        } else {
            PUBLIC_BASE_URL
        };
        Ok(Self {
            client,
            listing_base: listing_base.to_string(),
            token_url: TOKEN_URL.to_string(),
            credentials,
            token: Mutex::new(None),
            retry,
        })
    }

    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the HTTP client cannot be built.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ScraperError> {
        let credentials = config
            .reddit_credentials()
            .map(|(id, secret)| RedditCredentials {
                client_id: id.to_string(),
                client_secret: secret.to_string(),
            });
        Self::new(
            config.http_timeout_secs,
            &config.user_agent,
            credentials,
            RetryPolicy::from_app_config(config),
        )
    }

    /// Points the client at other hosts (tests use a local mock server).
    #[must_use]
    pub fn with_base_urls(mut self, listing_base: &str, token_url: &str) -> Self {
        self.listing_base = listing_base.trim_end_matches('/').to_string();
        self.token_url = token_url.to_string();
        self
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    fn listing_url(&self, subreddit: &SubredditConfig) -> String {
        let suffix = if self.credentials.is_some() {
            "top"
        } else {
            "top.json"
        };
        format!("{}/r/{}/{suffix}", self.listing_base, subreddit.name.trim())
    }

    /// Fetches the top listing of a subreddit, unfiltered.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::RateLimited`] / [`ScraperError::Http`] after retries are exhausted.
    /// - [`ScraperError::NotFound`] for a missing or private subreddit.
    /// - [`ScraperError::Unauthorized`] if the credentials are rejected.
    /// - [`ScraperError::Deserialize`] if the listing does not parse.
    pub async fn fetch_top(
        &self,
        subreddit: &SubredditConfig,
    ) -> Result<Vec<ScrapedPost>, ScraperError> {
        let url = self.listing_url(subreddit);
        let limit = subreddit.limit.to_string();
        let time_filter = subreddit.time_filter.as_str();

        let listing = retry_with_backoff(self.retry, "reddit", || {
            let url = url.clone();
            let limit = limit.clone();
            async move {
                let mut request = self.client.get(&url).query(&[
                    ("t", time_filter),
                    ("limit", limit.as_str()),
                    ("raw_json", "1"),
                ]);
                if let Some(credentials) = &self.credentials {
                    let token = self.bearer_token(credentials).await?;
                    request = request.bearer_auth(token);
                }

                let response = request.send().await?;
                let status = response.status();

                if status == StatusCode::TOO_MANY_REQUESTS {
                    let retry_after_secs = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(60);
                    return Err(ScraperError::RateLimited { retry_after_secs });
                }
                if status == StatusCode::UNAUTHORIZED {
                    self.token.lock().await.take();
                    return Err(ScraperError::Unauthorized {
                        reason: "listing request returned 401".to_string(),
                    });
                }
                if status == StatusCode::NOT_FOUND {
                    return Err(ScraperError::NotFound { url });
                }
                if !status.is_success() {
                    return Err(ScraperError::UnexpectedStatus {
                        status: status.as_u16(),
                        url,
                    });
                }

                let body = response.text().await?;
                serde_json::from_str::<Listing>(&body).map_err(|e| ScraperError::Deserialize {
                    context: format!("listing from {url}"),
                    source: e,
                })
            }
        })
        .await?;

        let posts: Vec<ScrapedPost> = listing
            .data
            .children
            .into_iter()
            .map(|child| ScrapedPost::from(child.data))
            .collect();

        tracing::debug!(
            subreddit = %subreddit.name,
            fetched = posts.len(),
            "fetched Reddit listing"
        );

        Ok(posts)
    }

    async fn bearer_token(&self, credentials: &RedditCredentials) -> Result<String, ScraperError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ScraperError::Unauthorized {
                reason: format!("token exchange failed with status {status}"),
            });
        }
        if !status.is_success() {
            return Err(ScraperError::UnexpectedStatus {
                status: status.as_u16(),
                url: self.token_url.clone(),
            });
        }

        let body = response.text().await?;
        let token = serde_json::from_str::<TokenResponse>(&body)
            .map_err(|e| ScraperError::Deserialize {
                context: "Reddit token response".to_string(),
                source: e,
            })?
            .access_token;

        *cached = Some(token.clone());
        Ok(token)
    }
}
