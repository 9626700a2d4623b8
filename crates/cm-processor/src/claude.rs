//! Anthropic Messages API client used to write captions.

use std::time::Duration;

use cm_core::{retry_with_backoff, AppConfig, RetryPolicy};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::ProcessorError;
use crate::types::{GeneratedCaptions, ProcessorInput};

const API_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;
const PROMPT_BODY_CHARS: usize = 2000;

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct ClaudeClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ClaudeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ClaudeClient {
    /// # Errors
    ///
    /// Returns [`ProcessorError::Http`] if the HTTP client cannot be built.
    pub fn new(
        api_key: &str,
        model: &str,
        timeout_secs: u64,
        user_agent: &str,
        retry: RetryPolicy,
    ) -> Result<Self, ProcessorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: API_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            retry,
        })
    }

    /// `Ok(None)` when no API key is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::Http`] if the HTTP client cannot be built.
    pub fn from_app_config(config: &AppConfig) -> Result<Option<Self>, ProcessorError> {
        let Some(api_key) = config.anthropic_api_key.as_deref() else {
            return Ok(None);
        };
        Self::new(
            api_key,
            &config.anthropic_model,
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

    /// Asks the model for both captions and a hashtag list.
    ///
    /// # Errors
    ///
    /// - [`ProcessorError::RateLimited`] / [`ProcessorError::Api`] /
    ///   [`ProcessorError::Http`] once retries are exhausted.
    /// - [`ProcessorError::InvalidReply`] if the reply has no usable JSON.
    pub async fn generate_captions(
        &self,
        input: &ProcessorInput,
    ) -> Result<GeneratedCaptions, ProcessorError> {
        let prompt = build_prompt(input);
        let text = retry_with_backoff(self.retry, "anthropic", || self.send(&prompt)).await?;
        parse_reply(&text)
    }

    async fn send(&self, prompt: &str) -> Result<String, ProcessorError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(30);
            return Err(ProcessorError::RateLimited { retry_after_secs });
        }
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map_or_else(|_| body.chars().take(200).collect(), |e| e.error.message);
            return Err(ProcessorError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: MessagesResponse =
            serde_json::from_str(&body).map_err(|e| ProcessorError::Deserialize {
                context: "Anthropic messages response".to_string(),
                source: e,
            })?;
        parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text)
            .ok_or_else(|| ProcessorError::InvalidReply("no text block in reply".to_string()))
    }
}

fn build_prompt(input: &ProcessorInput) -> String {
    let body: String = input.body.chars().take(PROMPT_BODY_CHARS).collect();
    let category = input.category.as_deref().unwrap_or("general");
    format!(
        "You write social media captions for posts sourced from Reddit.\n\
         Subreddit: r/{subreddit}\n\
         Category: {category}\n\
         Title: {title}\n\
         Body: {body}\n\n\
         Reply with a single JSON object and nothing else, with these keys:\n\
         - \"instagram_caption\": an engaging caption of at most 1800 characters, no hashtags\n\
         - \"tiktok_caption\": a hook of at most 100 characters, no hashtags\n\
         - \"hashtags\": 5 to 15 relevant hashtags, each starting with #",
        subreddit = input.subreddit,
        title = input.title,
    )
}

/// Extracts the caption object from a model reply, tolerating markdown
/// fences and prose around the JSON.
///
/// # Errors
///
/// Returns [`ProcessorError::InvalidReply`] when no JSON object with
/// non-empty captions can be found.
pub fn parse_reply(text: &str) -> Result<GeneratedCaptions, ProcessorError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => return Err(ProcessorError::InvalidReply("no JSON object found".to_string())),
    };

    let captions: GeneratedCaptions = serde_json::from_str(json)
        .map_err(|e| ProcessorError::InvalidReply(format!("malformed caption JSON: {e}")))?;

    if captions.instagram_caption.trim().is_empty() || captions.tiktok_caption.trim().is_empty() {
        return Err(ProcessorError::InvalidReply("empty caption".to_string()));
    }
    Ok(captions)
}
