//! Turns a scraped post into captions, keywords and hashtags.

use std::future::Future;

use cm_core::{ContentConfig, Retriable};

use crate::caption::{finish_long_caption, format_long_caption, format_short_caption};
use crate::claude::ClaudeClient;
use crate::error::ProcessorError;
use crate::hashtags::{generate_hashtags, normalize_hashtags};
use crate::keywords::{extract_keywords, MAX_KEYWORDS};
use crate::text::clean_text;
use crate::types::{CaptionSource, GeneratedCaptions, ProcessedPost, ProcessorInput};

/// Something that writes captions for a post (an LLM in production).
pub trait CaptionGenerator {
    fn generate(
        &self,
        input: &ProcessorInput,
    ) -> impl Future<Output = Result<GeneratedCaptions, ProcessorError>> + Send;
}

impl CaptionGenerator for ClaudeClient {
    async fn generate(&self, input: &ProcessorInput) -> Result<GeneratedCaptions, ProcessorError> {
        self.generate_captions(input).await
    }
}

/// Text processor. Without a generator every caption comes from templates.
pub struct Processor<G> {
    generator: Option<G>,
    content: ContentConfig,
}

impl<G> Processor<G>
where
    G: CaptionGenerator + Sync,
{
    #[must_use]
    pub fn new(generator: Option<G>, content: ContentConfig) -> Self {
        Self { generator, content }
    }

    #[must_use]
    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Cleans the post text, extracts keywords, builds hashtags and writes
    /// both captions.
    ///
    /// A generator failure that is not transient, or an unusable reply,
    /// falls back to template captions.
    ///
    /// # Errors
    ///
    /// - [`ProcessorError::EmptyContent`] if nothing is left after cleanup.
    /// - A transient generator error (rate limit, overload, network), so
    ///   the caller can try the post again later.
    pub async fn process(&self, input: &ProcessorInput) -> Result<ProcessedPost, ProcessorError> {
        let cleaned = ProcessorInput {
            title: clean_text(&input.title),
            body: clean_text(&input.body),
            subreddit: input.subreddit.clone(),
            category: input.category.clone().or_else(|| {
                self.content
                    .category_for_subreddit(&input.subreddit)
                    .map(str::to_string)
            }),
        };
        if cleaned.title.is_empty() && cleaned.body.is_empty() {
            return Err(ProcessorError::EmptyContent);
        }

        let limits = &self.content.captions;
        let keywords = extract_keywords(&format!("{} {}", cleaned.title, cleaned.body), MAX_KEYWORDS);
        let category_tags = self.content.category_hashtags(cleaned.category.as_deref());
        let hashtags = generate_hashtags(&keywords, category_tags, limits.instagram_max_hashtags);

        if let Some(generator) = &self.generator {
            match generator.generate(&cleaned).await {
                Ok(captions) => {
                    let merged: Vec<&str> = captions
                        .hashtags
                        .iter()
                        .map(String::as_str)
                        .chain(hashtags.iter().map(String::as_str))
                        .collect();
                    let hashtags = normalize_hashtags(&merged, limits.instagram_max_hashtags);
                    return Ok(ProcessedPost {
                        long_caption: finish_long_caption(
                            &captions.instagram_caption,
                            &cleaned.subreddit,
                            &hashtags,
                            limits,
                        ),
                        short_caption: format_short_caption(
                            &captions.tiktok_caption,
                            &hashtags,
                            limits,
                        ),
                        keywords,
                        hashtags,
                        caption_source: CaptionSource::Llm,
                    });
                }
                Err(e) if e.is_retriable() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        subreddit = %cleaned.subreddit,
                        error = %e,
                        "caption generation failed, using template captions"
                    );
                }
            }
        }

        let headline = if cleaned.title.is_empty() {
            &cleaned.body
        } else {
            &cleaned.title
        };
        let body = if cleaned.title.is_empty() {
            ""
        } else {
            cleaned.body.as_str()
        };
        Ok(ProcessedPost {
            long_caption: format_long_caption(
                headline,
                body,
                &cleaned.subreddit,
                cleaned.category.as_deref(),
                &hashtags,
                limits,
            ),
            short_caption: format_short_caption(headline, &hashtags, limits),
            keywords,
            hashtags,
            caption_source: CaptionSource::Template,
        })
    }
}

impl Processor<ClaudeClient> {
    /// Processor backed by Anthropic when `ANTHROPIC_API_KEY` is set,
    /// templates otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::Http`] if the HTTP client cannot be built.
    pub fn from_app_config(
        config: &cm_core::AppConfig,
        content: ContentConfig,
    ) -> Result<Self, ProcessorError> {
        let generator = ClaudeClient::from_app_config(config)?;
        if generator.is_none() {
            tracing::info!("ANTHROPIC_API_KEY not set, captions will use templates");
        }
        Ok(Self::new(generator, content))
    }
}

#[cfg(test)]
#[path = "processor_test.rs"]
mod tests;
