use std::path::{Path, PathBuf};
use std::time::Duration;

use cm_core::{retry_with_backoff, AppConfig, Retriable, RetryPolicy};
use reqwest::Client;
use sha2::{Digest, Sha256};

use crate::error::MediaError;
use crate::provider::{ImageCandidate, ImageProvider, MediaProvider};

/// Query used when a post has no keywords.
pub const DEFAULT_QUERY: &str = "knowledge learning";

const QUERY_KEYWORDS: usize = 3;
const IMAGES_SUBDIR: &str = "images";

/// Where an attached image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSource {
    Provider(MediaProvider),
    Fallback,
}

impl MediaSource {
    /// Value stored in `posts.media_source`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MediaSource::Provider(provider) => provider.as_str(),
            MediaSource::Fallback => "fallback",
        }
    }
}

/// An image saved under the media directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundMedia {
    pub path: PathBuf,
    pub source: MediaSource,
    /// Remote image URL; `None` for the fallback image.
    pub source_url: Option<String>,
}

/// Builds the search query from the first few keywords.
#[must_use]
pub fn search_query(keywords: &[String]) -> String {
    let words: Vec<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .take(QUERY_KEYWORDS)
        .collect();
    if words.is_empty() {
        DEFAULT_QUERY.to_string()
    } else {
        words.join(" ")
    }
}

fn file_name_for(candidate: &ImageCandidate) -> String {
    let hash = Sha256::digest(candidate.image_url.as_bytes());
    let prefix: String = hash[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("{}_{prefix}.jpg", candidate.provider)
}

/// Searches the configured providers in order, downloads a random hit of
/// the first provider that has one, and falls back to a configured image.
pub struct MediaFinder {
    client: Client,
    providers: Vec<ImageProvider>,
    media_dir: PathBuf,
    fallback_image: Option<PathBuf>,
    retry: RetryPolicy,
}

impl MediaFinder {
    /// # Errors
    ///
    /// Returns [`MediaError::Http`] if the HTTP client cannot be built.
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        providers: Vec<ImageProvider>,
        media_dir: PathBuf,
        fallback_image: Option<PathBuf>,
        retry: RetryPolicy,
    ) -> Result<Self, MediaError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            providers,
            media_dir,
            fallback_image,
            retry,
        })
    }

    /// Providers are enabled by their API keys, in the order Unsplash,
    /// Pexels, Pixabay.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::Http`] if the HTTP client cannot be built.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, MediaError> {
        let providers: Vec<ImageProvider> = [
            (MediaProvider::Unsplash, config.unsplash_access_key.as_deref()),
            (MediaProvider::Pexels, config.pexels_api_key.as_deref()),
            (MediaProvider::Pixabay, config.pixabay_api_key.as_deref()),
        ]
        .into_iter()
        .filter_map(|(provider, key)| key.map(|k| ImageProvider::new(provider, k)))
        .collect();

        if providers.is_empty() && config.fallback_image_path.is_none() {
            tracing::warn!("no image provider keys and no fallback image configured");
        }

        Self::new(
            config.http_timeout_secs,
            &config.user_agent,
            providers,
            config.media_dir.clone(),
            config.fallback_image_path.clone(),
            RetryPolicy::from_app_config(config),
        )
    }

    #[must_use]
    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    pub fn providers(&self) -> impl Iterator<Item = MediaProvider> + '_ {
        self.providers.iter().map(ImageProvider::provider)
    }

    /// Finds and stores an image for `keywords`.
    ///
    /// Returns `Ok(None)` when no provider has a match and no fallback
    /// image is usable.
    ///
    /// # Errors
    ///
    /// Returns the last transient provider error when no provider produced
    /// an image, so the post can be tried again later. Permanent provider
    /// errors are logged and the next provider is tried.
    pub async fn find(&self, keywords: &[String]) -> Result<Option<FoundMedia>, MediaError> {
        let query = search_query(keywords);
        let mut transient = None;

        for provider in &self.providers {
            match self.try_provider(provider, &query).await {
                Ok(Some(found)) => return Ok(Some(found)),
                Ok(None) => {
                    tracing::debug!(provider = %provider.provider(), %query, "no image results");
                }
                Err(e) => {
                    tracing::warn!(
                        provider = %provider.provider(),
                        %query,
                        error = %e,
                        "image provider failed"
                    );
                    if e.is_retriable() {
                        transient = Some(e);
                    }
                }
            }
        }

        if let Some(e) = transient {
            return Err(e);
        }
        self.fallback().await
    }

    async fn try_provider(
        &self,
        provider: &ImageProvider,
        query: &str,
    ) -> Result<Option<FoundMedia>, MediaError> {
        let label = provider.provider().as_str();
        let candidates = retry_with_backoff(self.retry, label, || {
            provider.search(&self.client, query)
        })
        .await?;
        if candidates.is_empty() {
            return Ok(None);
        }

        let candidate = &candidates[rand::random_range(0..candidates.len())];
        let path = self.download(candidate).await?;
        tracing::info!(
            provider = label,
            %query,
            path = %path.display(),
            "downloaded image"
        );
        Ok(Some(FoundMedia {
            path,
            source: MediaSource::Provider(candidate.provider),
            source_url: Some(candidate.image_url.clone()),
        }))
    }

    async fn download(&self, candidate: &ImageCandidate) -> Result<PathBuf, MediaError> {
        let provider = candidate.provider.as_str();
        let bytes = retry_with_backoff(self.retry, provider, || async {
            let response = self.client.get(&candidate.image_url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(MediaError::UnexpectedStatus {
                    provider,
                    status: status.as_u16(),
                });
            }
            Ok(response.bytes().await?)
        })
        .await?;
        if bytes.is_empty() {
            return Err(MediaError::EmptyDownload {
                url: candidate.image_url.clone(),
            });
        }

        let dir = self.media_dir.join(IMAGES_SUBDIR);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| MediaError::Io {
                path: dir.clone(),
                source,
            })?;
        let path = dir.join(file_name_for(candidate));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|source| MediaError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Copies the configured fallback image into the media directory so the
    /// validator can serve it.
    async fn fallback(&self) -> Result<Option<FoundMedia>, MediaError> {
        let Some(source) = &self.fallback_image else {
            return Ok(None);
        };
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            tracing::warn!(path = %source.display(), "fallback image does not exist");
            return Ok(None);
        }

        let dir = self.media_dir.join(IMAGES_SUBDIR);
        let file_name = source
            .file_name()
            .map_or_else(|| "fallback.jpg".into(), |n| n.to_string_lossy().into_owned());
        let target = dir.join(format!("fallback_{file_name}"));
        if !tokio::fs::try_exists(&target).await.unwrap_or(false) {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| MediaError::Io {
                    path: dir.clone(),
                    source: e,
                })?;
            tokio::fs::copy(source, &target)
                .await
                .map_err(|e| MediaError::Io {
                    path: target.clone(),
                    source: e,
                })?;
        }

        tracing::info!(path = %target.display(), "using fallback image");
        Ok(Some(FoundMedia {
            path: target,
            source: MediaSource::Fallback,
            source_url: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_uses_first_three_keywords() {
        let keywords: Vec<String> = ["octopus", "hearts", "blood", "copper"]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(search_query(&keywords), "octopus hearts blood");
    }

    #[test]
    fn empty_keywords_use_default_query() {
        assert_eq!(search_query(&[]), DEFAULT_QUERY);
        assert_eq!(search_query(&[" ".to_string()]), DEFAULT_QUERY);
    }

    #[test]
    fn file_name_is_stable_per_url() {
        let candidate = ImageCandidate {
            provider: MediaProvider::Pexels,
            image_url: "https://images.pexels.com/photos/1.jpeg".to_string(),
            page_url: None,
        };
        let name = file_name_for(&candidate);
        assert_eq!(name, file_name_for(&candidate));
        assert!(name.starts_with("pexels_"));
        assert_eq!(name.len(), "pexels_".len() + 16 + ".jpg".len());
    }

    #[test]
    fn media_source_names() {
        assert_eq!(MediaSource::Fallback.as_str(), "fallback");
        assert_eq!(
            MediaSource::Provider(MediaProvider::Unsplash).as_str(),
            "unsplash"
        );
    }
}
