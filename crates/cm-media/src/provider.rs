//! Stock-image search providers.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use crate::error::MediaError;

const RESULTS_PER_PAGE: &str = "10";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaProvider {
    Unsplash,
    Pexels,
    Pixabay,
}

impl MediaProvider {
    /// Value stored in `posts.media_source`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MediaProvider::Unsplash => "unsplash",
            MediaProvider::Pexels => "pexels",
            MediaProvider::Pixabay => "pixabay",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            MediaProvider::Unsplash => "https://api.unsplash.com",
            MediaProvider::Pexels => "https://api.pexels.com",
            MediaProvider::Pixabay => "https://pixabay.com",
        }
    }
}

impl std::fmt::Display for MediaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub provider: MediaProvider,
    /// Direct link to the image file.
    pub image_url: String,
    /// The provider's page for the photo, kept for attribution.
    pub page_url: Option<String>,
}

#[derive(Deserialize)]
struct UnsplashResponse {
    #[serde(default)]
    results: Vec<UnsplashPhoto>,
}

#[derive(Deserialize)]
struct UnsplashPhoto {
    urls: UnsplashUrls,
    links: Option<UnsplashLinks>,
}

#[derive(Deserialize)]
struct UnsplashUrls {
    regular: String,
}

#[derive(Deserialize)]
struct UnsplashLinks {
    html: Option<String>,
}

#[derive(Deserialize)]
struct PexelsResponse {
    #[serde(default)]
    photos: Vec<PexelsPhoto>,
}

#[derive(Deserialize)]
struct PexelsPhoto {
    url: Option<String>,
    src: PexelsSrc,
}

#[derive(Deserialize)]
struct PexelsSrc {
    large: String,
}

#[derive(Deserialize)]
struct PixabayResponse {
    #[serde(default)]
    hits: Vec<PixabayHit>,
}

#[derive(Deserialize)]
struct PixabayHit {
    #[serde(rename = "webformatURL")]
    webformat_url: String,
    #[serde(rename = "pageURL")]
    page_url: Option<String>,
}

/// A configured provider: which API, its key, and where it lives.
#[derive(Clone)]
pub struct ImageProvider {
    provider: MediaProvider,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for ImageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageProvider")
            .field("provider", &self.provider)
            .field("api_key", &"[redacted]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ImageProvider {
    #[must_use]
    pub fn new(provider: MediaProvider, api_key: &str) -> Self {
        Self {
            provider,
            api_key: api_key.to_string(),
            base_url: provider.default_base_url().to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn provider(&self) -> MediaProvider {
        self.provider
    }

    fn request(&self, client: &Client, query: &str) -> RequestBuilder {
        match self.provider {
            MediaProvider::Unsplash => client
                .get(format!("{}/search/photos", self.base_url))
                .header("Authorization", format!("Client-ID {}", self.api_key))
                .query(&[
                    ("query", query),
                    ("per_page", RESULTS_PER_PAGE),
                    ("orientation", "squarish"),
                ]),
            MediaProvider::Pexels => client
                .get(format!("{}/v1/search", self.base_url))
                .header("Authorization", &self.api_key)
                .query(&[("query", query), ("per_page", RESULTS_PER_PAGE)]),
            MediaProvider::Pixabay => client
                .get(format!("{}/api/", self.base_url))
                .query(&[
                    ("key", self.api_key.as_str()),
                    ("q", query),
                    ("per_page", RESULTS_PER_PAGE),
                    ("image_type", "photo"),
                    ("safesearch", "true"),
                ]),
        }
    }

    /// Searches for photos matching `query`.
    ///
    /// # Errors
    ///
    /// - [`MediaError::RateLimited`] on 429, [`MediaError::Unauthorized`]
    ///   on 401/403, [`MediaError::UnexpectedStatus`] otherwise.
    /// - [`MediaError::Deserialize`] if the body does not parse.
    pub async fn search(
        &self,
        client: &Client,
        query: &str,
    ) -> Result<Vec<ImageCandidate>, MediaError> {
        let provider = self.provider.as_str();
        // Pixabay takes the key as a query parameter; keep it out of errors.
        let response = self
            .request(client, query)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MediaError::RateLimited { provider });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(MediaError::Unauthorized { provider });
        }
        if !status.is_success() {
            return Err(MediaError::UnexpectedStatus {
                provider,
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(reqwest::Error::without_url)?;
        let deserialize = |e| MediaError::Deserialize {
            context: format!("{provider} search response"),
            source: e,
        };

        let candidates = match self.provider {
            MediaProvider::Unsplash => serde_json::from_str::<UnsplashResponse>(&body)
                .map_err(deserialize)?
                .results
                .into_iter()
                .map(|p| ImageCandidate {
                    provider: self.provider,
                    image_url: p.urls.regular,
                    page_url: p.links.and_then(|l| l.html),
                })
                .collect(),
            MediaProvider::Pexels => serde_json::from_str::<PexelsResponse>(&body)
                .map_err(deserialize)?
                .photos
                .into_iter()
                .map(|p| ImageCandidate {
                    provider: self.provider,
                    image_url: p.src.large,
                    page_url: p.url,
                })
                .collect(),
            MediaProvider::Pixabay => {
                serde_json::from_str::<PixabayResponse>(&body)
                    .map_err(deserialize)?
                    .hits
                    .into_iter()
                    .map(|h| ImageCandidate {
                        provider: self.provider,
                        image_url: h.webformat_url,
                        page_url: h.page_url,
                    })
                    .collect()
            }
        };
        Ok(candidates)
    }
}
