use serde::{Deserialize, Serialize};

/// The text a post is captioned from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorInput {
    pub title: String,
    pub body: String,
    pub subreddit: String,
    pub category: Option<String>,
}

/// Captions written by a [`crate::CaptionGenerator`], before fitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCaptions {
    pub instagram_caption: String,
    pub tiktok_caption: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionSource {
    Llm,
    Template,
}

impl CaptionSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CaptionSource::Llm => "llm",
            CaptionSource::Template => "template",
        }
    }
}

/// Everything the process stage stores on a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedPost {
    pub long_caption: String,
    pub short_caption: String,
    pub keywords: Vec<String>,
    pub hashtags: Vec<String>,
    pub caption_source: CaptionSource,
}
