use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Reddit `t=` window for top listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    Hour,
    #[default]
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeFilter {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TimeFilter::Hour => "hour",
            TimeFilter::Day => "day",
            TimeFilter::Week => "week",
            TimeFilter::Month => "month",
            TimeFilter::Year => "year",
            TimeFilter::All => "all",
        }
    }
}

fn default_min_upvotes() -> i64 {
    1000
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubredditConfig {
    pub name: String,
    #[serde(default = "default_min_upvotes")]
    pub min_upvotes: i64,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub time_filter: TimeFilter,
    /// Key into [`ContentConfig::categories`]; falls back to `default_category`.
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionLimits {
    pub instagram_max_chars: usize,
    pub instagram_max_hashtags: usize,
    pub tiktok_max_chars: usize,
    pub tiktok_max_hashtags: usize,
    /// Hashtags actually printed into the short caption.
    pub tiktok_caption_hashtags: usize,
    /// Characters of the body kept in the long caption before the ellipsis.
    pub body_excerpt_chars: usize,
}

impl Default for CaptionLimits {
    fn default() -> Self {
        Self {
            instagram_max_chars: 2200,
            instagram_max_hashtags: 30,
            tiktok_max_chars: 150,
            tiktok_max_hashtags: 10,
            tiktok_caption_hashtags: 5,
            body_excerpt_chars: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    pub subreddits: Vec<SubredditConfig>,
    /// Category name → generic hashtags (with the leading `#`).
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
    pub default_category: String,
    #[serde(default)]
    pub captions: CaptionLimits,
}

impl ContentConfig {
    /// Generic hashtags for a subreddit's category, or the default category.
    #[must_use]
    pub fn category_hashtags(&self, category: Option<&str>) -> &[String] {
        category
            .and_then(|c| self.categories.get(c))
            .or_else(|| self.categories.get(&self.default_category))
            .map_or(&[], Vec::as_slice)
    }

    /// Category configured for `subreddit`, matched case-insensitively.
    #[must_use]
    pub fn category_for_subreddit(&self, subreddit: &str) -> Option<&str> {
        self.subreddits
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(subreddit))
            .and_then(|s| s.category.as_deref())
    }
}

/// Load and validate the content configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_content_config(path: &Path) -> Result<ContentConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ContentFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_content_config(&raw)
}

/// Parse and validate content configuration from YAML text.
///
/// # Errors
///
/// Returns `ConfigError` if parsing or validation fails.
pub fn parse_content_config(raw: &str) -> Result<ContentConfig, ConfigError> {
    let config: ContentConfig = serde_yaml::from_str(raw)?;
    validate_content(&config)?;
    Ok(config)
}

fn validate_content(config: &ContentConfig) -> Result<(), ConfigError> {
    if config.subreddits.is_empty() {
        return Err(ConfigError::Validation(
            "at least one subreddit must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for sub in &config.subreddits {
        let name = sub.name.trim();
        if name.is_empty() {
            return Err(ConfigError::Validation(
                "subreddit name must be non-empty".to_string(),
            ));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::Validation(format!(
                "subreddit '{name}' contains invalid characters"
            )));
        }
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate subreddit: '{name}'"
            )));
        }
        if sub.limit == 0 || sub.limit > 100 {
            return Err(ConfigError::Validation(format!(
                "subreddit '{name}' has limit {}; must be between 1 and 100",
                sub.limit
            )));
        }
        if let Some(category) = &sub.category {
            if !config.categories.contains_key(category) {
                return Err(ConfigError::Validation(format!(
                    "subreddit '{name}' references unknown category '{category}'"
                )));
            }
        }
    }

    if !config.categories.contains_key(&config.default_category) {
        return Err(ConfigError::Validation(format!(
            "default_category '{}' is not a configured category",
            config.default_category
        )));
    }

    for (category, tags) in &config.categories {
        if let Some(bad) = tags.iter().find(|t| !is_valid_hashtag(t)) {
            return Err(ConfigError::Validation(format!(
                "category '{category}' has malformed hashtag '{bad}'"
            )));
        }
    }

    let limits = &config.captions;
    if limits.tiktok_caption_hashtags > limits.tiktok_max_hashtags {
        return Err(ConfigError::Validation(
            "tiktok_caption_hashtags cannot exceed tiktok_max_hashtags".to_string(),
        ));
    }
    if limits.instagram_max_chars == 0 || limits.tiktok_max_chars == 0 {
        return Err(ConfigError::Validation(
            "caption length limits must be positive".to_string(),
        ));
    }

    Ok(())
}

fn is_valid_hashtag(tag: &str) -> bool {
    tag.strip_prefix('#')
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(char::is_alphanumeric))
}
