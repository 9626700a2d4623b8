use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A Reddit post as returned by a listing, before any filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedPost {
    /// Reddit base-36 id; the dedup key.
    pub source_id: String,
    pub subreddit: String,
    pub title: String,
    pub body: String,
    pub permalink: String,
    pub url: Option<String>,
    pub author: Option<String>,
    pub upvotes: i64,
    pub num_comments: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub over_18: bool,
    pub stickied: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Listing {
    pub(crate) data: ListingData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListingData {
    #[serde(default)]
    pub(crate) children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListingChild {
    pub(crate) data: PostData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostData {
    pub(crate) id: String,
    pub(crate) subreddit: String,
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) selftext: String,
    #[serde(default)]
    pub(crate) permalink: String,
    pub(crate) url: Option<String>,
    pub(crate) author: Option<String>,
    #[serde(default)]
    pub(crate) score: i64,
    #[serde(default)]
    pub(crate) num_comments: i64,
    pub(crate) created_utc: Option<f64>,
    #[serde(default)]
    pub(crate) over_18: bool,
    #[serde(default)]
    pub(crate) stickied: bool,
}

impl From<PostData> for ScrapedPost {
    fn from(data: PostData) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let created_at = data
            .created_utc
            .and_then(|secs| DateTime::from_timestamp(secs as i64, 0));

        Self {
            source_id: data.id,
            subreddit: data.subreddit,
            title: data.title,
            body: data.selftext,
            permalink: data.permalink,
            url: data.url,
            author: data.author.filter(|a| a != "[deleted]"),
            upvotes: data.score,
            num_comments: data.num_comments,
            created_at,
            over_18: data.over_18,
            stickied: data.stickied,
        }
    }
}
