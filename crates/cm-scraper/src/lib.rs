//! Reddit scraping: listing client, filters, and the `PostSource` seam the
//! pipeline's scrape stage is written against.

pub mod client;
pub mod error;
pub mod filter;
pub mod types;

use std::future::Future;

use cm_core::SubredditConfig;

pub use client::{RedditClient, RedditCredentials};
pub use error::ScraperError;
pub use filter::{filter_posts, passes_filters};
pub use types::ScrapedPost;

/// Anything that can list candidate posts for a subreddit.
pub trait PostSource {
    /// Returns the subreddit's posts that pass the configured filters.
    fn fetch_subreddit(
        &self,
        subreddit: &SubredditConfig,
    ) -> impl Future<Output = Result<Vec<ScrapedPost>, ScraperError>> + Send;
}

impl PostSource for RedditClient {
    async fn fetch_subreddit(
        &self,
        subreddit: &SubredditConfig,
    ) -> Result<Vec<ScrapedPost>, ScraperError> {
        let posts = self.fetch_top(subreddit).await?;
        let fetched = posts.len();
        let kept = filter_posts(posts, subreddit);
        tracing::info!(
            subreddit = %subreddit.name,
            fetched,
            kept = kept.len(),
            "filtered Reddit listing"
        );
        Ok(kept)
    }
}
