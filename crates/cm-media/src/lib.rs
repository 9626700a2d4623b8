//! Image lookup for processed posts: provider search, download into the
//! media directory, and the fallback image.

pub mod error;
pub mod finder;
pub mod provider;

use std::future::Future;

pub use error::MediaError;
pub use finder::{search_query, FoundMedia, MediaFinder, MediaSource};
pub use provider::{ImageCandidate, ImageProvider, MediaProvider};

/// Anything that can find an image for a set of keywords.
pub trait MediaLocator {
    fn locate(
        &self,
        keywords: &[String],
    ) -> impl Future<Output = Result<Option<FoundMedia>, MediaError>> + Send;
}

impl MediaLocator for MediaFinder {
    async fn locate(&self, keywords: &[String]) -> Result<Option<FoundMedia>, MediaError> {
        self.find(keywords).await
    }
}
