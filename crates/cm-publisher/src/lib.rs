//! Social platform publishing: Instagram Graph and TikTok Content Posting
//! clients behind one [`PlatformPublisher`] seam.

pub mod error;
pub mod instagram;
pub mod tiktok;
pub mod types;

use std::future::Future;

use cm_core::{AppConfig, Platform};

pub use error::PublishError;
pub use instagram::InstagramClient;
pub use tiktok::TikTokClient;
pub use types::{PublishReceipt, PublishRequest};

/// Publishes a post to one platform.
pub trait PlatformPublisher {
    fn publish(
        &self,
        platform: Platform,
        request: &PublishRequest,
    ) -> impl Future<Output = Result<PublishReceipt, PublishError>> + Send;
}

/// The configured platform clients. A platform without credentials
/// answers every publish with [`PublishError::NotConfigured`].
#[derive(Debug, Default)]
pub struct Publisher {
    instagram: Option<InstagramClient>,
    tiktok: Option<TikTokClient>,
}

impl Publisher {
    #[must_use]
    pub fn new(instagram: Option<InstagramClient>, tiktok: Option<TikTokClient>) -> Self {
        Self { instagram, tiktok }
    }

    /// # Errors
    ///
    /// Returns [`PublishError::Http`] if an HTTP client cannot be built.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, PublishError> {
        let publisher = Self::new(
            InstagramClient::from_app_config(config)?,
            TikTokClient::from_app_config(config)?,
        );
        tracing::debug!(
            instagram = publisher.is_configured(Platform::Instagram),
            tiktok = publisher.is_configured(Platform::TikTok),
            "publisher clients configured"
        );
        Ok(publisher)
    }

    #[must_use]
    pub fn is_configured(&self, platform: Platform) -> bool {
        match platform {
            Platform::Instagram => self.instagram.is_some(),
            Platform::TikTok => self.tiktok.is_some(),
        }
    }
}

impl PlatformPublisher for Publisher {
    async fn publish(
        &self,
        platform: Platform,
        request: &PublishRequest,
    ) -> Result<PublishReceipt, PublishError> {
        match platform {
            Platform::Instagram => match &self.instagram {
                Some(client) => client.publish(request).await,
                None => Err(PublishError::NotConfigured { platform }),
            },
            Platform::TikTok => match &self.tiktok {
                Some(client) => client.publish(request).await,
                None => Err(PublishError::NotConfigured { platform }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_platform_is_reported() {
        let publisher = Publisher::default();
        let request = PublishRequest {
            caption: "caption".to_string(),
            image_url: "https://cdn.example/x.jpg".to_string(),
        };
        let err = publisher
            .publish(Platform::Instagram, &request)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PublishError::NotConfigured {
                platform: Platform::Instagram
            }
        ));
        assert!(!publisher.is_configured(Platform::TikTok));
    }
}
