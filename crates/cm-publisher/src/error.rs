use cm_core::{Platform, Retriable};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{platform} is not configured (missing credentials)")]
    NotConfigured { platform: Platform },

    #[error("rate limited by {platform}")]
    RateLimited { platform: Platform },

    #[error("{platform} rejected the access token: {message}")]
    Unauthorized { platform: Platform, message: String },

    #[error("{platform} API returned {status}: {message}")]
    Api {
        platform: Platform,
        status: u16,
        message: String,
    },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Retriable for PublishError {
    fn is_retriable(&self) -> bool {
        match self {
            PublishError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            PublishError::RateLimited { .. } => true,
            PublishError::Api { status, .. } => *status >= 500,
            PublishError::NotConfigured { .. }
            | PublishError::Unauthorized { .. }
            | PublishError::Deserialize { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(PublishError::RateLimited {
            platform: Platform::TikTok
        }
        .is_retriable());
        assert!(PublishError::Api {
            platform: Platform::Instagram,
            status: 500,
            message: "An unexpected error has occurred".to_string(),
        }
        .is_retriable());
        assert!(!PublishError::NotConfigured {
            platform: Platform::Instagram
        }
        .is_retriable());
        assert!(!PublishError::Unauthorized {
            platform: Platform::TikTok,
            message: "access_token_invalid".to_string(),
        }
        .is_retriable());
    }

    #[test]
    fn message_names_platform() {
        let err = PublishError::NotConfigured {
            platform: Platform::TikTok,
        };
        assert_eq!(err.to_string(), "tiktok is not configured (missing credentials)");
    }
}
