use cm_core::Retriable;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited by Reddit (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("Reddit rejected the credentials: {reason}")]
    Unauthorized { reason: String },

    #[error("subreddit not found or private: {url}")]
    NotFound { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
}

impl Retriable for ScraperError {
    /// Transient: 429, 5xx, network failures, and an expired token (the
    /// cached token is dropped before the error is returned).
    fn is_retriable(&self) -> bool {
        match self {
            ScraperError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            ScraperError::RateLimited { .. } | ScraperError::Unauthorized { .. } => true,
            ScraperError::UnexpectedStatus { status, .. } => *status >= 500,
            ScraperError::Deserialize { .. } | ScraperError::NotFound { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retriable() {
        let err = ScraperError::UnexpectedStatus {
            status: 503,
            url: "https://oauth.reddit.com/r/x/top".to_string(),
        };
        assert!(err.is_retriable());
    }

    #[test]
    fn client_errors_are_not_retriable() {
        let err = ScraperError::UnexpectedStatus {
            status: 403,
            url: "https://oauth.reddit.com/r/x/top".to_string(),
        };
        assert!(!err.is_retriable());
        assert!(!ScraperError::NotFound {
            url: "u".to_string()
        }
        .is_retriable());
    }

    #[test]
    fn rate_limit_is_retriable() {
        assert!(ScraperError::RateLimited {
            retry_after_secs: 5
        }
        .is_retriable());
    }
}
