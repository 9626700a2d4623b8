use std::path::PathBuf;

use cm_core::Retriable;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by {provider}")]
    RateLimited { provider: &'static str },

    #[error("{provider} rejected the API key")]
    Unauthorized { provider: &'static str },

    #[error("unexpected HTTP status {status} from {provider}")]
    UnexpectedStatus { provider: &'static str, status: u16 },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("downloaded image from {url} is empty")]
    EmptyDownload { url: String },

    #[error("media file error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Retriable for MediaError {
    fn is_retriable(&self) -> bool {
        match self {
            MediaError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            MediaError::RateLimited { .. } => true,
            MediaError::UnexpectedStatus { status, .. } => *status >= 500,
            MediaError::Unauthorized { .. }
            | MediaError::Deserialize { .. }
            | MediaError::EmptyDownload { .. }
            | MediaError::Io { .. } => false,
        }
    }
}
