use cm_core::Retriable;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Anthropic API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("rate limited by Anthropic (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unusable caption reply: {0}")]
    InvalidReply(String),

    #[error("post has no usable text after cleanup")]
    EmptyContent,
}

impl ProcessorError {
    /// Errors that will not go away by asking again: the post itself is the
    /// problem.
    #[must_use]
    pub fn is_content_error(&self) -> bool {
        matches!(self, ProcessorError::EmptyContent)
    }
}

impl Retriable for ProcessorError {
    /// Transient: 429, 5xx (Anthropic's 529 overload included) and network
    /// failures.
    fn is_retriable(&self) -> bool {
        match self {
            ProcessorError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            ProcessorError::RateLimited { .. } => true,
            ProcessorError::Api { status, .. } => *status >= 500,
            ProcessorError::Deserialize { .. }
            | ProcessorError::InvalidReply(_)
            | ProcessorError::EmptyContent => false,
        }
    }
}
