//! Caption processing: text cleanup, keywords, hashtags, template captions
//! and the Anthropic-backed [`CaptionGenerator`].

pub mod caption;
pub mod claude;
pub mod error;
pub mod hashtags;
pub mod keywords;
pub mod processor;
pub mod text;
pub mod types;

pub use claude::ClaudeClient;
pub use error::ProcessorError;
pub use keywords::extract_keywords;
pub use processor::{CaptionGenerator, Processor};
pub use text::clean_text;
pub use types::{CaptionSource, GeneratedCaptions, ProcessedPost, ProcessorInput};
