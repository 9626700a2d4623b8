use std::path::PathBuf;

use cm_core::{AppConfig, ContentConfig, Stage};
use cm_media::{MediaError, MediaFinder, MediaLocator};
use cm_processor::{CaptionGenerator, ClaudeClient, Processor, ProcessorError};
use cm_publisher::{PlatformPublisher, PublishError, Publisher};
use cm_scraper::{PostSource, RedditClient, ScraperError};
use sqlx::PgPool;
use thiserror::Error;

use crate::error::PipelineError;
use crate::report::StageReport;
use crate::stages;

/// Settings the stages read besides the content file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Maximum posts a stage takes per pass.
    pub batch_size: i64,
    /// Retriable failures after which a post is no longer retried.
    pub max_stage_attempts: i32,
    pub media_dir: PathBuf,
    /// Public origin that serves `media_dir` under `/media/`.
    pub media_public_base_url: Option<String>,
}

impl PipelineSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_stage_attempts: config.max_stage_attempts,
            media_dir: config.media_dir.clone(),
            media_public_base_url: config.media_public_base_url.clone(),
        }
    }
}

/// The four stages and the clients they drive.
pub struct Pipeline<S, G, M, P> {
    pub(crate) pool: PgPool,
    pub(crate) content: ContentConfig,
    pub(crate) settings: PipelineSettings,
    pub(crate) source: S,
    pub(crate) processor: Processor<G>,
    pub(crate) media: M,
    pub(crate) publisher: P,
}

/// The production wiring: Reddit, Anthropic, stock-image providers and the
/// platform clients.
pub type DefaultPipeline = Pipeline<RedditClient, ClaudeClient, MediaFinder, Publisher>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Reddit client: {0}")]
    Scraper(#[from] ScraperError),
    #[error("caption generator: {0}")]
    Processor(#[from] ProcessorError),
    #[error("media finder: {0}")]
    Media(#[from] MediaError),
    #[error("publisher: {0}")]
    Publisher(#[from] PublishError),
}

impl DefaultPipeline {
    /// Builds every client from the application config.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if any HTTP client cannot be constructed.
    pub fn from_app_config(
        pool: PgPool,
        config: &AppConfig,
        content: ContentConfig,
    ) -> Result<Self, BuildError> {
        let source = RedditClient::from_app_config(config)?;
        let processor = Processor::from_app_config(config, content.clone())?;
        let media = MediaFinder::from_app_config(config)?;
        let publisher = Publisher::from_app_config(config)?;
        Ok(Pipeline::new(
            pool,
            content,
            PipelineSettings::from_app_config(config),
            source,
            processor,
            media,
            publisher,
        ))
    }
}

impl<S, G, M, P> Pipeline<S, G, M, P>
where
    S: PostSource + Sync,
    G: CaptionGenerator + Sync,
    M: MediaLocator + Sync,
    P: PlatformPublisher + Sync,
{
    #[must_use]
    pub fn new(
        pool: PgPool,
        content: ContentConfig,
        settings: PipelineSettings,
        source: S,
        processor: Processor<G>,
        media: M,
        publisher: P,
    ) -> Self {
        Self {
            pool,
            content,
            settings,
            source,
            processor,
            media,
            publisher,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[must_use]
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs one stage over its batch.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when the stage cannot run at all (fatal
    /// database errors, or every subreddit failing to scrape). Per-post
    /// failures are recorded on the posts and counted in the report.
    pub async fn run_stage(&self, stage: Stage) -> Result<StageReport, PipelineError> {
        tracing::info!(stage = %stage, "stage starting");
        let report = match stage {
            Stage::Scrape => stages::scrape::run(self).await?,
            Stage::Process => stages::process::run(self).await?,
            Stage::Media => stages::media::run(self).await?,
            Stage::Publish => stages::publish::run(self).await?,
        };
        tracing::info!(
            stage = %stage,
            processed = report.processed,
            failed = report.failed,
            skipped = report.skipped,
            "stage finished"
        );
        Ok(report)
    }
}
