use cm_core::Stage;
use cm_db::{PostRow, ProcessedContent};
use cm_processor::{CaptionGenerator, ProcessorError, ProcessorInput};

use crate::error::{PipelineError, StageError};
use crate::pipeline::Pipeline;
use crate::report::StageReport;
use crate::stages::{precondition, settle};

impl From<ProcessorError> for StageError {
    fn from(err: ProcessorError) -> Self {
        if err.is_content_error() {
            StageError::Content(err.to_string())
        } else {
            StageError::ExternalApi(err.to_string())
        }
    }
}

/// Captions every `scraped` post in the batch and moves it to `processed`.
pub(crate) async fn run<S, G, M, P>(
    pipeline: &Pipeline<S, G, M, P>,
) -> Result<StageReport, PipelineError>
where
    G: CaptionGenerator + Sync,
{
    let stage = Stage::Process;
    let from = precondition(stage)?;
    let mut report = StageReport::new(stage);
    let posts = cm_db::list_posts_for_stage(
        &pipeline.pool,
        stage.contract(),
        pipeline.settings.batch_size,
        pipeline.settings.max_stage_attempts,
    )
    .await?;

    for post in &posts {
        let result = process_one(pipeline, post).await;
        settle(
            &pipeline.pool,
            post,
            from,
            result,
            pipeline.settings.max_stage_attempts,
            &mut report,
        )
        .await?;
    }
    Ok(report)
}

async fn process_one<S, G, M, P>(
    pipeline: &Pipeline<S, G, M, P>,
    post: &PostRow,
) -> Result<(), StageError>
where
    G: CaptionGenerator + Sync,
{
    let input = ProcessorInput {
        title: post.title.clone(),
        body: post.raw_text.clone(),
        subreddit: post.subreddit.clone(),
        category: None,
    };
    let processed = pipeline.processor.process(&input).await?;
    tracing::debug!(
        post_id = post.id,
        caption_source = processed.caption_source.as_str(),
        keywords = processed.keywords.len(),
        "post captioned"
    );

    let content = ProcessedContent {
        processed_caption: processed.long_caption,
        short_caption: processed.short_caption,
        keywords: processed.keywords,
        hashtags: processed.hashtags,
    };
    cm_db::record_processed(&pipeline.pool, post.id, &content).await?;
    Ok(())
}
