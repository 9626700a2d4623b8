use cm_core::Stage;
use cm_db::{MediaAttachment, PostRow};
use cm_media::{MediaError, MediaLocator};

use crate::error::{PipelineError, StageError};
use crate::pipeline::Pipeline;
use crate::report::StageReport;
use crate::stages::{precondition, settle};

impl From<MediaError> for StageError {
    fn from(err: MediaError) -> Self {
        StageError::ExternalApi(err.to_string())
    }
}

/// Attaches an image to every `processed` post without media and moves it
/// to `media_ready`. Posts without a match stay `processed`.
pub(crate) async fn run<S, G, M, P>(
    pipeline: &Pipeline<S, G, M, P>,
) -> Result<StageReport, PipelineError>
where
    M: MediaLocator + Sync,
{
    let stage = Stage::Media;
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
        let result = attach_one(pipeline, post).await;
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

async fn attach_one<S, G, M, P>(
    pipeline: &Pipeline<S, G, M, P>,
    post: &PostRow,
) -> Result<(), StageError>
where
    M: MediaLocator + Sync,
{
    let Some(found) = pipeline.media.locate(&post.keywords).await? else {
        return Err(StageError::ExternalApi(
            "no image found for the post's keywords".to_string(),
        ));
    };

    let attachment = MediaAttachment {
        path: found.path.to_string_lossy().into_owned(),
        source: found.source.as_str().to_string(),
        source_url: found.source_url,
    };
    cm_db::record_media(&pipeline.pool, post.id, &attachment).await?;
    tracing::debug!(post_id = post.id, source = %attachment.source, "media attached");
    Ok(())
}
