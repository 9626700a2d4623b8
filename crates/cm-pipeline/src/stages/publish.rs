use std::path::Path;

use cm_core::{Platform, PostStatus, Stage};
use cm_db::{NewPublishLog, PostRow, PublishOutcome};
use cm_publisher::{PlatformPublisher, PublishRequest};
use sqlx::PgPool;

use crate::error::{PipelineError, StageError};
use crate::pipeline::{Pipeline, PipelineSettings};
use crate::report::StageReport;
use crate::stages::{precondition, settle};

/// Publishes every `approved` post in the batch.
pub(crate) async fn run<S, G, M, P>(
    pipeline: &Pipeline<S, G, M, P>,
) -> Result<StageReport, PipelineError>
where
    P: PlatformPublisher + Sync,
{
    let stage = Stage::Publish;
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
        match publish_approved(&pipeline.pool, &pipeline.settings, &pipeline.publisher, post).await
        {
            Ok(PublishOutcome::Published) => report.processed += 1,
            Ok(PublishOutcome::Failed { reason }) => {
                tracing::warn!(
                    stage = %stage,
                    post_id = post.id,
                    source_id = %post.source_id,
                    error = %reason,
                    "publish failed"
                );
                report.failed += 1;
            }
            Err(e) => {
                settle(
                    &pipeline.pool,
                    post,
                    from,
                    Err(e),
                    pipeline.settings.max_stage_attempts,
                    &mut report,
                )
                .await?;
            }
        }
    }
    Ok(report)
}

/// Publishes one post right away, outside a pass.
///
/// # Errors
///
/// Returns [`StageError::Conflict`] if the post is not `approved`, or
/// [`StageError::Db`] for database failures (including an unknown id).
pub async fn publish_post<P>(
    pool: &PgPool,
    settings: &PipelineSettings,
    publisher: &P,
    post_id: i64,
) -> Result<PublishOutcome, StageError>
where
    P: PlatformPublisher + Sync,
{
    let post = cm_db::get_post(pool, post_id).await?;
    if post.status != PostStatus::Approved.as_str() {
        return Err(StageError::Conflict(format!(
            "post {post_id} is {}, not approved",
            post.status
        )));
    }
    publish_approved(pool, settings, publisher, &post).await
}

/// Content problems mark the post failed here, so callers only see
/// conflicts and database errors.
async fn publish_approved<P>(
    pool: &PgPool,
    settings: &PipelineSettings,
    publisher: &P,
    post: &PostRow,
) -> Result<PublishOutcome, StageError>
where
    P: PlatformPublisher + Sync,
{
    match publish_pending_platforms(pool, settings, publisher, post).await {
        Err(StageError::Content(reason)) => {
            cm_db::mark_failed(pool, post.id, PostStatus::Approved, Stage::Publish, &reason)
                .await?;
            Ok(PublishOutcome::Failed { reason })
        }
        other => other,
    }
}

async fn publish_pending_platforms<P>(
    pool: &PgPool,
    settings: &PipelineSettings,
    publisher: &P,
    post: &PostRow,
) -> Result<PublishOutcome, StageError>
where
    P: PlatformPublisher + Sync,
{
    let targets = post
        .platforms()
        .map_err(|e| StageError::Content(e.to_string()))?;
    if targets.is_empty() {
        return Err(StageError::Content("post has no platform targets".to_string()));
    }

    let done = cm_db::succeeded_platforms(pool, post.id).await?;
    let pending: Vec<Platform> = targets.into_iter().filter(|p| !done.contains(p)).collect();
    if pending.is_empty() {
        cm_db::record_publish_outcome(pool, post.id, &[], &PublishOutcome::Published).await?;
        return Ok(PublishOutcome::Published);
    }

    let image_url = image_url(settings, post).await?;
    let requests = pending
        .iter()
        .map(|&platform| {
            caption_for(post, platform)
                .map(|caption| {
                    (
                        platform,
                        PublishRequest {
                            caption: caption.to_string(),
                            image_url: image_url.clone(),
                        },
                    )
                })
                .ok_or_else(|| StageError::Content(format!("no caption for {platform}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut logs = Vec::with_capacity(requests.len());
    let mut errors = Vec::new();
    for (platform, request) in &requests {
        match publisher.publish(*platform, request).await {
            Ok(receipt) => {
                tracing::info!(
                    post_id = post.id,
                    platform = %platform,
                    platform_post_id = %receipt.platform_post_id,
                    "published"
                );
                logs.push(NewPublishLog {
                    platform: *platform,
                    success: true,
                    platform_post_id: Some(receipt.platform_post_id),
                    platform_url: receipt.url,
                    error_message: None,
                });
            }
            Err(e) => {
                errors.push(format!("{platform}: {e}"));
                logs.push(NewPublishLog {
                    platform: *platform,
                    success: false,
                    platform_post_id: None,
                    platform_url: None,
                    error_message: Some(e.to_string()),
                });
            }
        }
    }

    let outcome = if errors.is_empty() {
        PublishOutcome::Published
    } else {
        PublishOutcome::Failed {
            reason: errors.join("; "),
        }
    };
    cm_db::record_publish_outcome(pool, post.id, &logs, &outcome).await?;
    Ok(outcome)
}

fn caption_for(post: &PostRow, platform: Platform) -> Option<&str> {
    let caption = match platform {
        Platform::Instagram => post.processed_caption.as_deref(),
        Platform::TikTok => post
            .short_caption
            .as_deref()
            .or(post.processed_caption.as_deref()),
    };
    caption.filter(|c| !c.trim().is_empty())
}

/// URL under which the platforms can fetch the post's image.
pub(crate) fn public_media_url(settings: &PipelineSettings, media_path: &str) -> Option<String> {
    let base = settings.media_public_base_url.as_deref()?;
    let relative = Path::new(media_path).strip_prefix(&settings.media_dir).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(format!("{base}/media/{}", parts.join("/")))
}

async fn image_url(settings: &PipelineSettings, post: &PostRow) -> Result<String, StageError> {
    if let Some(path) = post.media_path.as_deref() {
        if let Some(url) = public_media_url(settings, path) {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Err(StageError::Content(format!("media file {path} is missing")));
            }
            return Ok(url);
        }
    }
    post.media_source_url
        .clone()
        .ok_or_else(|| StageError::Content("post has no publicly reachable image".to_string()))
}
