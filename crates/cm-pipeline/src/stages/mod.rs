//! The four stages. Each takes its batch from the stage contract, handles
//! posts one at a time, and records per-post failures on the post.

pub(crate) mod media;
pub(crate) mod process;
pub(crate) mod publish;
pub(crate) mod scrape;

use cm_core::{PostStatus, Stage};
use cm_db::PostRow;
use sqlx::PgPool;

use crate::error::{PipelineError, StageError};
use crate::report::StageReport;

/// Applies the failure-isolation rules to one post's result and updates the
/// report. Only a fatal database error escapes.
///
/// A retriable failure that reaches `max_attempts` marks the post failed
/// where the lifecycle allows it; otherwise the post is left where it is and
/// drops out of the stage's selection.
pub(crate) async fn settle(
    pool: &PgPool,
    post: &PostRow,
    from: PostStatus,
    result: Result<(), StageError>,
    max_attempts: i32,
    report: &mut StageReport,
) -> Result<(), PipelineError> {
    let stage = report.stage;
    let err = match result {
        Ok(()) => {
            report.processed += 1;
            return Ok(());
        }
        Err(err) => err,
    };

    let recorded = match err {
        StageError::Conflict(detail) => {
            tracing::debug!(stage = %stage, post_id = post.id, %detail, "post moved on, skipping");
            report.skipped += 1;
            return Ok(());
        }
        StageError::Content(reason) => {
            tracing::warn!(
                stage = %stage,
                post_id = post.id,
                source_id = %post.source_id,
                error = %reason,
                "post failed"
            );
            cm_db::mark_failed(pool, post.id, from, stage, &reason).await
        }
        StageError::ExternalApi(reason) => {
            tracing::warn!(
                stage = %stage,
                post_id = post.id,
                source_id = %post.source_id,
                error = %reason,
                "post will be retried next pass"
            );
            match cm_db::record_stage_error(pool, post.id, from, &reason).await {
                Ok(row) if row.attempt_count >= max_attempts => {
                    give_up(pool, &row, from, stage, &reason).await
                }
                other => other,
            }
        }
        StageError::Db(e) if e.is_fatal() => return Err(PipelineError::Db(e)),
        StageError::Db(e) => {
            tracing::error!(stage = %stage, post_id = post.id, error = %e, "database error");
            report.failed += 1;
            return Ok(());
        }
    };
    report.failed += 1;

    match recorded {
        Ok(_) => Ok(()),
        Err(e) if e.is_fatal() => Err(PipelineError::Db(e)),
        Err(e) => {
            tracing::debug!(
                stage = %stage,
                post_id = post.id,
                error = %e,
                "could not record the failure"
            );
            Ok(())
        }
    }
}

/// Stops retrying a post whose retriable failures hit the cap.
async fn give_up(
    pool: &PgPool,
    post: &PostRow,
    from: PostStatus,
    stage: Stage,
    reason: &str,
) -> Result<PostRow, cm_db::DbError> {
    if !from.can_transition_to(PostStatus::Failed) {
        tracing::warn!(
            stage = %stage,
            post_id = post.id,
            attempts = post.attempt_count,
            "retries exhausted, post left for review"
        );
        return Ok(post.clone());
    }

    tracing::warn!(
        stage = %stage,
        post_id = post.id,
        attempts = post.attempt_count,
        "retries exhausted, marking post failed"
    );
    let reason = format!("gave up after {} attempts: {reason}", post.attempt_count);
    cm_db::mark_failed(pool, post.id, from, stage, &reason).await
}

/// Status a stage selects its posts by.
pub(crate) fn precondition(stage: Stage) -> Result<PostStatus, PipelineError> {
    stage
        .contract()
        .precondition
        .ok_or(PipelineError::Db(cm_db::DbError::NoPrecondition(stage)))
}
