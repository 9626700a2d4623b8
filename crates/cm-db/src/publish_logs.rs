//! Database operations for `publish_logs`, the per-platform publish audit trail.

use chrono::{DateTime, Utc};
use cm_core::{Platform, PostStatus, Stage};
use sqlx::PgPool;

use crate::posts::ensure_edge;
use crate::DbError;

/// A row from the `publish_logs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PublishLogRow {
    pub id: i64,
    pub post_id: i64,
    pub platform: String,
    pub success: bool,
    pub platform_post_id: Option<String>,
    pub platform_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPublishLog {
    pub platform: Platform,
    pub success: bool,
    pub platform_post_id: Option<String>,
    pub platform_url: Option<String>,
    pub error_message: Option<String>,
}

/// Final state of one publish attempt over all target platforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    Failed { reason: String },
}

/// Returns every publish attempt for a post, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_publish_logs(pool: &PgPool, post_id: i64) -> Result<Vec<PublishLogRow>, DbError> {
    let rows = sqlx::query_as::<_, PublishLogRow>(
        "SELECT id, post_id, platform, success, platform_post_id, platform_url, \
                error_message, created_at \
         FROM publish_logs \
         WHERE post_id = $1 \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(post_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Platforms a post has already been published to successfully.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or
/// [`DbError::UnknownValue`] for an unrecognised stored platform.
pub async fn succeeded_platforms(pool: &PgPool, post_id: i64) -> Result<Vec<Platform>, DbError> {
    let names = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT platform FROM publish_logs \
         WHERE post_id = $1 AND success = TRUE \
         ORDER BY platform",
    )
    .bind(post_id)
    .fetch_all(pool)
    .await?;
    Ok(Platform::parse_list(&names)?)
}

/// Writes the attempt logs and the post's new status in one transaction.
///
/// `Published` moves `approved → published`; `Failed` moves
/// `approved → failed` with `failed_stage = publish`. If the post left
/// `approved` meanwhile its status is left alone, but the logs are still
/// written: they describe what the platforms already did, and a later
/// republish relies on them to skip platforms that succeeded.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if the post is no longer `approved`,
/// [`DbError::NotFound`] if it was deleted, or [`DbError::Sqlx`] if any
/// statement fails.
pub async fn record_publish_outcome(
    pool: &PgPool,
    post_id: i64,
    logs: &[NewPublishLog],
    outcome: &PublishOutcome,
) -> Result<(), DbError> {
    let target = match outcome {
        PublishOutcome::Published => PostStatus::Published,
        PublishOutcome::Failed { .. } => PostStatus::Failed,
    };
    ensure_edge(PostStatus::Approved, target)?;

    let mut tx = pool.begin().await?;

    let result = match outcome {
        PublishOutcome::Published => {
            sqlx::query(
                "UPDATE posts SET status = $3, error_message = NULL, \
                     version = version + 1, updated_at = NOW() \
                 WHERE id = $1 AND status = $2",
            )
            .bind(post_id)
            .bind(PostStatus::Approved.as_str())
            .bind(PostStatus::Published.as_str())
            .execute(&mut *tx)
            .await?
        }
        PublishOutcome::Failed { reason } => {
            sqlx::query(
                "UPDATE posts SET status = $3, failed_stage = $4, error_message = $5, \
                     attempt_count = attempt_count + 1, version = version + 1, \
                     updated_at = NOW() \
                 WHERE id = $1 AND status = $2",
            )
            .bind(post_id)
            .bind(PostStatus::Approved.as_str())
            .bind(PostStatus::Failed.as_str())
            .bind(Stage::Publish.as_str())
            .bind(reason)
            .execute(&mut *tx)
            .await?
        }
    };

    if result.rows_affected() == 1 {
        insert_logs(&mut tx, post_id, logs).await?;
        tx.commit().await?;
        return Ok(());
    }

    let actual = sqlx::query_scalar::<_, String>("SELECT status FROM posts WHERE id = $1")
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(actual) = actual else {
        tx.rollback().await?;
        for log in logs.iter().filter(|log| log.success) {
            tracing::warn!(
                post_id,
                platform = %log.platform,
                platform_post_id = log.platform_post_id.as_deref().unwrap_or(""),
                "post deleted while publishing; successful publish not logged"
            );
        }
        return Err(DbError::NotFound);
    };

    insert_logs(&mut tx, post_id, logs).await?;
    tx.commit().await?;
    Err(DbError::Conflict {
        id: post_id,
        expected: PostStatus::Approved.as_str().to_string(),
        actual,
    })
}

async fn insert_logs(
    conn: &mut sqlx::PgConnection,
    post_id: i64,
    logs: &[NewPublishLog],
) -> Result<(), DbError> {
    for log in logs {
        sqlx::query(
            "INSERT INTO publish_logs \
                 (post_id, platform, success, platform_post_id, platform_url, error_message) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(post_id)
        .bind(log.platform.as_str())
        .bind(log.success)
        .bind(log.platform_post_id.as_deref())
        .bind(log.platform_url.as_deref())
        .bind(log.error_message.as_deref())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}
