//! Database operations for `posts`.
//!
//! Every write is guarded by the status (and optionally the `version`) the
//! caller last observed, so two processes acting on the same row can never
//! both succeed. A guard miss is reported as [`DbError::Conflict`] or
//! [`DbError::NotFound`], never as a silent no-op.
//!
//! `attempt_count` counts failures since the post last moved forward; every
//! forward write resets it.

use chrono::{DateTime, Utc};
use cm_core::{CoreError, Platform, PostStatus, Stage, StageContract};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const POST_COLUMNS: &str = "id, public_id, source_id, subreddit, permalink, source_url, author, \
     upvotes, num_comments, source_created_at, title, raw_text, processed_caption, \
     short_caption, keywords, hashtags, media_path, media_source, media_source_url, status, \
     failed_stage, platform_targets, error_message, attempt_count, version, created_at, \
     updated_at";

/// Statuses in which captions and platform targets may still be edited.
const EDITABLE_STATUSES: [PostStatus; 4] = [
    PostStatus::Processed,
    PostStatus::MediaReady,
    PostStatus::Approved,
    PostStatus::Failed,
];

// ---------------------------------------------------------------------------
// Row and input types
// ---------------------------------------------------------------------------

/// A row from the `posts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostRow {
    pub id: i64,
    pub public_id: Uuid,
    pub source_id: String,
    pub subreddit: String,
    pub permalink: String,
    pub source_url: Option<String>,
    pub author: Option<String>,
    pub upvotes: i32,
    pub num_comments: i32,
    pub source_created_at: Option<DateTime<Utc>>,
    pub title: String,
    pub raw_text: String,
    pub processed_caption: Option<String>,
    pub short_caption: Option<String>,
    pub keywords: Vec<String>,
    pub hashtags: Vec<String>,
    pub media_path: Option<String>,
    pub media_source: Option<String>,
    pub media_source_url: Option<String>,
    pub status: String,
    pub failed_stage: Option<String>,
    pub platform_targets: Vec<String>,
    pub error_message: Option<String>,
    pub attempt_count: i32,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostRow {
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownStatus`] if the stored value is not a known status.
    pub fn parsed_status(&self) -> Result<PostStatus, CoreError> {
        self.status.parse()
    }

    /// # Errors
    ///
    /// Returns [`CoreError::UnknownPlatform`] for an unrecognised target.
    pub fn platforms(&self) -> Result<Vec<Platform>, CoreError> {
        Platform::parse_list(&self.platform_targets)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::UnknownStage`] if the stored value is not a known stage.
    pub fn parsed_failed_stage(&self) -> Result<Option<Stage>, CoreError> {
        self.failed_stage.as_deref().map(str::parse).transpose()
    }
}

/// A freshly scraped post, before any stage has touched it.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub source_id: String,
    pub subreddit: String,
    pub permalink: String,
    pub source_url: Option<String>,
    pub author: Option<String>,
    pub upvotes: i32,
    pub num_comments: i32,
    pub source_created_at: Option<DateTime<Utc>>,
    pub title: String,
    pub raw_text: String,
}

/// Output of the processing stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedContent {
    pub processed_caption: String,
    pub short_caption: String,
    pub keywords: Vec<String>,
    pub hashtags: Vec<String>,
}

/// Output of the media stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAttachment {
    pub path: String,
    pub source: String,
    pub source_url: Option<String>,
}

/// Reviewer edits; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostEdit {
    pub processed_caption: Option<String>,
    pub short_caption: Option<String>,
    pub platform_targets: Option<Vec<Platform>>,
}

impl PostEdit {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processed_caption.is_none()
            && self.short_caption.is_none()
            && self.platform_targets.is_none()
    }

    fn target_names(&self) -> Option<Vec<String>> {
        self.platform_targets
            .as_ref()
            .map(|targets| targets.iter().map(|p| p.as_str().to_string()).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    #[must_use]
    pub fn target_status(self) -> PostStatus {
        match self {
            Decision::Approve => PostStatus::Approved,
            Decision::Reject => PostStatus::Rejected,
        }
    }
}

/// Per-id result of a bulk approve/reject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub updated: Vec<i64>,
    pub conflicts: Vec<i64>,
    pub not_found: Vec<i64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

fn status_names(statuses: &[PostStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// Explains why a guarded statement matched nothing.
async fn guard_miss(pool: &PgPool, id: i64, expected: &str) -> DbError {
    let current = sqlx::query_as::<_, (String, Option<String>, i32)>(
        "SELECT status, failed_stage, version FROM posts WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await;

    match current {
        Ok(Some((status, failed_stage, version))) => DbError::Conflict {
            id,
            expected: expected.to_string(),
            actual: match failed_stage {
                Some(stage) => format!("{status} ({stage}) at version {version}"),
                None => format!("{status} at version {version}"),
            },
        },
        Ok(None) => DbError::NotFound,
        Err(e) => DbError::Sqlx(e),
    }
}

fn describe_guard(statuses: &[PostStatus], expected_version: Option<i32>) -> String {
    let names = status_names(statuses).join("|");
    match expected_version {
        Some(v) => format!("{names} at version {v}"),
        None => names,
    }
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetches a single post by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if the query fails.
pub async fn get_post(pool: &PgPool, id: i64) -> Result<PostRow, DbError> {
    let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
    sqlx::query_as::<_, PostRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Lists posts in any of `statuses`, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_posts_by_status(
    pool: &PgPool,
    statuses: &[PostStatus],
    limit: i64,
) -> Result<Vec<PostRow>, DbError> {
    let sql = format!(
        "SELECT {POST_COLUMNS} FROM posts \
         WHERE status = ANY($1) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2"
    );
    let rows = sqlx::query_as::<_, PostRow>(&sql)
        .bind(status_names(statuses))
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Lists the posts a stage may act on.
///
/// Posts with fewer recorded failures come first, then the least recently
/// touched, so a post that keeps failing cannot hold the batch. Posts with
/// `max_attempts` or more failures in the current stage are left out. The
/// media stage additionally skips posts that already carry media.
///
/// # Errors
///
/// Returns [`DbError::NoPrecondition`] for the scrape stage, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn list_posts_for_stage(
    pool: &PgPool,
    contract: StageContract,
    limit: i64,
    max_attempts: i32,
) -> Result<Vec<PostRow>, DbError> {
    let precondition = contract
        .precondition
        .ok_or(DbError::NoPrecondition(contract.stage))?;
    let require_no_media = contract.stage == Stage::Media;

    let sql = format!(
        "SELECT {POST_COLUMNS} FROM posts \
         WHERE status = $1 AND ($2 = FALSE OR media_path IS NULL) AND attempt_count < $4 \
         ORDER BY attempt_count ASC, updated_at ASC, id ASC \
         LIMIT $3"
    );
    let rows = sqlx::query_as::<_, PostRow>(&sql)
        .bind(precondition.as_str())
        .bind(require_no_media)
        .bind(limit)
        .bind(max_attempts)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Returns the number of posts in each status that has at least one post.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_by_status(pool: &PgPool) -> Result<Vec<StatusCount>, DbError> {
    let rows = sqlx::query_as::<_, StatusCount>(
        "SELECT status, COUNT(*) AS count FROM posts GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Inserts a scraped post in `scraped` status.
///
/// Returns `None` when a post with the same `source_id` already exists.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_scraped_post(pool: &PgPool, post: &NewPost) -> Result<Option<PostRow>, DbError> {
    let sql = format!(
        "INSERT INTO posts \
             (public_id, source_id, subreddit, permalink, source_url, author, upvotes, \
              num_comments, source_created_at, title, raw_text, status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         ON CONFLICT (source_id) DO NOTHING \
         RETURNING {POST_COLUMNS}"
    );
    let row = sqlx::query_as::<_, PostRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(&post.source_id)
        .bind(&post.subreddit)
        .bind(&post.permalink)
        .bind(post.source_url.as_deref())
        .bind(post.author.as_deref())
        .bind(post.upvotes)
        .bind(post.num_comments)
        .bind(post.source_created_at)
        .bind(&post.title)
        .bind(&post.raw_text)
        .bind(PostStatus::Scraped.as_str())
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub(crate) fn ensure_edge(from: PostStatus, to: PostStatus) -> Result<(), DbError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(DbError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Stores processing output and moves the post `scraped → processed`.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if the post is no longer `scraped`.
pub async fn record_processed(
    pool: &PgPool,
    id: i64,
    content: &ProcessedContent,
) -> Result<PostRow, DbError> {
    let contract = Stage::Process.contract();
    let from = contract.precondition.ok_or(DbError::NoPrecondition(contract.stage))?;
    ensure_edge(from, contract.postcondition)?;

    let sql = format!(
        "UPDATE posts SET \
             status = $3, processed_caption = $4, short_caption = $5, \
             keywords = $6, hashtags = $7, error_message = NULL, attempt_count = 0, \
             version = version + 1, updated_at = NOW() \
         WHERE id = $1 AND status = $2 \
         RETURNING {POST_COLUMNS}"
    );
    match sqlx::query_as::<_, PostRow>(&sql)
        .bind(id)
        .bind(from.as_str())
        .bind(contract.postcondition.as_str())
        .bind(&content.processed_caption)
        .bind(&content.short_caption)
        .bind(&content.keywords)
        .bind(&content.hashtags)
        .fetch_optional(pool)
        .await?
    {
        Some(row) => Ok(row),
        None => Err(guard_miss(pool, id, from.as_str()).await),
    }
}

/// Attaches media and moves the post `processed → media_ready`.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if the post is no longer `processed` or
/// already carries media.
pub async fn record_media(
    pool: &PgPool,
    id: i64,
    media: &MediaAttachment,
) -> Result<PostRow, DbError> {
    let contract = Stage::Media.contract();
    let from = contract.precondition.ok_or(DbError::NoPrecondition(contract.stage))?;
    ensure_edge(from, contract.postcondition)?;

    let sql = format!(
        "UPDATE posts SET \
             status = $3, media_path = $4, media_source = $5, media_source_url = $6, \
             error_message = NULL, attempt_count = 0, version = version + 1, \
             updated_at = NOW() \
         WHERE id = $1 AND status = $2 AND media_path IS NULL \
         RETURNING {POST_COLUMNS}"
    );
    match sqlx::query_as::<_, PostRow>(&sql)
        .bind(id)
        .bind(from.as_str())
        .bind(contract.postcondition.as_str())
        .bind(&media.path)
        .bind(&media.source)
        .bind(media.source_url.as_deref())
        .fetch_optional(pool)
        .await?
    {
        Some(row) => Ok(row),
        None => Err(guard_miss(pool, id, "processed without media").await),
    }
}

/// Marks a post `failed`, remembering which stage failed it and why.
///
/// # Errors
///
/// Returns [`DbError::InvalidTransition`] if `from → failed` is not an edge,
/// or [`DbError::Conflict`] if the post is no longer in `from`.
pub async fn mark_failed(
    pool: &PgPool,
    id: i64,
    from: PostStatus,
    stage: Stage,
    reason: &str,
) -> Result<PostRow, DbError> {
    ensure_edge(from, PostStatus::Failed)?;

    let sql = format!(
        "UPDATE posts SET \
             status = $3, failed_stage = $4, error_message = $5, \
             attempt_count = attempt_count + 1, version = version + 1, updated_at = NOW() \
         WHERE id = $1 AND status = $2 \
         RETURNING {POST_COLUMNS}"
    );
    match sqlx::query_as::<_, PostRow>(&sql)
        .bind(id)
        .bind(from.as_str())
        .bind(PostStatus::Failed.as_str())
        .bind(stage.as_str())
        .bind(reason)
        .fetch_optional(pool)
        .await?
    {
        Some(row) => Ok(row),
        None => Err(guard_miss(pool, id, from.as_str()).await),
    }
}

/// Records a retriable failure without changing the status.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if the post is no longer in `expected`.
pub async fn record_stage_error(
    pool: &PgPool,
    id: i64,
    expected: PostStatus,
    reason: &str,
) -> Result<PostRow, DbError> {
    let sql = format!(
        "UPDATE posts SET \
             error_message = $3, attempt_count = attempt_count + 1, \
             version = version + 1, updated_at = NOW() \
         WHERE id = $1 AND status = $2 \
         RETURNING {POST_COLUMNS}"
    );
    match sqlx::query_as::<_, PostRow>(&sql)
        .bind(id)
        .bind(expected.as_str())
        .bind(reason)
        .fetch_optional(pool)
        .await?
    {
        Some(row) => Ok(row),
        None => Err(guard_miss(pool, id, expected.as_str()).await),
    }
}

/// Applies reviewer edits to captions and platform targets.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if the post is not editable or its version
/// differs from `expected_version`.
pub async fn update_post_content(
    pool: &PgPool,
    id: i64,
    edit: &PostEdit,
    expected_version: Option<i32>,
) -> Result<PostRow, DbError> {
    let sql = format!(
        "UPDATE posts SET \
             processed_caption = COALESCE($2, processed_caption), \
             short_caption = COALESCE($3, short_caption), \
             platform_targets = COALESCE($4, platform_targets), \
             version = version + 1, updated_at = NOW() \
         WHERE id = $1 AND status = ANY($5) AND ($6::INTEGER IS NULL OR version = $6) \
         RETURNING {POST_COLUMNS}"
    );
    match sqlx::query_as::<_, PostRow>(&sql)
        .bind(id)
        .bind(edit.processed_caption.as_deref())
        .bind(edit.short_caption.as_deref())
        .bind(edit.target_names())
        .bind(status_names(&EDITABLE_STATUSES))
        .bind(expected_version)
        .fetch_optional(pool)
        .await?
    {
        Some(row) => Ok(row),
        None => Err(guard_miss(pool, id, &describe_guard(&EDITABLE_STATUSES, expected_version)).await),
    }
}

/// Approves or rejects a reviewable post, applying `edit` in the same statement.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if the post is not awaiting review or its
/// version differs from `expected_version`, or [`DbError::NotFound`].
pub async fn decide_post(
    pool: &PgPool,
    id: i64,
    decision: Decision,
    edit: &PostEdit,
    expected_version: Option<i32>,
) -> Result<PostRow, DbError> {
    for from in PostStatus::REVIEWABLE {
        ensure_edge(from, decision.target_status())?;
    }

    let sql = format!(
        "UPDATE posts SET \
             status = $2, \
             processed_caption = COALESCE($3, processed_caption), \
             short_caption = COALESCE($4, short_caption), \
             platform_targets = COALESCE($5, platform_targets), \
             error_message = NULL, attempt_count = 0, version = version + 1, \
             updated_at = NOW() \
         WHERE id = $1 AND status = ANY($6) AND ($7::INTEGER IS NULL OR version = $7) \
         RETURNING {POST_COLUMNS}"
    );
    match sqlx::query_as::<_, PostRow>(&sql)
        .bind(id)
        .bind(decision.target_status().as_str())
        .bind(edit.processed_caption.as_deref())
        .bind(edit.short_caption.as_deref())
        .bind(edit.target_names())
        .bind(status_names(&PostStatus::REVIEWABLE))
        .bind(expected_version)
        .fetch_optional(pool)
        .await?
    {
        Some(row) => Ok(row),
        None => Err(guard_miss(
            pool,
            id,
            &describe_guard(&PostStatus::REVIEWABLE, expected_version),
        )
        .await),
    }
}

/// Approves or rejects each post independently.
///
/// A post that moved on or does not exist is reported, not fatal.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on the first database failure that is neither a
/// conflict nor a missing row.
pub async fn bulk_decide(
    pool: &PgPool,
    ids: &[i64],
    decision: Decision,
) -> Result<BulkOutcome, DbError> {
    let mut outcome = BulkOutcome::default();
    let no_edit = PostEdit::default();

    for &id in ids {
        match decide_post(pool, id, decision, &no_edit, None).await {
            Ok(_) => outcome.updated.push(id),
            Err(e @ DbError::Conflict { .. }) => {
                tracing::debug!(post_id = id, error = %e, "bulk decision skipped");
                outcome.conflicts.push(id);
            }
            Err(DbError::NotFound) => outcome.not_found.push(id),
            Err(e) => return Err(e),
        }
    }

    Ok(outcome)
}

/// Puts a post whose publishing failed back into `approved`.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if the post is not `failed` by the publish
/// stage or its version differs from `expected_version`.
pub async fn requeue_failed(
    pool: &PgPool,
    id: i64,
    expected_version: Option<i32>,
) -> Result<PostRow, DbError> {
    ensure_edge(PostStatus::Failed, PostStatus::Approved)?;

    let sql = format!(
        "UPDATE posts SET \
             status = $2, failed_stage = NULL, error_message = NULL, attempt_count = 0, \
             version = version + 1, updated_at = NOW() \
         WHERE id = $1 AND status = $3 AND failed_stage = $4 \
           AND ($5::INTEGER IS NULL OR version = $5) \
         RETURNING {POST_COLUMNS}"
    );
    match sqlx::query_as::<_, PostRow>(&sql)
        .bind(id)
        .bind(PostStatus::Approved.as_str())
        .bind(PostStatus::Failed.as_str())
        .bind(Stage::Publish.as_str())
        .bind(expected_version)
        .fetch_optional(pool)
        .await?
    {
        Some(row) => Ok(row),
        None => {
            let expected = match expected_version {
                Some(v) => format!("failed (publish) at version {v}"),
                None => "failed (publish)".to_string(),
            };
            Err(guard_miss(pool, id, &expected).await)
        }
    }
}

/// Deletes a rejected post.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if the post is not `rejected`.
pub async fn delete_rejected(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM posts WHERE id = $1 AND status = $2")
        .bind(id)
        .bind(PostStatus::Rejected.as_str())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(guard_miss(pool, id, PostStatus::Rejected.as_str()).await);
    }
    Ok(())
}
