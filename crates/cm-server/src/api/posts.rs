//! Read, edit and delete handlers for the review queue.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use cm_core::{Platform, PostStatus};
use cm_db::{PostEdit, PostRow, PublishLogRow};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState};

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct PostItem {
    id: i64,
    public_id: Uuid,
    source_id: String,
    subreddit: String,
    permalink: String,
    source_url: Option<String>,
    author: Option<String>,
    upvotes: i32,
    num_comments: i32,
    title: String,
    raw_text: String,
    processed_caption: Option<String>,
    short_caption: Option<String>,
    keywords: Vec<String>,
    hashtags: Vec<String>,
    media_path: Option<String>,
    media_source: Option<String>,
    media_source_url: Option<String>,
    status: String,
    failed_stage: Option<String>,
    platform_targets: Vec<String>,
    error_message: Option<String>,
    attempt_count: i32,
    version: i32,
    source_created_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PostRow> for PostItem {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            public_id: row.public_id,
            source_id: row.source_id,
            subreddit: row.subreddit,
            permalink: row.permalink,
            source_url: row.source_url,
            author: row.author,
            upvotes: row.upvotes,
            num_comments: row.num_comments,
            title: row.title,
            raw_text: row.raw_text,
            processed_caption: row.processed_caption,
            short_caption: row.short_caption,
            keywords: row.keywords,
            hashtags: row.hashtags,
            media_path: row.media_path,
            media_source: row.media_source,
            media_source_url: row.media_source_url,
            status: row.status,
            failed_stage: row.failed_stage,
            platform_targets: row.platform_targets,
            error_message: row.error_message,
            attempt_count: row.attempt_count,
            version: row.version,
            source_created_at: row.source_created_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct PublishLogItem {
    platform: String,
    success: bool,
    platform_post_id: Option<String>,
    platform_url: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<PublishLogRow> for PublishLogItem {
    fn from(row: PublishLogRow) -> Self {
        Self {
            platform: row.platform,
            success: row.success,
            platform_post_id: row.platform_post_id,
            platform_url: row.platform_url,
            error_message: row.error_message,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct PostDetail {
    #[serde(flatten)]
    post: PostItem,
    publish_logs: Vec<PublishLogItem>,
}

#[derive(Debug, Serialize)]
pub(super) struct StatusSummary {
    counts: Vec<StatusCountItem>,
    total: i64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(super) struct StatusCountItem {
    status: &'static str,
    count: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct DeletedPost {
    id: i64,
    deleted: bool,
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct ListPostsQuery {
    /// Comma-separated statuses; the review queue when absent.
    pub status: Option<String>,
    pub limit: Option<i64>,
}

/// Reviewer edits shared by `PATCH` and approve/reject.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct EditRequest {
    pub processed_caption: Option<String>,
    pub short_caption: Option<String>,
    pub platform_targets: Option<Vec<Platform>>,
    pub expected_version: Option<i32>,
}

impl EditRequest {
    /// Rejects blank captions and an empty target list.
    pub(super) fn to_edit(&self, req_id: &str) -> Result<PostEdit, ApiError> {
        for (field, value) in [
            ("processed_caption", &self.processed_caption),
            ("short_caption", &self.short_caption),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(ApiError::new(
                    req_id,
                    "validation_error",
                    format!("'{field}' must not be blank"),
                ));
            }
        }
        let platform_targets = match &self.platform_targets {
            Some(targets) if targets.is_empty() => {
                return Err(ApiError::new(
                    req_id,
                    "validation_error",
                    "'platform_targets' must name at least one platform",
                ));
            }
            Some(targets) => {
                let mut targets = targets.clone();
                targets.sort_by_key(|p| p.as_str());
                targets.dedup();
                Some(targets)
            }
            None => None,
        };

        Ok(PostEdit {
            processed_caption: self.processed_caption.clone(),
            short_caption: self.short_caption.clone(),
            platform_targets,
        })
    }
}

pub(super) fn parse_statuses(req_id: &str, raw: Option<&str>) -> Result<Vec<PostStatus>, ApiError> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Ok(PostStatus::REVIEWABLE.to_vec());
    };
    let mut statuses = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let status = name
            .parse::<PostStatus>()
            .map_err(|e| ApiError::new(req_id, "validation_error", e.to_string()))?;
        if !statuses.contains(&status) {
            statuses.push(status);
        }
    }
    Ok(statuses)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/posts
pub(super) async fn list_posts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<ApiResponse<Vec<PostItem>>>, ApiError> {
    let statuses = parse_statuses(&req_id.0, query.status.as_deref())?;
    let rows = cm_db::list_posts_by_status(&state.pool, &statuses, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows.into_iter().map(PostItem::from).collect();
    Ok(Json(ApiResponse::new(req_id.0, data)))
}

/// GET /api/v1/posts/summary: one count per status, zeros included.
pub(super) async fn post_summary(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<StatusSummary>>, ApiError> {
    let rows = cm_db::count_by_status(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let counts: Vec<StatusCountItem> = PostStatus::ALL
        .into_iter()
        .map(|status| StatusCountItem {
            status: status.as_str(),
            count: rows
                .iter()
                .find(|r| r.status == status.as_str())
                .map_or(0, |r| r.count),
        })
        .collect();
    let total = counts.iter().map(|c| c.count).sum();

    Ok(Json(ApiResponse::new(req_id.0, StatusSummary { counts, total })))
}

/// GET /api/v1/posts/{id}
pub(super) async fn get_post(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<PostDetail>>, ApiError> {
    let rid = &req_id.0;
    let post = cm_db::get_post(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let logs = cm_db::list_publish_logs(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let detail = PostDetail {
        post: PostItem::from(post),
        publish_logs: logs.into_iter().map(PublishLogItem::from).collect(),
    };
    Ok(Json(ApiResponse::new(req_id.0, detail)))
}

/// PATCH /api/v1/posts/{id}: edit captions and targets without deciding.
pub(super) async fn update_post(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<EditRequest>,
) -> Result<Json<ApiResponse<PostItem>>, ApiError> {
    let rid = &req_id.0;
    let edit = body.to_edit(rid)?;
    if edit.is_empty() {
        return Err(ApiError::new(rid, "validation_error", "nothing to update"));
    }

    let row = cm_db::update_post_content(&state.pool, id, &edit, body.expected_version)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    tracing::info!(post_id = id, version = row.version, "post edited");

    Ok(Json(ApiResponse::new(req_id.0, PostItem::from(row))))
}

/// DELETE /api/v1/posts/{id}: only rejected posts can be deleted.
pub(super) async fn delete_post(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<DeletedPost>>, ApiError> {
    cm_db::delete_rejected(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(post_id = id, "rejected post deleted");

    Ok(Json(ApiResponse::new(req_id.0, DeletedPost { id, deleted: true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_status_filter_means_the_review_queue() {
        assert_eq!(
            parse_statuses("r", None).unwrap(),
            vec![PostStatus::Processed, PostStatus::MediaReady]
        );
        assert_eq!(parse_statuses("r", Some(" ")).unwrap().len(), 2);
    }

    #[test]
    fn status_filter_is_parsed_and_deduplicated() {
        let statuses = parse_statuses("r", Some("approved, failed,approved")).unwrap();
        assert_eq!(statuses, vec![PostStatus::Approved, PostStatus::Failed]);
        assert!(parse_statuses("r", Some("approved,bogus")).is_err());
    }

    #[test]
    fn blank_caption_and_empty_targets_are_rejected() {
        let blank = EditRequest {
            short_caption: Some("   ".to_string()),
            ..EditRequest::default()
        };
        assert!(blank.to_edit("r").is_err());

        let no_targets = EditRequest {
            platform_targets: Some(Vec::new()),
            ..EditRequest::default()
        };
        assert!(no_targets.to_edit("r").is_err());
    }

    #[test]
    fn targets_are_deduplicated() {
        let request = EditRequest {
            platform_targets: Some(vec![Platform::TikTok, Platform::Instagram, Platform::TikTok]),
            ..EditRequest::default()
        };
        let edit = request.to_edit("r").unwrap();
        assert_eq!(
            edit.platform_targets,
            Some(vec![Platform::Instagram, Platform::TikTok])
        );
    }
}
