//! Decision handlers: approve, reject, bulk decisions, requeue and
//! publish-now.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};
use cm_db::{BulkOutcome, Decision, PublishOutcome};
use cm_pipeline::StageError;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::posts::{EditRequest, PostItem};
use super::{map_db_error, optional_body, ApiError, ApiResponse, AppState, MAX_BULK_IDS};

#[derive(Debug, Deserialize)]
pub(super) struct BulkRequest {
    pub ids: Vec<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct RequeueRequest {
    pub expected_version: Option<i32>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(super) struct BulkResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    approved: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejected: Option<Vec<i64>>,
    conflicts: Vec<i64>,
    not_found: Vec<i64>,
}

impl BulkResult {
    fn new(decision: Decision, outcome: BulkOutcome) -> Self {
        let (approved, rejected) = match decision {
            Decision::Approve => (Some(outcome.updated), None),
            Decision::Reject => (None, Some(outcome.updated)),
        };
        Self {
            approved,
            rejected,
            conflicts: outcome.conflicts,
            not_found: outcome.not_found,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct PublishResult {
    outcome: &'static str,
    reason: Option<String>,
    post: PostItem,
}

async fn decide(
    state: &AppState,
    req_id: &str,
    id: i64,
    decision: Decision,
    body: &EditRequest,
) -> Result<PostItem, ApiError> {
    let edit = body.to_edit(req_id)?;
    let row = cm_db::decide_post(&state.pool, id, decision, &edit, body.expected_version)
        .await
        .map_err(|e| map_db_error(req_id.to_owned(), &e))?;
    tracing::info!(post_id = id, status = %row.status, edited = !edit.is_empty(), "post decided");
    Ok(PostItem::from(row))
}

/// POST /api/v1/posts/{id}/approve
pub(super) async fn approve_post(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    body: Result<Option<Json<EditRequest>>, JsonRejection>,
) -> Result<Json<ApiResponse<PostItem>>, ApiError> {
    let body = optional_body(&req_id.0, body)?;
    let post = decide(&state, &req_id.0, id, Decision::Approve, &body).await?;
    Ok(Json(ApiResponse::new(req_id.0, post)))
}

/// POST /api/v1/posts/{id}/reject
pub(super) async fn reject_post(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    body: Result<Option<Json<EditRequest>>, JsonRejection>,
) -> Result<Json<ApiResponse<PostItem>>, ApiError> {
    let body = optional_body(&req_id.0, body)?;
    let post = decide(&state, &req_id.0, id, Decision::Reject, &body).await?;
    Ok(Json(ApiResponse::new(req_id.0, post)))
}

async fn bulk_decide(
    state: &AppState,
    req_id: &str,
    decision: Decision,
    body: &BulkRequest,
) -> Result<BulkResult, ApiError> {
    if body.ids.is_empty() || body.ids.len() > MAX_BULK_IDS {
        return Err(ApiError::new(
            req_id,
            "validation_error",
            format!("'ids' must hold between 1 and {MAX_BULK_IDS} post ids"),
        ));
    }
    let mut ids = body.ids.clone();
    ids.sort_unstable();
    ids.dedup();

    let outcome = cm_db::bulk_decide(&state.pool, &ids, decision)
        .await
        .map_err(|e| map_db_error(req_id.to_owned(), &e))?;
    tracing::info!(
        decision = ?decision,
        updated = outcome.updated.len(),
        conflicts = outcome.conflicts.len(),
        not_found = outcome.not_found.len(),
        "bulk decision applied"
    );
    Ok(BulkResult::new(decision, outcome))
}

/// POST /api/v1/posts/bulk/approve
pub(super) async fn bulk_approve(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<BulkRequest>,
) -> Result<Json<ApiResponse<BulkResult>>, ApiError> {
    let result = bulk_decide(&state, &req_id.0, Decision::Approve, &body).await?;
    Ok(Json(ApiResponse::new(req_id.0, result)))
}

/// POST /api/v1/posts/bulk/reject
pub(super) async fn bulk_reject(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<BulkRequest>,
) -> Result<Json<ApiResponse<BulkResult>>, ApiError> {
    let result = bulk_decide(&state, &req_id.0, Decision::Reject, &body).await?;
    Ok(Json(ApiResponse::new(req_id.0, result)))
}

/// POST /api/v1/posts/{id}/requeue: `failed` (publish) back to `approved`.
pub(super) async fn requeue_post(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    body: Result<Option<Json<RequeueRequest>>, JsonRejection>,
) -> Result<Json<ApiResponse<PostItem>>, ApiError> {
    let body: RequeueRequest = optional_body(&req_id.0, body)?;
    let row = cm_db::requeue_failed(&state.pool, id, body.expected_version)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(post_id = id, "post requeued for publishing");
    Ok(Json(ApiResponse::new(req_id.0, PostItem::from(row))))
}

/// POST /api/v1/posts/{id}/publish: runs the publisher for one approved post.
pub(super) async fn publish_post(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<PublishResult>>, ApiError> {
    let rid = &req_id.0;
    let outcome = cm_pipeline::publish_post(&state.pool, &state.settings, state.publisher.as_ref(), id)
        .await
        .map_err(|e| map_stage_error(rid, &e))?;

    let (label, reason) = match outcome {
        PublishOutcome::Published => ("published", None),
        PublishOutcome::Failed { reason } => ("failed", Some(reason)),
    };
    tracing::info!(post_id = id, outcome = label, "publish requested from the validator");

    let row = cm_db::get_post(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok(Json(ApiResponse::new(
        req_id.0,
        PublishResult {
            outcome: label,
            reason,
            post: PostItem::from(row),
        },
    )))
}

fn map_stage_error(req_id: &str, error: &StageError) -> ApiError {
    match error {
        StageError::Db(e) => map_db_error(req_id.to_owned(), e),
        StageError::Conflict(message) => ApiError::new(req_id, "conflict", message.clone()),
        StageError::Content(message) => ApiError::new(req_id, "validation_error", message.clone()),
        StageError::ExternalApi(message) => {
            tracing::error!(error = %message, "publish failed");
            ApiError::new(req_id, "internal_error", "publishing failed")
        }
    }
}
