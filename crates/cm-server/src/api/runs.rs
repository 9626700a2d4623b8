use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use cm_db::{PipelineRunRow, PipelineRunStageRow};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct RunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct RunStageItem {
    stage: String,
    status: String,
    processed: i32,
    failed: i32,
    error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct RunItem {
    run_id: Uuid,
    trigger_source: String,
    status: String,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    posts_processed: i32,
    posts_failed: i32,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    stages: Vec<RunStageItem>,
}

impl RunItem {
    fn new(row: PipelineRunRow, stages: Vec<PipelineRunStageRow>) -> Self {
        Self {
            run_id: row.public_id,
            trigger_source: row.trigger_source,
            status: row.status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            posts_processed: row.posts_processed,
            posts_failed: row.posts_failed,
            error_message: row.error_message,
            created_at: row.created_at,
            stages: stages
                .into_iter()
                .map(|s| RunStageItem {
                    stage: s.stage,
                    status: s.status,
                    processed: s.processed,
                    failed: s.failed,
                    error_message: s.error_message,
                })
                .collect(),
        }
    }
}

/// GET /api/v1/runs: newest first, with per-stage results.
pub(super) async fn list_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<ApiResponse<Vec<RunItem>>>, ApiError> {
    let rows = cm_db::list_pipeline_runs(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let mut data = Vec::with_capacity(rows.len());
    for row in rows {
        let stages = cm_db::list_pipeline_run_stages(&state.pool, row.id)
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
        data.push(RunItem::new(row, stages));
    }

    Ok(Json(ApiResponse::new(req_id.0, data)))
}
