//! Database operations for `pipeline_runs` and `pipeline_run_stages`.

use chrono::{DateTime, Utc};
use cm_core::Stage;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `pipeline_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PipelineRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub trigger_source: String,
    pub status: String,
    pub stages: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub posts_processed: i32,
    pub posts_failed: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A row from the `pipeline_run_stages` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PipelineRunStageRow {
    pub id: i64,
    pub pipeline_run_id: i64,
    pub stage: String,
    pub status: String,
    pub processed: i32,
    pub failed: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What one stage of a pass reports back for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStageResult {
    pub stage: Stage,
    pub processed: i32,
    pub failed: i32,
    /// Set when the stage itself aborted, as opposed to individual posts failing.
    pub error_message: Option<String>,
}

const RUN_COLUMNS: &str = "id, public_id, trigger_source, status, stages, started_at, \
     completed_at, posts_processed, posts_failed, error_message, created_at";

// ---------------------------------------------------------------------------
// pipeline_runs operations
// ---------------------------------------------------------------------------

/// Creates a new pipeline run in `queued` status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_pipeline_run(
    pool: &PgPool,
    trigger_source: &str,
    stages: &[Stage],
) -> Result<PipelineRunRow, DbError> {
    let stage_names: Vec<String> = stages.iter().map(|s| s.as_str().to_string()).collect();
    let sql = format!(
        "INSERT INTO pipeline_runs (public_id, trigger_source, status, stages) \
         VALUES ($1, $2, 'queued', $3) \
         RETURNING {RUN_COLUMNS}"
    );

    let row = sqlx::query_as::<_, PipelineRunRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(trigger_source)
        .bind(stage_names)
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Marks a run as `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not `queued`.
pub async fn start_pipeline_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE pipeline_runs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "queued",
        });
    }

    Ok(())
}

/// Marks a run as `succeeded` with its post totals.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not `running`.
pub async fn complete_pipeline_run(
    pool: &PgPool,
    id: i64,
    posts_processed: i32,
    posts_failed: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE pipeline_runs \
         SET status = 'succeeded', completed_at = NOW(), \
             posts_processed = $2, posts_failed = $3 \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .bind(posts_processed)
    .bind(posts_failed)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run as `failed` with its post totals and the reason.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not `running`.
pub async fn fail_pipeline_run(
    pool: &PgPool,
    id: i64,
    posts_processed: i32,
    posts_failed: i32,
    error_message: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE pipeline_runs \
         SET status = 'failed', completed_at = NOW(), \
             posts_processed = $2, posts_failed = $3, error_message = $4 \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .bind(posts_processed)
    .bind(posts_failed)
    .bind(error_message)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`.
pub async fn get_pipeline_run(pool: &PgPool, id: i64) -> Result<PipelineRunRow, DbError> {
    let sql = format!("SELECT {RUN_COLUMNS} FROM pipeline_runs WHERE id = $1");
    sqlx::query_as::<_, PipelineRunRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Returns the most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pipeline_runs(pool: &PgPool, limit: i64) -> Result<Vec<PipelineRunRow>, DbError> {
    let sql = format!(
        "SELECT {RUN_COLUMNS} FROM pipeline_runs \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1"
    );
    let rows = sqlx::query_as::<_, PipelineRunRow>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// pipeline_run_stages operations
// ---------------------------------------------------------------------------

/// Inserts or replaces the per-stage result row for a run.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn record_run_stage(
    pool: &PgPool,
    run_id: i64,
    result: &RunStageResult,
) -> Result<(), DbError> {
    let status = if result.error_message.is_some() {
        "failed"
    } else {
        "succeeded"
    };

    sqlx::query(
        "INSERT INTO pipeline_run_stages \
             (pipeline_run_id, stage, status, processed, failed, error_message) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (pipeline_run_id, stage) DO UPDATE SET \
             status        = EXCLUDED.status, \
             processed     = EXCLUDED.processed, \
             failed        = EXCLUDED.failed, \
             error_message = EXCLUDED.error_message",
    )
    .bind(run_id)
    .bind(result.stage.as_str())
    .bind(status)
    .bind(result.processed)
    .bind(result.failed)
    .bind(result.error_message.as_deref())
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns the stage rows for a run in execution order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pipeline_run_stages(
    pool: &PgPool,
    run_id: i64,
) -> Result<Vec<PipelineRunStageRow>, DbError> {
    let rows = sqlx::query_as::<_, PipelineRunStageRow>(
        "SELECT id, pipeline_run_id, stage, status, processed, failed, \
                error_message, created_at \
         FROM pipeline_run_stages \
         WHERE pipeline_run_id = $1 \
         ORDER BY id ASC",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
