use cm_core::Stage;
use cm_db::DbError;
use thiserror::Error;

/// Why a single post could not move through a stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// Network, timeout, 429 or 5xx from a vendor API. The post keeps its
    /// status and is tried again on the next pass.
    #[error("external API error: {0}")]
    ExternalApi(String),

    /// The post itself is unusable. It is marked `failed`.
    #[error("content error: {0}")]
    Content(String),

    /// The post's status changed underneath the stage.
    #[error("post changed concurrently: {0}")]
    Conflict(String),

    #[error(transparent)]
    Db(DbError),
}

impl From<DbError> for StageError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Conflict { .. } => StageError::Conflict(err.to_string()),
            other => StageError::Db(other),
        }
    }
}

/// Errors that stop a whole pass.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("stage {stage} aborted: {message}")]
    StageAborted { stage: Stage, message: String },
}

impl PipelineError {
    /// `true` when the database is unusable and the daemon should exit.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            PipelineError::Db(e) => e.is_fatal(),
            PipelineError::StageAborted { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_conflict_becomes_stage_conflict() {
        let err = StageError::from(DbError::Conflict {
            id: 4,
            expected: "scraped".to_string(),
            actual: "processed at version 2".to_string(),
        });
        assert!(matches!(err, StageError::Conflict(_)));
        assert!(matches!(StageError::from(DbError::NotFound), StageError::Db(_)));
    }

    #[test]
    fn pool_closed_is_fatal() {
        assert!(PipelineError::Db(DbError::Sqlx(sqlx::Error::PoolClosed)).is_fatal());
        assert!(!PipelineError::Db(DbError::NotFound).is_fatal());
        assert!(!PipelineError::StageAborted {
            stage: Stage::Scrape,
            message: "all subreddits failed".to_string(),
        }
        .is_fatal());
    }
}
