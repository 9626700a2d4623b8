use cm_core::Stage;
use cm_db::RunStageResult;

/// Per-stage counts for one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    /// Posts that reached the stage's postcondition (or were inserted, for scrape).
    pub processed: u32,
    /// Posts whose error was recorded or that were marked failed.
    pub failed: u32,
    /// Duplicates and posts that moved on concurrently.
    pub skipped: u32,
}

impl StageReport {
    #[must_use]
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            processed: 0,
            failed: 0,
            skipped: 0,
        }
    }

    #[must_use]
    pub fn to_run_stage(&self, error_message: Option<String>) -> RunStageResult {
        RunStageResult {
            stage: self.stage,
            processed: i32::try_from(self.processed).unwrap_or(i32::MAX),
            failed: i32::try_from(self.failed).unwrap_or(i32::MAX),
            error_message,
        }
    }
}

/// What a pass did, stage by stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub run_id: i64,
    pub reports: Vec<StageReport>,
    /// Stages that aborted, with their error.
    pub stage_errors: Vec<(Stage, String)>,
}

impl PassSummary {
    #[must_use]
    pub fn total_processed(&self) -> u32 {
        self.reports.iter().map(|r| r.processed).sum()
    }

    #[must_use]
    pub fn total_failed(&self) -> u32 {
        self.reports.iter().map(|r| r.failed).sum()
    }

    #[must_use]
    pub fn report(&self, stage: Stage) -> Option<&StageReport> {
        self.reports.iter().find(|r| r.stage == stage)
    }
}
