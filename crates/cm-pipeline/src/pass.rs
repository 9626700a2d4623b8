//! One pass over the selected stages, recorded as a pipeline run.

use std::future::Future;

use cm_core::Stage;
use cm_media::MediaLocator;
use cm_processor::CaptionGenerator;
use cm_publisher::PlatformPublisher;
use cm_scraper::PostSource;
use sqlx::PgPool;

use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use crate::report::{PassSummary, StageReport};

/// Which stages a pass runs. Always iterated in lifecycle order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageSelection {
    stages: Vec<Stage>,
}

impl StageSelection {
    #[must_use]
    pub fn new(stages: &[Stage]) -> Self {
        Self {
            stages: Stage::ORDERED
                .into_iter()
                .filter(|s| stages.contains(s))
                .collect(),
        }
    }

    /// Scrape, process and media; publish too when auto-publish is on.
    #[must_use]
    pub fn all(auto_publish: bool) -> Self {
        let mut stages = vec![Stage::Scrape, Stage::Process, Stage::Media];
        if auto_publish {
            stages.push(Stage::Publish);
        }
        Self::new(&stages)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    #[must_use]
    pub fn contains(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

/// What started a pass; stored on the run row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Cli,
    Daemon,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerSource::Cli => "cli",
            TriggerSource::Daemon => "daemon",
        }
    }
}

/// Anything that can run a pass; the daemon loop is written against this.
pub trait PassRunner {
    fn run_pass(
        &self,
        selection: &StageSelection,
        trigger: TriggerSource,
    ) -> impl Future<Output = Result<PassSummary, PipelineError>> + Send;
}

impl<S, G, M, P> PassRunner for Pipeline<S, G, M, P>
where
    S: PostSource + Sync,
    G: CaptionGenerator + Sync,
    M: MediaLocator + Sync,
    P: PlatformPublisher + Sync,
{
    /// Runs the selected stages in order. A stage that aborts is logged and
    /// recorded on the run; the remaining stages still run. Only a fatal
    /// database error ends the pass early.
    async fn run_pass(
        &self,
        selection: &StageSelection,
        trigger: TriggerSource,
    ) -> Result<PassSummary, PipelineError> {
        let run = cm_db::create_pipeline_run(&self.pool, trigger.as_str(), selection.stages())
            .await?;
        cm_db::start_pipeline_run(&self.pool, run.id).await?;
        tracing::info!(
            run_id = run.id,
            trigger = trigger.as_str(),
            stages = ?selection.stages(),
            "pass starting"
        );

        let mut summary = PassSummary {
            run_id: run.id,
            reports: Vec::new(),
            stage_errors: Vec::new(),
        };

        for &stage in selection.stages() {
            match self.run_stage(stage).await {
                Ok(report) => {
                    record_stage(&self.pool, run.id, &report, None).await?;
                    summary.reports.push(report);
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(run_id = run.id, stage = %stage, error = %e, "fatal error, ending pass");
                    fail_run_best_effort(&self.pool, &summary, &e.to_string()).await;
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(run_id = run.id, stage = %stage, error = %e, "stage aborted");
                    let report = StageReport::new(stage);
                    record_stage(&self.pool, run.id, &report, Some(e.to_string())).await?;
                    summary.reports.push(report);
                    summary.stage_errors.push((stage, e.to_string()));
                }
            }
        }

        let processed = to_i32(summary.total_processed());
        let failed = to_i32(summary.total_failed());
        if summary.stage_errors.is_empty() {
            cm_db::complete_pipeline_run(&self.pool, run.id, processed, failed).await?;
        } else {
            let message = summary
                .stage_errors
                .iter()
                .map(|(stage, error)| format!("{stage}: {error}"))
                .collect::<Vec<_>>()
                .join("; ");
            cm_db::fail_pipeline_run(&self.pool, run.id, processed, failed, &message).await?;
        }

        tracing::info!(
            run_id = run.id,
            processed,
            failed,
            stage_errors = summary.stage_errors.len(),
            "pass finished"
        );
        Ok(summary)
    }
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

async fn record_stage(
    pool: &PgPool,
    run_id: i64,
    report: &StageReport,
    error_message: Option<String>,
) -> Result<(), PipelineError> {
    match cm_db::record_run_stage(pool, run_id, &report.to_run_stage(error_message)).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_fatal() => Err(PipelineError::Db(e)),
        Err(e) => {
            tracing::warn!(run_id, stage = %report.stage, error = %e, "could not record stage result");
            Ok(())
        }
    }
}

/// Best effort: the database may be the reason the pass is failing.
async fn fail_run_best_effort(pool: &PgPool, summary: &PassSummary, message: &str) {
    if let Err(e) = cm_db::fail_pipeline_run(
        pool,
        summary.run_id,
        to_i32(summary.total_processed()),
        to_i32(summary.total_failed()),
        message,
    )
    .await
    {
        tracing::error!(run_id = summary.run_id, error = %e, "could not mark run failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_is_ordered_and_deduplicated() {
        let selection = StageSelection::new(&[Stage::Media, Stage::Scrape, Stage::Media]);
        assert_eq!(selection.stages(), &[Stage::Scrape, Stage::Media]);
    }

    #[test]
    fn all_includes_publish_only_with_auto_publish() {
        assert!(!StageSelection::all(false).contains(Stage::Publish));
        assert!(StageSelection::all(true).contains(Stage::Publish));
        assert_eq!(StageSelection::all(false).stages().len(), 3);
    }

    #[test]
    fn empty_selection() {
        assert!(StageSelection::new(&[]).is_empty());
        assert!(StageSelection::default().is_empty());
    }

    #[test]
    fn trigger_names_match_the_run_table() {
        assert_eq!(TriggerSource::Cli.as_str(), "cli");
        assert_eq!(TriggerSource::Daemon.as_str(), "daemon");
    }
}
