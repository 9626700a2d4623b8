//! Repeating passes with a fixed sleep between them.

use std::future::Future;
use std::time::Duration;

use crate::error::PipelineError;
use crate::pass::{PassRunner, StageSelection, TriggerSource};

/// Runs passes until `shutdown` resolves, sleeping `interval` after each one.
///
/// The interval is counted from the end of a pass, and `shutdown` is only
/// polled during the sleep, so a pass in flight always finishes. A pass that
/// fails is logged and the loop carries on; only a fatal database error ends
/// it early.
///
/// Returns the number of passes started.
///
/// # Errors
///
/// Returns the fatal [`PipelineError`] that stopped the loop.
pub async fn run_daemon<R, F>(
    runner: &R,
    selection: &StageSelection,
    interval: Duration,
    shutdown: F,
) -> Result<u64, PipelineError>
where
    R: PassRunner + Sync,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut passes = 0u64;

    loop {
        passes += 1;
        tracing::info!(pass = passes, "daemon pass starting");
        match runner.run_pass(selection, TriggerSource::Daemon).await {
            Ok(summary) => tracing::info!(
                pass = passes,
                run_id = summary.run_id,
                processed = summary.total_processed(),
                failed = summary.total_failed(),
                stage_errors = summary.stage_errors.len(),
                "daemon pass finished"
            ),
            Err(e) if e.is_fatal() => {
                tracing::error!(pass = passes, error = %e, "fatal error, stopping daemon");
                return Err(e);
            }
            Err(e) => tracing::error!(pass = passes, error = %e, "daemon pass failed"),
        }

        let next_run = chrono::Duration::from_std(interval)
            .ok()
            .and_then(|d| chrono::Utc::now().checked_add_signed(d));
        match next_run {
            Some(at) => tracing::info!(next_run = %at.to_rfc3339(), "sleeping until next pass"),
            None => tracing::info!(interval_secs = interval.as_secs(), "sleeping until next pass"),
        }

        tokio::select! {
            () = &mut shutdown => {
                tracing::info!(passes, "shutdown requested, daemon stopping");
                return Ok(passes);
            }
            () = tokio::time::sleep(interval) => {}
        }
    }
}
