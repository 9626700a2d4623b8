mod validator;

use std::time::Duration;

use clap::Parser;
use cm_core::{AppConfig, LogFormat, Stage};
use cm_pipeline::{
    run_daemon, DefaultPipeline, PassRunner, PassSummary, StageSelection, TriggerSource,
};
use tracing_subscriber::EnvFilter;

use crate::validator::Validator;

#[derive(Debug, Parser)]
#[command(name = "content-machine")]
#[command(about = "Turns Reddit posts into reviewed Instagram and TikTok content")]
struct Cli {
    /// Scrape, process and find media (and publish when CM_AUTO_PUBLISH=true)
    #[arg(long)]
    all: bool,
    /// Fetch new posts from the configured subreddits
    #[arg(long)]
    scrape: bool,
    /// Write captions, keywords and hashtags for scraped posts
    #[arg(long)]
    process: bool,
    /// Attach an image to processed posts
    #[arg(long)]
    media: bool,
    /// Publish approved posts
    #[arg(long)]
    publish: bool,
    /// Start the validator web server
    #[arg(long)]
    validate: bool,
    /// Repeat the selected stages until interrupted
    #[arg(long)]
    daemon: bool,
    /// Seconds between the end of one pass and the start of the next
    #[arg(long, requires = "daemon", value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    /// One pass, then exit (after the validator, if started, exits).
    Once,
    Daemon { interval_secs: u64 },
    /// Only the validator; no stages.
    ValidateOnly,
}

impl Cli {
    fn selection(&self, auto_publish: bool) -> StageSelection {
        let mut stages = Vec::new();
        if self.all {
            stages.extend_from_slice(StageSelection::all(auto_publish).stages());
        }
        for (flag, stage) in [
            (self.scrape, Stage::Scrape),
            (self.process, Stage::Process),
            (self.media, Stage::Media),
            (self.publish, Stage::Publish),
        ] {
            if flag {
                stages.push(stage);
            }
        }
        StageSelection::new(&stages)
    }

    fn mode(&self, selection: &StageSelection, default_interval_secs: u64) -> anyhow::Result<Mode> {
        if self.daemon {
            if selection.is_empty() {
                anyhow::bail!(
                    "--daemon needs at least one stage (--all, --scrape, --process, --media or --publish)"
                );
            }
            return Ok(Mode::Daemon {
                interval_secs: self.interval.unwrap_or(default_interval_secs),
            });
        }
        if !selection.is_empty() {
            return Ok(Mode::Once);
        }
        if self.validate {
            return Ok(Mode::ValidateOnly);
        }
        anyhow::bail!("nothing to do; pass --all, a stage flag, or --validate (see --help)")
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = cm_core::load_app_config()?;
    init_tracing(&config)?;

    let selection = cli.selection(config.auto_publish);
    let mode = cli.mode(&selection, config.pipeline_interval_secs)?;
    tracing::info!(stages = ?selection.stages(), ?mode, validate = cli.validate, "starting");

    let pool_config = cm_db::PoolConfig::from_app_config(&config);
    let pool = cm_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = cm_db::run_migrations(&pool).await?;
    if applied > 0 {
        tracing::info!(applied, "database migrations applied");
    }

    let mut validator = if cli.validate {
        Some(Validator::spawn(&config)?)
    } else {
        None
    };

    let result = match mode {
        Mode::ValidateOnly => Ok(()),
        Mode::Once => {
            let content = cm_core::load_content_config(&config.content_path)?;
            let pipeline = DefaultPipeline::from_app_config(pool.clone(), &config, content)?;
            run_once(&pipeline, &selection).await
        }
        Mode::Daemon { interval_secs } => {
            let content = cm_core::load_content_config(&config.content_path)?;
            let pipeline = DefaultPipeline::from_app_config(pool.clone(), &config, content)?;
            tracing::info!(interval_secs, "daemon starting");
            let passes = run_daemon(
                &pipeline,
                &selection,
                Duration::from_secs(interval_secs),
                shutdown_signal(),
            )
            .await;
            match passes {
                Ok(passes) => {
                    tracing::info!(passes, "daemon stopped");
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
    };

    if let Some(validator) = validator.as_mut() {
        if matches!(mode, Mode::Daemon { .. }) {
            validator.stop().await;
        } else {
            validator.wait_or_shutdown(shutdown_signal()).await;
        }
    }

    pool.close().await;
    result
}

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(env_filter).init(),
    }
    Ok(())
}

async fn run_once<R: PassRunner + Sync>(
    runner: &R,
    selection: &StageSelection,
) -> anyhow::Result<()> {
    let summary = runner.run_pass(selection, TriggerSource::Cli).await?;
    print_summary(&summary);
    if !summary.stage_errors.is_empty() {
        anyhow::bail!(
            "{} stage(s) aborted; see run {}",
            summary.stage_errors.len(),
            summary.run_id
        );
    }
    Ok(())
}

fn print_summary(summary: &PassSummary) {
    println!("Run {}", summary.run_id);
    println!("{:<10} {:>9} {:>7} {:>8}", "stage", "processed", "failed", "skipped");
    for report in &summary.reports {
        println!(
            "{:<10} {:>9} {:>7} {:>8}",
            report.stage.as_str(),
            report.processed,
            report.failed,
            report.skipped
        );
    }
    for (stage, error) in &summary.stage_errors {
        println!("{stage} aborted: {error}");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal");
}
