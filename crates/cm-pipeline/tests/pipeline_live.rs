//! End-to-end stage tests against a live database, with fake vendors.
//!
//! Each test gets a fresh, fully-migrated Postgres database from the sqlx
//! test harness; `"../../migrations"` is relative to `crates/cm-pipeline/`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use cm_core::{
    CaptionLimits, ContentConfig, Platform, PostStatus, Stage, SubredditConfig, TimeFilter,
};
use cm_db::{Decision, PostEdit};
use cm_media::{FoundMedia, MediaError, MediaLocator, MediaProvider, MediaSource};
use cm_pipeline::{
    publish_post, PassRunner, Pipeline, PipelineSettings, StageError, StageSelection,
    TriggerSource,
};
use cm_processor::{
    CaptionGenerator, ClaudeClient, GeneratedCaptions, Processor, ProcessorError, ProcessorInput,
};
use cm_publisher::{PlatformPublisher, PublishError, PublishReceipt, PublishRequest};
use cm_scraper::{PostSource, ScrapedPost, ScraperError};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct FakeSource {
    posts: Vec<ScrapedPost>,
    fail: bool,
}

impl PostSource for FakeSource {
    async fn fetch_subreddit(
        &self,
        subreddit: &SubredditConfig,
    ) -> Result<Vec<ScrapedPost>, ScraperError> {
        if self.fail {
            return Err(ScraperError::NotFound {
                url: format!("https://reddit.test/r/{}", subreddit.name),
            });
        }
        Ok(self.posts.clone())
    }
}

struct FakeMedia {
    found: bool,
    /// Keyword fragment no image ever matches.
    unfindable: Option<&'static str>,
}

impl FakeMedia {
    fn found() -> Self {
        Self {
            found: true,
            unfindable: None,
        }
    }
}

impl MediaLocator for FakeMedia {
    async fn locate(&self, keywords: &[String]) -> Result<Option<FoundMedia>, MediaError> {
        if !self.found {
            return Ok(None);
        }
        if let Some(fragment) = self.unfindable {
            if keywords.iter().any(|k| k.contains(fragment)) {
                return Ok(None);
            }
        }
        let name = keywords.first().map_or("image", String::as_str);
        Ok(Some(FoundMedia {
            path: PathBuf::from(format!("./media/images/unsplash_{name}.jpg")),
            source: MediaSource::Provider(MediaProvider::Unsplash),
            source_url: Some(format!("https://images.test/{name}.jpg")),
        }))
    }
}

/// Always answers like an overloaded LLM.
struct OverloadedCaptions;

impl CaptionGenerator for OverloadedCaptions {
    async fn generate(&self, _input: &ProcessorInput) -> Result<GeneratedCaptions, ProcessorError> {
        Err(ProcessorError::Api {
            status: 529,
            message: "overloaded".to_string(),
        })
    }
}

#[derive(Default)]
struct FakePublisher {
    failing: Vec<Platform>,
    calls: Mutex<Vec<Platform>>,
}

impl FakePublisher {
    fn failing(platforms: &[Platform]) -> Self {
        Self {
            failing: platforms.to_vec(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<Platform> {
        self.calls.lock().unwrap().clone()
    }
}

impl PlatformPublisher for FakePublisher {
    async fn publish(
        &self,
        platform: Platform,
        request: &PublishRequest,
    ) -> Result<PublishReceipt, PublishError> {
        assert!(!request.caption.is_empty());
        assert!(request.image_url.starts_with("https://images.test/"));
        self.calls.lock().unwrap().push(platform);
        if self.failing.contains(&platform) {
            return Err(PublishError::Api {
                platform,
                status: 400,
                message: "media rejected".to_string(),
            });
        }
        Ok(PublishReceipt {
            platform_post_id: format!("{platform}-1"),
            url: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn content() -> ContentConfig {
    let mut categories = BTreeMap::new();
    categories.insert(
        "learning".to_string(),
        vec!["#TIL".to_string(), "#DidYouKnow".to_string()],
    );
    ContentConfig {
        subreddits: vec![SubredditConfig {
            name: "todayilearned".to_string(),
            min_upvotes: 1000,
            limit: 25,
            time_filter: TimeFilter::Day,
            category: Some("learning".to_string()),
        }],
        categories,
        default_category: "learning".to_string(),
        captions: CaptionLimits::default(),
    }
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        batch_size: 50,
        max_stage_attempts: 3,
        media_dir: PathBuf::from("./media"),
        media_public_base_url: None,
    }
}

fn scraped_post(id: &str, title: &str, body: &str) -> ScrapedPost {
    ScrapedPost {
        source_id: id.to_string(),
        subreddit: "todayilearned".to_string(),
        title: title.to_string(),
        body: body.to_string(),
        permalink: format!("/r/todayilearned/comments/{id}/til/"),
        url: None,
        author: Some("curious".to_string()),
        upvotes: 5000,
        num_comments: 120,
        created_at: None,
        over_18: false,
        stickied: false,
    }
}

type TestPipeline = Pipeline<FakeSource, ClaudeClient, FakeMedia, FakePublisher>;

fn pipeline(pool: &PgPool, posts: Vec<ScrapedPost>, publisher: FakePublisher) -> TestPipeline {
    Pipeline::new(
        pool.clone(),
        content(),
        settings(),
        FakeSource { posts, fail: false },
        Processor::new(None, content()),
        FakeMedia::found(),
        publisher,
    )
}

fn octopus_posts() -> Vec<ScrapedPost> {
    vec![
        scraped_post("p1", "TIL octopuses have three hearts", "Two pump blood to the gills."),
        scraped_post("p2", "", "   "),
        scraped_post("p3", "TIL honey never spoils", "Archaeologists found edible honey."),
    ]
}

async fn status_of(pool: &PgPool, source_id: &str) -> String {
    sqlx::query_scalar::<_, String>("SELECT status FROM posts WHERE source_id = $1")
        .bind(source_id)
        .fetch_one(pool)
        .await
        .expect("post should exist")
}

async fn id_of(pool: &PgPool, source_id: &str) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT id FROM posts WHERE source_id = $1")
        .bind(source_id)
        .fetch_one(pool)
        .await
        .expect("post should exist")
}

/// Scrapes one good post, captions it, attaches media and approves it.
async fn approved_post(pipeline: &TestPipeline) -> i64 {
    for stage in [Stage::Scrape, Stage::Process, Stage::Media] {
        pipeline.run_stage(stage).await.expect("stage failed");
    }
    let id = id_of(pipeline.pool(), "p1").await;
    cm_db::decide_post(pipeline.pool(), id, Decision::Approve, &PostEdit::default(), None)
        .await
        .expect("approve failed");
    id
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn scraping_twice_stores_each_post_once(pool: PgPool) {
    let posts = vec![scraped_post("dup1", "TIL something", "body")];
    let pipeline = pipeline(&pool, posts, FakePublisher::default());

    let first = pipeline.run_stage(Stage::Scrape).await.unwrap();
    let second = pipeline.run_stage(Stage::Scrape).await.unwrap();

    assert_eq!(first.processed, 1);
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 1);
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE source_id = 'dup1'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn failing_scrape_aborts_only_its_stage(pool: PgPool) {
    let pipeline = Pipeline::new(
        pool.clone(),
        content(),
        settings(),
        FakeSource {
            posts: Vec::new(),
            fail: true,
        },
        Processor::<ClaudeClient>::new(None, content()),
        FakeMedia::found(),
        FakePublisher::default(),
    );

    let err = pipeline.run_stage(Stage::Scrape).await.unwrap_err();
    assert!(!err.is_fatal());
    assert!(err.to_string().contains("every subreddit failed"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn empty_post_fails_without_stopping_the_batch(pool: PgPool) {
    let pipeline = pipeline(&pool, octopus_posts(), FakePublisher::default());
    pipeline.run_stage(Stage::Scrape).await.unwrap();

    let report = pipeline.run_stage(Stage::Process).await.unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(status_of(&pool, "p1").await, "processed");
    assert_eq!(status_of(&pool, "p3").await, "processed");
    assert_eq!(status_of(&pool, "p2").await, "failed");

    let failed = cm_db::get_post(&pool, id_of(&pool, "p2").await).await.unwrap();
    assert_eq!(failed.failed_stage.as_deref(), Some("process"));
    assert!(failed.error_message.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn reprocessing_leaves_captions_untouched(pool: PgPool) {
    let pipeline = pipeline(&pool, octopus_posts(), FakePublisher::default());
    pipeline.run_stage(Stage::Scrape).await.unwrap();
    pipeline.run_stage(Stage::Process).await.unwrap();
    let id = id_of(&pool, "p1").await;
    let before = cm_db::get_post(&pool, id).await.unwrap();

    let report = pipeline.run_stage(Stage::Process).await.unwrap();

    let after = cm_db::get_post(&pool, id).await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(after.processed_caption, before.processed_caption);
    assert_eq!(after.version, before.version);
    assert!(after.processed_caption.unwrap().contains("Source: Reddit r/todayilearned"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn media_stage_marks_posts_ready(pool: PgPool) {
    let pipeline = pipeline(&pool, octopus_posts(), FakePublisher::default());
    pipeline.run_stage(Stage::Scrape).await.unwrap();
    pipeline.run_stage(Stage::Process).await.unwrap();

    let report = pipeline.run_stage(Stage::Media).await.unwrap();

    assert_eq!(report.processed, 2);
    let post = cm_db::get_post(&pool, id_of(&pool, "p1").await).await.unwrap();
    assert_eq!(post.status, "media_ready");
    assert_eq!(post.media_source.as_deref(), Some("unsplash"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn missing_media_keeps_the_post_processed(pool: PgPool) {
    let pipeline = Pipeline::new(
        pool.clone(),
        content(),
        settings(),
        FakeSource {
            posts: octopus_posts(),
            fail: false,
        },
        Processor::<ClaudeClient>::new(None, content()),
        FakeMedia {
            found: false,
            unfindable: None,
        },
        FakePublisher::default(),
    );
    pipeline.run_stage(Stage::Scrape).await.unwrap();
    pipeline.run_stage(Stage::Process).await.unwrap();

    let report = pipeline.run_stage(Stage::Media).await.unwrap();

    assert_eq!(report.failed, 2);
    let post = cm_db::get_post(&pool, id_of(&pool, "p1").await).await.unwrap();
    assert_eq!(post.status, "processed");
    assert_eq!(post.attempt_count, 1);
    assert!(post.error_message.unwrap().contains("no image found"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn post_without_image_does_not_hold_back_newer_posts(pool: PgPool) {
    let pipeline = Pipeline::new(
        pool.clone(),
        content(),
        PipelineSettings {
            batch_size: 1,
            ..settings()
        },
        FakeSource {
            posts: octopus_posts(),
            fail: false,
        },
        Processor::<ClaudeClient>::new(None, content()),
        FakeMedia {
            found: true,
            unfindable: Some("octopus"),
        },
        FakePublisher::default(),
    );
    pipeline.run_stage(Stage::Scrape).await.unwrap();
    for _ in 0..3 {
        pipeline.run_stage(Stage::Process).await.unwrap();
    }
    assert_eq!(status_of(&pool, "p1").await, "processed");
    assert_eq!(status_of(&pool, "p3").await, "processed");

    let mut reports = Vec::new();
    for _ in 0..5 {
        reports.push(pipeline.run_stage(Stage::Media).await.unwrap());
    }

    assert_eq!(status_of(&pool, "p3").await, "media_ready");
    let stuck = cm_db::get_post(&pool, id_of(&pool, "p1").await).await.unwrap();
    assert_eq!(stuck.status, "processed");
    assert_eq!(stuck.attempt_count, 3);

    // p1, p3, p1, p1 (cap reached), then nothing left to try.
    let processed: Vec<u32> = reports.iter().map(|r| r.processed).collect();
    let failed: Vec<u32> = reports.iter().map(|r| r.failed).collect();
    assert_eq!(processed, vec![0, 1, 0, 0, 0]);
    assert_eq!(failed, vec![1, 0, 1, 1, 0]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn repeated_caption_outages_eventually_fail_the_post(pool: PgPool) {
    let posts = vec![scraped_post("p1", "TIL octopuses have three hearts", "Two pump blood.")];
    let pipeline = Pipeline::new(
        pool.clone(),
        content(),
        settings(),
        FakeSource { posts, fail: false },
        Processor::new(Some(OverloadedCaptions), content()),
        FakeMedia::found(),
        FakePublisher::default(),
    );
    pipeline.run_stage(Stage::Scrape).await.unwrap();
    let id = id_of(&pool, "p1").await;

    for attempt in 1..=2 {
        let report = pipeline.run_stage(Stage::Process).await.unwrap();
        assert_eq!(report.failed, 1);
        let post = cm_db::get_post(&pool, id).await.unwrap();
        assert_eq!(post.status, "scraped");
        assert_eq!(post.attempt_count, attempt);
    }

    pipeline.run_stage(Stage::Process).await.unwrap();
    let post = cm_db::get_post(&pool, id).await.unwrap();
    assert_eq!(post.status, "failed");
    assert_eq!(post.failed_stage.as_deref(), Some("process"));
    assert!(post.error_message.unwrap().starts_with("gave up after 3 attempts"));

    let report = pipeline.run_stage(Stage::Process).await.unwrap();
    assert_eq!(report.processed + report.failed, 0);
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn nothing_is_published_without_approval(pool: PgPool) {
    let pipeline = pipeline(&pool, octopus_posts(), FakePublisher::default());
    for stage in [Stage::Scrape, Stage::Process, Stage::Media] {
        pipeline.run_stage(stage).await.unwrap();
    }

    let report = pipeline.run_stage(Stage::Publish).await.unwrap();

    assert_eq!(report.processed, 0);
    assert!(pipeline.publisher().calls().is_empty());
    let err = publish_post(&pool, &settings(), &FakePublisher::default(), id_of(&pool, "p1").await)
        .await
        .unwrap_err();
    assert!(matches!(err, StageError::Conflict(_)));
}

#[sqlx::test(migrations = "../../migrations")]
async fn approved_post_is_published_to_every_target(pool: PgPool) {
    let pipeline = pipeline(&pool, octopus_posts(), FakePublisher::default());
    let id = approved_post(&pipeline).await;

    let report = pipeline.run_stage(Stage::Publish).await.unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(status_of(&pool, "p1").await, "published");
    assert_eq!(pipeline.publisher().calls(), vec![Platform::Instagram, Platform::TikTok]);
    let logs = cm_db::list_publish_logs(&pool, id).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|l| l.success));
}

#[sqlx::test(migrations = "../../migrations")]
async fn requeued_post_only_republishes_missing_platforms(pool: PgPool) {
    let failing = pipeline(
        &pool,
        octopus_posts(),
        FakePublisher::failing(&[Platform::TikTok]),
    );
    let id = approved_post(&failing).await;

    let report = failing.run_stage(Stage::Publish).await.unwrap();
    assert_eq!(report.failed, 1);
    let post = cm_db::get_post(&pool, id).await.unwrap();
    assert_eq!(post.status, PostStatus::Failed.as_str());
    assert_eq!(post.failed_stage.as_deref(), Some("publish"));

    cm_db::requeue_failed(&pool, id, None).await.unwrap();
    let publisher = FakePublisher::default();
    let outcome = publish_post(&pool, &settings(), &publisher, id).await.unwrap();

    assert_eq!(outcome, cm_db::PublishOutcome::Published);
    assert_eq!(publisher.calls(), vec![Platform::TikTok]);
    assert_eq!(status_of(&pool, "p1").await, "published");
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn pass_records_a_run_with_one_row_per_stage(pool: PgPool) {
    let pipeline = pipeline(&pool, octopus_posts(), FakePublisher::default());
    let selection = StageSelection::all(false);

    let summary = pipeline
        .run_pass(&selection, TriggerSource::Cli)
        .await
        .unwrap();

    assert!(summary.stage_errors.is_empty());
    assert_eq!(summary.report(Stage::Scrape).unwrap().processed, 3);
    assert_eq!(summary.report(Stage::Process).unwrap().failed, 1);
    assert_eq!(summary.report(Stage::Media).unwrap().processed, 2);

    let run = cm_db::get_pipeline_run(&pool, summary.run_id).await.unwrap();
    assert_eq!(run.status, "succeeded");
    assert_eq!(run.trigger_source, "cli");
    let stages = cm_db::list_pipeline_run_stages(&pool, summary.run_id).await.unwrap();
    let names: Vec<&str> = stages.iter().map(|s| s.stage.as_str()).collect();
    assert_eq!(names, vec!["scrape", "process", "media"]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn aborted_stage_fails_the_run_but_later_stages_still_run(pool: PgPool) {
    let pipeline = pipeline(&pool, octopus_posts(), FakePublisher::default());
    pipeline.run_stage(Stage::Scrape).await.unwrap();
    let broken = Pipeline::new(
        pool.clone(),
        content(),
        settings(),
        FakeSource {
            posts: Vec::new(),
            fail: true,
        },
        Processor::<ClaudeClient>::new(None, content()),
        FakeMedia::found(),
        FakePublisher::default(),
    );

    let summary = broken
        .run_pass(&StageSelection::new(&[Stage::Scrape, Stage::Process]), TriggerSource::Daemon)
        .await
        .unwrap();

    assert_eq!(summary.stage_errors.len(), 1);
    assert_eq!(summary.stage_errors[0].0, Stage::Scrape);
    assert_eq!(summary.report(Stage::Process).unwrap().processed, 2);
    let run = cm_db::get_pipeline_run(&pool, summary.run_id).await.unwrap();
    assert_eq!(run.status, "failed");
    assert!(run.error_message.unwrap().contains("scrape"));
}
