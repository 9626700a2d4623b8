use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

use cm_core::{CaptionLimits, ContentConfig, SubredditConfig, TimeFilter};

use super::*;

enum Reply {
    Captions(GeneratedCaptions),
    Overloaded,
    BadRequest,
}

struct FakeGenerator {
    reply: Reply,
    calls: AtomicU32,
}

impl FakeGenerator {
    fn new(reply: Reply) -> Self {
        Self {
            reply,
            calls: AtomicU32::new(0),
        }
    }
}

impl CaptionGenerator for FakeGenerator {
    async fn generate(&self, _input: &ProcessorInput) -> Result<GeneratedCaptions, ProcessorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Reply::Captions(c) => Ok(c.clone()),
            Reply::Overloaded => Err(ProcessorError::Api {
                status: 529,
                message: "overloaded".to_string(),
            }),
            Reply::BadRequest => Err(ProcessorError::Api {
                status: 400,
                message: "bad request".to_string(),
            }),
        }
    }
}

fn content() -> ContentConfig {
    let mut categories = BTreeMap::new();
    categories.insert(
        "learning".to_string(),
        vec!["#DidYouKnow".to_string(), "#TodayILearned".to_string()],
    );
    categories.insert("science".to_string(), vec!["#Science".to_string()]);
    ContentConfig {
        subreddits: vec![SubredditConfig {
            name: "science".to_string(),
            min_upvotes: 1000,
            limit: 25,
            time_filter: TimeFilter::Day,
            category: Some("science".to_string()),
        }],
        categories,
        default_category: "learning".to_string(),
        captions: CaptionLimits::default(),
    }
}

fn input(title: &str, body: &str) -> ProcessorInput {
    ProcessorInput {
        title: title.to_string(),
        body: body.to_string(),
        subreddit: "todayilearned".to_string(),
        category: None,
    }
}

fn template_only() -> Processor<FakeGenerator> {
    Processor::new(None, content())
}

#[tokio::test]
async fn template_captions_without_generator() {
    let processed = template_only()
        .process(&input(
            "TIL octopuses have three hearts",
            "Octopuses pump blue blood with copper. See https://example.com",
        ))
        .await
        .unwrap();

    assert_eq!(processed.caption_source, CaptionSource::Template);
    assert!(processed.long_caption.contains("TIL octopuses have three hearts"));
    assert!(processed.long_caption.contains("Source: Reddit r/todayilearned"));
    assert!(!processed.long_caption.contains("https://"));
    assert!(processed.short_caption.starts_with("TIL octopuses have three hearts\n"));
    assert_eq!(processed.keywords[0], "octopuses");
    assert_eq!(processed.hashtags[0], "#DidYouKnow");
    assert!(processed.hashtags.contains(&"#Octopuses".to_string()));
}

#[tokio::test]
async fn subreddit_category_selects_hashtags() {
    let mut post = input("New particle observed", "Physicists observed a particle.");
    post.subreddit = "Science".to_string();
    let processed = template_only().process(&post).await.unwrap();
    assert_eq!(processed.hashtags[0], "#Science");
    assert!(processed.long_caption.starts_with("🔬 "));
}

#[tokio::test]
async fn empty_post_is_a_content_error() {
    let err = template_only()
        .process(&input("   ", "https://only-a-link.example"))
        .await
        .unwrap_err();
    assert!(err.is_content_error());
}

#[tokio::test]
async fn body_only_post_uses_body_as_headline() {
    let processed = template_only()
        .process(&input("", "Honey never spoils when sealed."))
        .await
        .unwrap();
    assert!(processed.short_caption.starts_with("Honey never spoils"));
}

#[tokio::test]
async fn generator_captions_are_fitted_and_tagged() {
    let generator = FakeGenerator::new(Reply::Captions(GeneratedCaptions {
        instagram_caption: "Three hearts, blue blood.".to_string(),
        tiktok_caption: "x".repeat(400),
        hashtags: vec!["octopus".to_string(), "#MarineLife".to_string()],
    }));
    let processor = Processor::new(Some(generator), content());
    let processed = processor
        .process(&input("TIL octopuses have three hearts", ""))
        .await
        .unwrap();

    assert_eq!(processed.caption_source, CaptionSource::Llm);
    assert!(processed.long_caption.starts_with("Three hearts, blue blood."));
    assert_eq!(processed.hashtags[..2], ["#octopus", "#MarineLife"]);
    let limits = CaptionLimits::default();
    assert!(processed.short_caption.chars().count() <= limits.tiktok_max_chars);
}

#[tokio::test]
async fn transient_generator_error_is_returned() {
    let processor = Processor::new(Some(FakeGenerator::new(Reply::Overloaded)), content());
    let err = processor
        .process(&input("TIL something", "body"))
        .await
        .unwrap_err();
    assert!(err.is_retriable());
}

#[tokio::test]
async fn permanent_generator_error_falls_back_to_template() {
    let processor = Processor::new(Some(FakeGenerator::new(Reply::BadRequest)), content());
    let processed = processor
        .process(&input("TIL something", "body"))
        .await
        .unwrap();
    assert_eq!(processed.caption_source, CaptionSource::Template);
    assert_eq!(
        processor
            .generator
            .as_ref()
            .map(|g| g.calls.load(Ordering::SeqCst)),
        Some(1)
    );
}

#[tokio::test]
async fn processing_is_deterministic_for_templates() {
    let processor = template_only();
    let post = input("TIL honey never spoils", "Archaeologists found edible honey.");
    let first = processor.process(&post).await.unwrap();
    let second = processor.process(&post).await.unwrap();
    assert_eq!(first, second);
}
