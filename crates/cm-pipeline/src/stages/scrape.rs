use cm_core::{Retriable, Stage};
use cm_db::NewPost;
use cm_scraper::{PostSource, ScrapedPost};

use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use crate::report::StageReport;

fn clamp_i32(value: i64) -> i32 {
    i32::try_from(value.max(0)).unwrap_or(i32::MAX)
}

pub(crate) fn to_new_post(post: ScrapedPost) -> NewPost {
    NewPost {
        source_id: post.source_id,
        subreddit: post.subreddit,
        permalink: post.permalink,
        source_url: post.url,
        author: post.author,
        upvotes: clamp_i32(post.upvotes),
        num_comments: clamp_i32(post.num_comments),
        source_created_at: post.created_at,
        title: post.title,
        raw_text: post.body,
    }
}

/// Fetches every configured subreddit and inserts new posts as `scraped`.
/// Posts already stored (same source id) are skipped.
pub(crate) async fn run<S, G, M, P>(
    pipeline: &Pipeline<S, G, M, P>,
) -> Result<StageReport, PipelineError>
where
    S: PostSource + Sync,
{
    let mut report = StageReport::new(Stage::Scrape);
    let subreddits = &pipeline.content.subreddits;
    let mut failed_subreddits = 0usize;
    let mut last_error = String::new();

    for subreddit in subreddits {
        let posts = match pipeline.source.fetch_subreddit(subreddit).await {
            Ok(posts) => posts,
            Err(e) => {
                tracing::warn!(
                    stage = %Stage::Scrape,
                    subreddit = %subreddit.name,
                    retriable = e.is_retriable(),
                    error = %e,
                    "subreddit fetch failed"
                );
                failed_subreddits += 1;
                last_error = format!("r/{}: {e}", subreddit.name);
                continue;
            }
        };

        for post in posts {
            let source_id = post.source_id.clone();
            match cm_db::insert_scraped_post(&pipeline.pool, &to_new_post(post)).await {
                Ok(Some(row)) => {
                    tracing::debug!(post_id = row.id, source_id = %source_id, "stored new post");
                    report.processed += 1;
                }
                Ok(None) => report.skipped += 1,
                Err(e) if e.is_fatal() => return Err(PipelineError::Db(e)),
                Err(e) => {
                    tracing::error!(
                        stage = %Stage::Scrape,
                        source_id = %source_id,
                        error = %e,
                        "could not store post"
                    );
                    report.failed += 1;
                }
            }
        }
    }

    if !subreddits.is_empty() && failed_subreddits == subreddits.len() {
        return Err(PipelineError::StageAborted {
            stage: Stage::Scrape,
            message: format!("every subreddit failed, last: {last_error}"),
        });
    }
    Ok(report)
}
