//! Listing filters applied before anything is stored.

use std::collections::HashSet;

use cm_core::SubredditConfig;

use crate::types::ScrapedPost;

/// `true` if the post is worth storing for this subreddit.
#[must_use]
pub fn passes_filters(post: &ScrapedPost, subreddit: &SubredditConfig) -> bool {
    !post.over_18
        && !post.stickied
        && post.upvotes >= subreddit.min_upvotes
        && !post.title.trim().is_empty()
        && !post.source_id.is_empty()
}

/// Drops filtered posts and repeated ids, keeping listing order.
#[must_use]
pub fn filter_posts(posts: Vec<ScrapedPost>, subreddit: &SubredditConfig) -> Vec<ScrapedPost> {
    let mut seen = HashSet::new();
    posts
        .into_iter()
        .filter(|p| passes_filters(p, subreddit))
        .filter(|p| seen.insert(p.source_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_core::TimeFilter;

    fn subreddit(min_upvotes: i64) -> SubredditConfig {
        SubredditConfig {
            name: "todayilearned".to_string(),
            min_upvotes,
            limit: 50,
            time_filter: TimeFilter::Day,
            category: None,
        }
    }

    fn post(id: &str, upvotes: i64) -> ScrapedPost {
        ScrapedPost {
            source_id: id.to_string(),
            subreddit: "todayilearned".to_string(),
            title: format!("TIL {id}"),
            body: String::new(),
            permalink: format!("/r/todayilearned/comments/{id}/"),
            url: None,
            author: None,
            upvotes,
            num_comments: 0,
            created_at: None,
            over_18: false,
            stickied: false,
        }
    }

    #[test]
    fn drops_posts_below_min_upvotes() {
        let kept = filter_posts(vec![post("a", 999), post("b", 1000)], &subreddit(1000));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].source_id, "b");
    }

    #[test]
    fn drops_nsfw_and_stickied() {
        let mut nsfw = post("nsfw", 5000);
        nsfw.over_18 = true;
        let mut pinned = post("pinned", 5000);
        pinned.stickied = true;
        let kept = filter_posts(vec![nsfw, pinned, post("ok", 5000)], &subreddit(10));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].source_id, "ok");
    }

    #[test]
    fn drops_blank_titles() {
        let mut blank = post("blank", 5000);
        blank.title = "   ".to_string();
        assert!(!passes_filters(&blank, &subreddit(0)));
    }

    #[test]
    fn dedups_within_a_listing() {
        let kept = filter_posts(vec![post("a", 10), post("a", 10)], &subreddit(0));
        assert_eq!(kept.len(), 1);
    }
}
