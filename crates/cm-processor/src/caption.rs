//! Template captions and the length fitting shared with LLM output.

use cm_core::CaptionLimits;

use crate::text::truncate_chars;

/// Short captions keep at least this much headline before hashtags are
/// dropped to make room.
const MIN_SHORT_HEADLINE_CHARS: usize = 40;

fn category_emoji(category: Option<&str>) -> &'static str {
    match category {
        Some("learning") => "💡",
        Some("science") => "🔬",
        Some("history") => "📜",
        Some("tech") => "💻",
        Some("nature") => "🌿",
        Some("art") => "🎨",
        Some("food") => "🍽️",
        Some("travel") => "✈️",
        Some("fitness") => "💪",
        Some("motivation") => "🔥",
        _ => "✨",
    }
}

/// `main` followed by `tail`, with `main` cut so the whole fits in `max_chars`.
fn fit(main: &str, tail: &str, max_chars: usize) -> String {
    let tail_len = tail.chars().count();
    if main.chars().count() + tail_len <= max_chars {
        return format!("{main}{tail}");
    }
    if tail_len >= max_chars {
        return truncate_chars(main, max_chars);
    }
    format!("{}{tail}", truncate_chars(main, max_chars - tail_len))
}

fn long_tail(subreddit: &str, hashtags: &[String], limits: &CaptionLimits) -> String {
    let mut tail = format!("\n\nSource: Reddit r/{subreddit}");
    let tags: Vec<&str> = hashtags
        .iter()
        .take(limits.instagram_max_hashtags)
        .map(String::as_str)
        .collect();
    if !tags.is_empty() {
        tail.push_str("\n\n");
        tail.push_str(&tags.join(" "));
    }
    tail
}

/// Builds the long-form caption from cleaned post text:
/// emoji and title, a body excerpt, the source line, then hashtags.
#[must_use]
pub fn format_long_caption(
    title: &str,
    body: &str,
    subreddit: &str,
    category: Option<&str>,
    hashtags: &[String],
    limits: &CaptionLimits,
) -> String {
    let mut main = format!("{} {title}", category_emoji(category));
    if !body.is_empty() {
        main.push_str("\n\n");
        main.push_str(&truncate_chars(body, limits.body_excerpt_chars));
    }
    finish_long_caption(&main, subreddit, hashtags, limits)
}

/// Appends the source line and hashtags to an already written caption and
/// fits the result to the long-form limit.
#[must_use]
pub fn finish_long_caption(
    text: &str,
    subreddit: &str,
    hashtags: &[String],
    limits: &CaptionLimits,
) -> String {
    let tail = long_tail(subreddit, hashtags, limits);
    fit(text.trim(), &tail, limits.instagram_max_chars)
}

/// Builds the short-form caption: headline on the first line, a few hashtags
/// on the second. Hashtags are dropped from the end when the headline would
/// otherwise be cut below a readable length.
#[must_use]
pub fn format_short_caption(headline: &str, hashtags: &[String], limits: &CaptionLimits) -> String {
    let headline = headline.trim();
    let mut tags: Vec<&str> = hashtags
        .iter()
        .take(limits.tiktok_caption_hashtags)
        .map(String::as_str)
        .collect();

    loop {
        let tag_line = tags.join(" ");
        let reserved = if tag_line.is_empty() {
            0
        } else {
            tag_line.chars().count() + 1
        };
        let budget = limits.tiktok_max_chars.saturating_sub(reserved);
        let fits = headline.chars().count() <= budget;

        if fits || budget >= MIN_SHORT_HEADLINE_CHARS || tags.is_empty() {
            let head = truncate_chars(headline, budget);
            return match (head.is_empty(), tag_line.is_empty()) {
                (_, true) => head,
                (true, false) => tag_line,
                (false, false) => format!("{head}\n{tag_line}"),
            };
        }
        tags.pop();
    }
}
