//! Text cleanup applied to titles and bodies before anything else sees them.

use std::sync::LazyLock;

use regex::Regex;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+|www\.\S+").expect("valid regex"));
static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)[@/]?u/\w+|@\w+").expect("valid regex"));
static MARKDOWN_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
static DISALLOWED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s.,!?'\-:;()%]").expect("valid regex"));
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Strips links, user mentions and markup, keeps basic punctuation, and
/// collapses whitespace.
#[must_use]
pub fn clean_text(raw: &str) -> String {
    let text = MARKDOWN_LINK_RE.replace_all(raw, "$1");
    let text = URL_RE.replace_all(&text, "");
    let text = MENTION_RE.replace_all(&text, " ");
    let text = DISALLOWED_RE.replace_all(&text, "");
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

/// Truncates to at most `max_chars` characters, ending in `...` when cut.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return ".".repeat(max_chars);
    }
    let kept: String = text.chars().take(max_chars - 3).collect();
    format!("{}...", kept.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_links_and_mentions() {
        let cleaned = clean_text("See https://example.com/x?y=1 via @someone and u/other now");
        assert_eq!(cleaned, "See via and now");
    }

    #[test]
    fn keeps_markdown_link_text() {
        assert_eq!(
            clean_text("Read [the article](https://example.com) today"),
            "Read the article today"
        );
    }

    #[test]
    fn strips_symbols_but_keeps_punctuation() {
        assert_eq!(
            clean_text("Wow!!  *this*   is #great, isn't it?"),
            "Wow!! this is great, isn't it?"
        );
    }

    #[test]
    fn empty_and_whitespace_become_empty() {
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text("  \n\t "), "");
        assert_eq!(clean_text("https://only-a-link.example"), "");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 8), "héllo...");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "...");
    }
}
