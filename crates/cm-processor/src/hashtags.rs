//! Hashtag generation from keywords and category hashtags.

use std::collections::HashSet;

/// Turns a keyword or phrase into a hashtag: `"black hole"` → `#BlackHole`.
///
/// Returns `None` when nothing alphanumeric is left.
#[must_use]
pub fn to_hashtag(keyword: &str) -> Option<String> {
    let body: String = keyword
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();

    if body.is_empty() {
        None
    } else {
        Some(format!("#{body}"))
    }
}

/// Category hashtags first, then keyword hashtags, deduplicated
/// case-insensitively and capped at `max`.
#[must_use]
pub fn generate_hashtags(keywords: &[String], category_tags: &[String], max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    category_tags
        .iter()
        .cloned()
        .chain(keywords.iter().filter_map(|k| to_hashtag(k)))
        .filter(|tag| seen.insert(tag.to_lowercase()))
        .take(max)
        .collect()
}

/// Normalises hashtags coming from outside (LLM replies, reviewer edits):
/// adds the leading `#`, strips invalid characters, and drops empties and
/// duplicates.
#[must_use]
pub fn normalize_hashtags<S: AsRef<str>>(raw: &[S], max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|tag| {
            let body: String = tag
                .as_ref()
                .trim()
                .trim_start_matches('#')
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            (!body.is_empty()).then(|| format!("#{body}"))
        })
        .filter(|tag| seen.insert(tag.to_lowercase()))
        .take(max)
        .collect()
}
