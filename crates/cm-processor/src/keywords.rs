//! Frequency-ranked keyword extraction.

use std::collections::HashMap;

pub const MAX_KEYWORDS: usize = 10;

const MIN_KEYWORD_CHARS: usize = 4;

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "ain", "all", "also", "am", "an", "and",
    "any", "are", "aren", "as", "at", "be", "because", "been", "before", "being", "below",
    "between", "both", "but", "by", "can", "could", "couldn", "did", "didn", "do", "does",
    "doesn", "doing", "don", "down", "during", "each", "even", "ever", "every", "few", "first",
    "for", "from", "further", "had", "hadn", "has", "hasn", "have", "haven", "having", "he",
    "her", "here", "hers", "herself", "him", "himself", "his", "how", "however", "i", "if", "in",
    "into", "is", "isn", "it", "its", "itself", "just", "learned", "like", "made", "make",
    "many", "may", "me", "might", "more", "most", "much", "must", "mustn", "my", "myself",
    "need", "needn", "never", "no", "nor", "not", "now", "of", "off", "on", "once", "one",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "people", "really",
    "said", "same", "shan", "she", "should", "shouldn", "since", "so", "some", "still", "such",
    "than", "that", "the", "their", "theirs", "them", "themselves", "then", "there", "these",
    "they", "thing", "things", "this", "those", "through", "til", "to", "today", "too", "under",
    "until", "up", "upon", "us", "used", "very", "was", "wasn", "way", "we", "well", "were",
    "weren", "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with",
    "within", "without", "won", "would", "wouldn", "year", "years", "you", "your", "yours",
    "yourself", "yourselves",
];

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.binary_search(&word).is_ok()
}

/// Returns up to `max` lowercase keywords ranked by frequency.
///
/// Ties keep the order of first appearance. Stop words, numbers and words
/// shorter than four characters are ignored.
#[must_use]
pub fn extract_keywords(text: &str, max: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();

    let words = text
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\'').to_lowercase())
        .map(|w| w.strip_suffix("'s").map(str::to_string).unwrap_or(w))
        .filter(|w| w.chars().count() >= MIN_KEYWORD_CHARS)
        .filter(|w| w.chars().any(char::is_alphabetic))
        .filter(|w| !w.contains('\''))
        .filter(|w| !is_stop_word(w));

    for (position, word) in words.enumerate() {
        counts
            .entry(word)
            .and_modify(|(count, _)| *count += 1)
            .or_insert((1, position));
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().take(max).map(|(word, ..)| word).collect()
}
