//! Keyword scoring of prompt templates against request text.
//!
//! Matching is word-level and case-insensitive: the request text and the
//! template keywords are split into lowercase alphanumeric words, so
//! `"Statistik?"` matches the tag `statistik` but `"statistiken"` does not.
//! A multi-word tag matches when its words appear consecutively.

use std::collections::HashSet;

/// Weight of one matching tag keyword.
pub const TAG_WEIGHT: u32 = 3;

/// Weight of one matching content keyword.
pub const CONTENT_WEIGHT: u32 = 1;

/// Per-template match counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromptScore {
    pub tag_hits: u32,
    pub content_hits: u32,
}

impl PromptScore {
    pub fn total(&self) -> u32 {
        TAG_WEIGHT * self.tag_hits + CONTENT_WEIGHT * self.content_hits
    }
}

/// Split text into lowercase words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Parse a comma-separated tag list into distinct, non-empty tags.
pub fn parse_tags(tags: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.split(',')
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

/// Score a template's tags and content against `request_text`.
///
/// Each distinct tag contributes [`TAG_WEIGHT`] when found in the text.
/// Content words are counted per occurrence, so a word repeated in the
/// template content contributes [`CONTENT_WEIGHT`] every time it appears.
pub fn score(tags: &str, content: &str, request_text: &str) -> PromptScore {
    let words = tokenize(request_text);
    let word_set: HashSet<&str> = words.iter().map(String::as_str).collect();

    let tag_hits = parse_tags(tags)
        .iter()
        .filter(|tag| contains_phrase(&words, &tokenize(tag)))
        .count() as u32;

    let content_hits = tokenize(content)
        .iter()
        .filter(|word| word_set.contains(word.as_str()))
        .count() as u32;

    PromptScore {
        tag_hits,
        content_hits,
    }
}

/// Pick the candidate with the strictly highest score.
///
/// The first candidate sets the baseline; a later candidate replaces it
/// only with a strictly greater score, so ties keep the earlier one.
pub fn select_best<T>(candidates: impl IntoIterator<Item = (T, u32)>) -> Option<(T, u32)> {
    let mut best: Option<(T, u32)> = None;
    for (candidate, score) in candidates {
        let replace = match &best {
            Some((_, best_score)) => score > *best_score,
            None => true,
        };
        if replace {
            best = Some((candidate, score));
        }
    }
    best
}

fn contains_phrase(words: &[String], phrase: &[String]) -> bool {
    if phrase.is_empty() || phrase.len() > words.len() {
        return false;
    }
    words.windows(phrase.len()).any(|window| window == phrase)
}
