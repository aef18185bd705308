//! Search-term derivation.
//!
//! Two paths produce the ordered list of queries sent to the search API:
//!
//! 1. **LLM path**: the model is asked for a JSON array of strings and the
//!    reply is parsed strictly by [`parse_llm_terms`]. Anything other than a
//!    non-empty array of strings is rejected.
//! 2. **Deterministic path**: [`derive_terms`] works from the page alone.
//!
//! # Deterministic algorithm
//!
//! 1. Tokenize `title + description + keywords` into lower-cased words.
//!    Keep words longer than 3 characters, deduplicated, in order of first
//!    appearance.
//! 2. If fewer than 5 terms were collected, tokenize the body content, keep
//!    words longer than 4 characters, rank them by frequency (descending,
//!    ties broken by first appearance) and append until the target count.
//! 3. Truncate to the target count.
//!
//! Both paths return no duplicates and never more than the target count.

use std::collections::{HashMap, HashSet};

use crate::models::FetchedPage;
use crate::prompt::strip_code_fence;
use crate::text::truncate_chars;

/// Headline terms below which body content is mined for more.
const MIN_HEADLINE_TERMS: usize = 5;

const MIN_HEADLINE_WORD_LEN: usize = 3;
const MIN_BODY_WORD_LEN: usize = 4;

/// Derive up to `target` search terms from a page without any LLM.
///
/// Returns at least one term whenever the page has non-empty title,
/// description, keywords, or content (and `target > 0`).
pub fn derive_terms(page: &FetchedPage, target: usize) -> Vec<String> {
    if target == 0 {
        return Vec::new();
    }

    let mut terms = Vec::new();
    let mut seen = HashSet::new();

    let headline = format!("{} {} {}", page.title, page.description, page.keywords);
    for word in tokenize(&headline) {
        if word.chars().count() > MIN_HEADLINE_WORD_LEN && seen.insert(word.clone()) {
            terms.push(word);
        }
    }

    if terms.len() < MIN_HEADLINE_TERMS {
        for word in rank_by_frequency(&page.content) {
            if terms.len() >= target {
                break;
            }
            if seen.insert(word.clone()) {
                terms.push(word);
            }
        }
    }

    if terms.is_empty() {
        terms = last_resort_terms(page, target);
    }

    terms.truncate(target);
    terms
}

/// Strictly parse an LLM reply as a JSON array of strings.
///
/// Markdown code fences are tolerated. Entries are trimmed, blanks dropped,
/// and duplicates (case-insensitive) removed keeping the first occurrence.
/// Returns `None` when the reply is not an array of strings or nothing
/// usable remains.
pub fn parse_llm_terms(raw: &str, target: usize) -> Option<Vec<String>> {
    let body = strip_code_fence(raw);
    let parsed: Vec<String> = serde_json::from_str(body).ok()?;

    let mut seen = HashSet::new();
    let mut terms: Vec<String> = parsed
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect();
    terms.truncate(target);

    if terms.is_empty() {
        None
    } else {
        Some(terms)
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

/// Body words longer than [`MIN_BODY_WORD_LEN`], most frequent first.
fn rank_by_frequency(content: &str) -> Vec<String> {
    // word -> (count, first position)
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (pos, word) in tokenize(content)
        .filter(|w| w.chars().count() > MIN_BODY_WORD_LEN)
        .enumerate()
    {
        counts.entry(word).or_insert((0, pos)).0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().map(|(word, _, _)| word).collect()
}

/// Used only when no word passed the length filters.
fn last_resort_terms(page: &FetchedPage, target: usize) -> Vec<String> {
    let all = format!(
        "{} {} {} {}",
        page.title, page.description, page.keywords, page.content
    );

    let mut seen = HashSet::new();
    let words: Vec<String> = tokenize(&all)
        .filter(|w| seen.insert(w.clone()))
        .take(target)
        .collect();
    if !words.is_empty() {
        return words;
    }

    [&page.title, &page.description, &page.keywords, &page.content]
        .iter()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(|s| vec![truncate_chars(s, 60).to_string()])
        .unwrap_or_default()
}
