//! Lexical helpers shared by ranking, scoring, and validation.
//! Matching is case-insensitive and purely lexical; nothing here calls out.

use std::collections::BTreeSet;

/// Words too common to signal relevance on their own.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "in", "is",
    "it", "of", "on", "or", "our", "the", "to", "we", "with", "you", "your", "will", "plus",
    "experience", "ability", "strong", "using",
];

/// Case-insensitive substring containment.
pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Lowercased alphanumeric tokens in input order.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Distinct tokens that carry meaning: numbers, and words of 2+ chars that are
/// not stopwords.
pub fn significant_terms(text: &str) -> BTreeSet<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| {
            t.chars().all(|c| c.is_ascii_digit())
                || (t.chars().count() >= 2 && !STOPWORDS.contains(&t.as_str()))
        })
        .collect()
}

/// Fraction (0.0 – 1.0) of `target`'s significant terms present in `source`.
/// Returns 0.0 when the target has no significant terms.
pub fn term_overlap(target: &str, source: &str) -> f64 {
    let wanted = significant_terms(target);
    if wanted.is_empty() {
        return 0.0;
    }
    let available: BTreeSet<String> = tokenize(source).into_iter().collect();
    let hits = wanted.iter().filter(|t| available.contains(*t)).count();
    hits as f64 / wanted.len() as f64
}
