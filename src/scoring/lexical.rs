//! Word-set (Jaccard) overlap between two text spans.
//!
//! This scorer exists to catch lexical near-duplicates (abbreviation and
//! phrasing drift) and to reject semantic paraphrases that an embedding
//! scorer alone would over-match. It deliberately does no stemming or
//! synonym handling: "90 days" and "ninety days" are different tokens.

use std::collections::HashSet;

/// Jaccard similarity over the word sets of two texts, in [0,1].
///
/// Texts are lowercased, punctuation is treated as whitespace, and tokens
/// are compared as a set: duplicates collapse, stop-words are kept.
///
/// Both texts empty yields 1.0 (vacuously identical); exactly one empty
/// yields 0.0.
pub fn lexical_similarity(a: &str, b: &str) -> f32 {
    let words_a = word_set(a);
    let words_b = word_set(b);

    match (words_a.is_empty(), words_b.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        (false, false) => {}
    }

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.len() + words_b.len() - intersection;
    intersection as f32 / union as f32
}

/// Threshold check over [`lexical_similarity`].
///
/// A threshold of 0.0 or below always passes, acting as a disable switch
/// for the lexical gate.
pub fn meets_lexical_threshold(a: &str, b: &str, threshold: f32) -> bool {
    if threshold <= 0.0 {
        return true;
    }
    lexical_similarity(a, b) >= threshold
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}
