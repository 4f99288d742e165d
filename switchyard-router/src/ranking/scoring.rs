//! Query-overlap relevance used as the ranking tiebreaker.
//!
//! Formula: `relevance = (title_hits * 2 + snippet_hits) / (token_count * 2)`
//! where a hit is a query token contained (case-insensitively) in the
//! title or snippet. Tokens shorter than two characters are ignored.

use crate::types::SearchResult;

/// Minimum token length, in characters, that counts toward relevance.
const MIN_TOKEN_CHARS: usize = 2;

/// Lowercased whitespace tokens of `query` that are long enough to count.
pub fn query_tokens(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .filter(|token| token.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_lowercase)
        .collect()
}

/// Relevance of `result` to pre-tokenised `tokens`. Zero when there are no tokens.
///
/// The result lies in `[0, 1.5]`: a token present in both title and snippet
/// scores 3 against a denominator of 2 per token.
pub fn relevance_score(result: &SearchResult, tokens: &[String]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let title = result.title.to_lowercase();
    let snippet = result.snippet.to_lowercase();
    let title_hits = tokens.iter().filter(|t| title.contains(t.as_str())).count();
    let snippet_hits = tokens.iter().filter(|t| snippet.contains(t.as_str())).count();
    (title_hits * 2 + snippet_hits) as f64 / (tokens.len() * 2) as f64
}

/// Confidence bucketed to the nearest tenth, for tie-tolerant sorting.
pub fn confidence_bucket(confidence: f64) -> i64 {
    (confidence * 10.0).round() as i64
}
