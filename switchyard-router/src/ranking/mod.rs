//! Result ranking: dedup, relevance tiebreak, sort, truncate.
//!
//! Ranking is a pure function of its inputs; identical merged results and
//! query always produce the same order.

pub mod dedup;
pub mod scoring;
pub mod url_normalize;

use std::cmp::Ordering;

use crate::types::SearchResult;

use self::dedup::deduplicate;
use self::scoring::{confidence_bucket, query_tokens, relevance_score};

/// Deduplicate, order, and truncate merged results.
///
/// # Pipeline
///
/// 1. Drop later results whose URL (query stripped, case-folded) was seen
/// 2. Score each survivor's query-token overlap
/// 3. Sort by confidence rounded to 0.1, then relevance, both descending;
///    the sort is stable so full ties keep merge order
/// 4. Truncate to `max_results`
pub fn rank(results: Vec<SearchResult>, query: &str, max_results: usize) -> Vec<SearchResult> {
    let tokens = query_tokens(query);

    let mut scored: Vec<(i64, f64, SearchResult)> = deduplicate(results)
        .into_iter()
        .map(|result| {
            let bucket = confidence_bucket(result.confidence);
            let relevance = relevance_score(&result, &tokens);
            (bucket, relevance, result)
        })
        .collect();

    scored.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal))
    });

    scored
        .into_iter()
        .take(max_results)
        .map(|(_, _, result)| result)
        .collect()
}
