//! Result deduplication by URL key.
//!
//! Results sharing a [`dedup_key`] collapse to the first one seen; merge
//! order is therefore significant and is fixed by the orchestrator
//! (category order, then provider selection order, then adapter order).

use std::collections::HashSet;

use crate::types::SearchResult;

use super::url_normalize::dedup_key;

/// Drop every result whose URL key was already seen. Order is preserved.
pub fn deduplicate(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen: HashSet<String> = HashSet::with_capacity(results.len());
    results
        .into_iter()
        .filter(|result| seen.insert(dedup_key(&result.url)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_result(url: &str, source: &str, confidence: f64) -> SearchResult {
        SearchResult {
            id: format!("{source}-{url}"),
            title: format!("Title from {source}"),
            url: url.to_string(),
            snippet: format!("Snippet from {source}"),
            source: source.to_string(),
            category: "web".into(),
            confidence,
            published_date: None,
            image_url: None,
            metadata: None,
        }
    }

    #[test]
    fn unique_urls_pass_through() {
        let results = vec![
            make_result("https://a.com", "gnews", 0.9),
            make_result("https://b.com", "bing", 0.8),
        ];
        assert_eq!(deduplicate(results).len(), 2);
    }

    #[test]
    fn first_occurrence_wins_even_with_lower_confidence() {
        let results = vec![
            make_result("https://example.com/page", "first", 0.2),
            make_result("https://example.com/page", "second", 0.99),
        ];
        let deduped = deduplicate(results);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].source, "first");
    }

    #[test]
    fn query_and_case_variants_merge() {
        let results = vec![
            make_result("https://Example.com/Story?ref=feed", "a", 0.5),
            make_result("https://example.com/story", "b", 0.5),
            make_result("https://EXAMPLE.com/story?utm_source=x", "c", 0.5),
        ];
        let deduped = deduplicate(results);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].source, "a");
    }

    #[test]
    fn order_is_preserved() {
        let results = vec![
            make_result("https://c.com", "x", 0.1),
            make_result("https://a.com", "x", 0.2),
            make_result("https://c.com", "y", 0.3),
            make_result("https://b.com", "x", 0.4),
        ];
        let urls: Vec<String> = deduplicate(results).into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["https://c.com", "https://a.com", "https://b.com"]);
    }

    #[test]
    fn empty_input_returns_empty() {
        assert!(deduplicate(vec![]).is_empty());
    }
}
