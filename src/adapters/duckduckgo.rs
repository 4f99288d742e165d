//! Keyless HTML adapter for DuckDuckGo's JavaScript-free endpoint.
//!
//! Posts the query to the provider's `base_url` (normally
//! `https://html.duckduckgo.com/html/`) and scrapes organic results with
//! CSS selectors. Confidence decays with result position.

use async_trait::async_trait;
use scraper::{Html, Selector};
use switchyard_router::config::ProviderConfig;
use switchyard_router::{Credential, ProviderAdapter, ProviderHit, RouterError};
use url::Url;

/// Results scraped from one page at most.
const MAX_PAGE_RESULTS: usize = 20;

/// Confidence of the first result; each later position loses
/// [`CONFIDENCE_STEP`], never dropping below [`CONFIDENCE_FLOOR`].
const TOP_CONFIDENCE: f64 = 0.9;
const CONFIDENCE_STEP: f64 = 0.05;
const CONFIDENCE_FLOOR: f64 = 0.1;

/// DuckDuckGo HTML scraper.
#[derive(Debug, Clone)]
pub struct DuckDuckGoAdapter {
    client: reqwest::Client,
}

impl DuckDuckGoAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter for DuckDuckGoAdapter {
    async fn call(
        &self,
        provider: &ProviderConfig,
        query: &str,
        _credential: Option<&Credential>,
    ) -> Result<Vec<ProviderHit>, RouterError> {
        tracing::trace!(query, provider = %provider.id, "DuckDuckGo search");

        let response = self
            .client
            .post(&provider.base_url)
            .form(&[("q", query)])
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| RouterError::ProviderCall(format!("DuckDuckGo request failed: {e}")))?
            .error_for_status()
            .map_err(|e| RouterError::ProviderCall(format!("DuckDuckGo HTTP error: {e}")))?;

        let html = response
            .text()
            .await
            .map_err(|e| RouterError::ProviderCall(format!("DuckDuckGo response read failed: {e}")))?;

        tracing::trace!(bytes = html.len(), "DuckDuckGo response received");
        parse_results(&html, MAX_PAGE_RESULTS)
    }
}

/// Unwrap DuckDuckGo's redirect links (`//duckduckgo.com/l/?uddg=...`).
fn extract_url(href: &str) -> Option<String> {
    let full_href = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    let parsed = Url::parse(&full_href).ok()?;

    if parsed.host_str() == Some("duckduckgo.com") && parsed.path().starts_with("/l/") {
        parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned())
    } else {
        Some(full_href)
    }
}

fn position_confidence(position: usize) -> f64 {
    (TOP_CONFIDENCE - CONFIDENCE_STEP * position as f64).max(CONFIDENCE_FLOOR)
}

/// Parse a results page into hits, skipping ads and malformed entries.
pub(crate) fn parse_results(html: &str, max_results: usize) -> Result<Vec<ProviderHit>, RouterError> {
    let document = Html::parse_document(html);

    let result_sel = Selector::parse(
        ".result.results_links.results_links_deep:not(.result--ad), .web-result:not(.result--ad)",
    )
    .map_err(|e| RouterError::ProviderCall(format!("invalid result selector: {e:?}")))?;
    let title_sel = Selector::parse(".result__a")
        .map_err(|e| RouterError::ProviderCall(format!("invalid title selector: {e:?}")))?;
    let snippet_sel = Selector::parse(".result__snippet")
        .map_err(|e| RouterError::ProviderCall(format!("invalid snippet selector: {e:?}")))?;

    let mut hits = Vec::new();
    for element in document.select(&result_sel) {
        let Some(title_el) = element.select(&title_sel).next() else {
            continue;
        };
        let title = title_el.text().collect::<String>().trim().to_string();
        if title.is_empty() {
            continue;
        }
        let Some(url) = title_el.value().attr("href").and_then(extract_url) else {
            continue;
        };
        let snippet = element
            .select(&snippet_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        hits.push(ProviderHit {
            title,
            url,
            snippet,
            confidence: position_confidence(hits.len()),
            ..Default::default()
        });
        if hits.len() >= max_results {
            break;
        }
    }

    tracing::debug!(count = hits.len(), "DuckDuckGo results parsed");
    Ok(hits)
}
