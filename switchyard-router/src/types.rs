//! Request, result, and response types for a routed search.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Default number of results returned when a request does not say.
pub const DEFAULT_MAX_RESULTS: usize = 20;

/// Category label applied to results produced by the fallback cascade.
pub const FALLBACK_CATEGORY: &str = "fallback";

/// A search issued on behalf of a role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query.
    pub query: String,
    /// Requesting role; selects a [`RoleOverride`](crate::config::RoleOverride).
    pub role_id: String,
    /// Restrict the search to these categories.
    #[serde(default)]
    pub categories: Option<BTreeSet<String>>,
    /// Upper bound on returned results. Defaults to [`DEFAULT_MAX_RESULTS`].
    #[serde(default)]
    pub max_results: Option<usize>,
    /// Allow keyed, trial-eligible providers to be used without a credential.
    #[serde(default)]
    pub include_trial_sources: Option<bool>,
}

impl SearchRequest {
    /// Build a request for `query` issued by `role_id` with default options.
    pub fn new(query: impl Into<String>, role_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            role_id: role_id.into(),
            ..Default::default()
        }
    }

    /// Restrict the request to the given categories.
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    /// Effective result cap.
    pub fn max_results(&self) -> usize {
        self.max_results.unwrap_or(DEFAULT_MAX_RESULTS)
    }

    /// Whether keyed trial providers may be used without a credential.
    pub fn include_trial_sources(&self) -> bool {
        self.include_trial_sources.unwrap_or(false)
    }
}

/// One raw item as returned by a [`ProviderAdapter`](crate::registry::ProviderAdapter).
///
/// Adapters know nothing about categories or routing; the orchestrator
/// turns hits into [`SearchResult`]s.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderHit {
    /// Provider-scoped identifier. May be empty.
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
    /// Adapter-reported quality score, expected in `[0, 1]`.
    pub confidence: f64,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// A single result in a [`SearchResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// Provider id that produced this result.
    pub source: String,
    /// Category the provider was searched under, or [`FALLBACK_CATEGORY`].
    pub category: String,
    /// Quality score in `[0, 1]`.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl SearchResult {
    /// Normalise a provider hit into a result attributed to `source`/`category`.
    ///
    /// Confidence is clamped into `[0, 1]` (NaN becomes 0) and a missing id
    /// is replaced with `"{source}-{position}"`.
    pub fn from_hit(hit: ProviderHit, source: &str, category: &str, position: usize) -> Self {
        let confidence = if hit.confidence.is_nan() {
            0.0
        } else {
            hit.confidence.clamp(0.0, 1.0)
        };
        let id = if hit.id.trim().is_empty() {
            format!("{source}-{position}")
        } else {
            hit.id
        };
        Self {
            id,
            title: hit.title,
            url: hit.url,
            snippet: hit.snippet,
            source: source.to_owned(),
            category: category.to_owned(),
            confidence,
            published_date: hit.published_date,
            image_url: hit.image_url,
            metadata: hit.metadata,
        }
    }
}

/// A provider call that failed during a search.
///
/// Failures are attached to the response rather than aborting the search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchError {
    pub provider: String,
    pub category: String,
    pub error: String,
    pub is_quota_exceeded: bool,
    pub is_health_failed: bool,
    /// The call was abandoned at the search deadline.
    #[serde(default)]
    pub is_timeout: bool,
}

impl SearchError {
    /// Record a failure of `provider` while searching `category`.
    pub fn from_router_error(
        provider: &str,
        category: &str,
        err: &crate::error::RouterError,
    ) -> Self {
        use crate::error::RouterError;
        Self {
            provider: provider.to_owned(),
            category: category.to_owned(),
            error: err.to_string(),
            is_quota_exceeded: matches!(err, RouterError::QuotaExceeded(_)),
            is_health_failed: matches!(err, RouterError::HealthCheckFailed(_)),
            is_timeout: err.is_timeout(),
        }
    }
}

/// The merged, ranked outcome of one search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub sources_used: BTreeSet<String>,
    pub categories_searched: BTreeSet<String>,
    /// Trial units consumed by this request, per category.
    pub trial_quota_used: BTreeMap<String, u32>,
    pub byok_calls_made: u32,
    pub search_time_ms: u64,
    pub fallback_used: bool,
    pub errors: Vec<SearchError>,
}
