//! In-memory cache of per-category search outcomes.
//!
//! Keyed by (category, lowercased query, selected provider set). Each
//! entry carries its own lifetime taken from `routing.cache_ttl_sec`, so
//! categories with different freshness needs share one [`moka`] cache.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use moka::Expiry;

use crate::types::SearchResult;

/// Maximum number of cached category outcomes.
const MAX_CACHE_ENTRIES: u64 = 500;

/// Composite cache key: category + normalised query + provider set hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    category: String,
    /// Lowercased, trimmed query string.
    query: String,
    /// Hash of the sorted provider set, so a different selection (a provider
    /// went unhealthy, a role pinned another) never reuses stale results.
    provider_hash: u64,
}

impl CacheKey {
    pub fn new(category: &str, query: &str, providers: &[String]) -> Self {
        Self {
            category: category.to_owned(),
            query: query.trim().to_lowercase(),
            provider_hash: hash_providers(providers),
        }
    }
}

/// A category's merged results as produced by a live search.
#[derive(Debug, Clone)]
pub struct CachedCategory {
    pub results: Vec<SearchResult>,
    /// Providers that contributed successfully.
    pub sources: Vec<String>,
    ttl: Duration,
}

impl CachedCategory {
    pub fn new(results: Vec<SearchResult>, sources: Vec<String>, ttl: Duration) -> Self {
        Self {
            results,
            sources,
            ttl,
        }
    }
}

/// Expires each entry after the TTL it was stored with.
struct PerEntryExpiry;

impl Expiry<CacheKey, Arc<CachedCategory>> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &Arc<CachedCategory>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Shared per-category result cache.
#[derive(Clone)]
pub struct ResultCache {
    inner: Cache<CacheKey, Arc<CachedCategory>>,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(MAX_CACHE_ENTRIES)
    }
}

impl ResultCache {
    pub fn new(max_entries: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_entries)
                .expire_after(PerEntryExpiry)
                .build(),
        }
    }

    /// Returns `Some(entry)` on cache hit, `None` on miss or expiry.
    pub async fn get(&self, key: &CacheKey) -> Option<Arc<CachedCategory>> {
        self.inner.get(key).await
    }

    /// Store an outcome. Zero-TTL entries are not stored.
    pub async fn insert(&self, key: CacheKey, entry: CachedCategory) {
        if entry.ttl.is_zero() {
            return;
        }
        self.inner.insert(key, Arc::new(entry)).await;
    }

    /// Drop every entry, e.g. after the routing config changes.
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

/// Order-independent hash of a provider id set.
fn hash_providers(providers: &[String]) -> u64 {
    let mut sorted: Vec<&String> = providers.iter().collect();
    sorted.sort();
    let mut hasher = DefaultHasher::new();
    for provider in sorted {
        provider.hash(&mut hasher);
    }
    hasher.finish()
}
