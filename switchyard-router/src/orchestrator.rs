//! Core search orchestrator: per-category fan-out, bounded provider calls,
//! fallback cascade, and ranking.
//!
//! Every category is searched concurrently. Within a category the selected
//! providers are called concurrently, bounded by `max_parallel`, and all
//! calls share one deadline derived from `routing.timeout_ms`. Provider
//! failures are recorded on the response and never abort siblings.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use tokio::time::Instant;

use crate::cache::{CacheKey, CachedCategory, ResultCache};
use crate::clock::Clock;
use crate::config::{CategoryPolicy, EngineConfig, FallbackPolicy, KeyType, ProviderConfig};
use crate::credentials::CredentialStore;
use crate::error::{Result, RouterError};
use crate::ranking;
use crate::registry::AdapterRegistry;
use crate::resolver::CategoryResolver;
use crate::selector::{RotationState, SourceSelector};
use crate::types::{SearchError, SearchRequest, SearchResponse, SearchResult, FALLBACK_CATEGORY};
use crate::usage::{UsageKind, UsageTracker};

/// The fallback cascade stops once this many results are collected.
pub const FALLBACK_RESULT_TARGET: usize = 5;

/// Confidence multiplier applied to fallback results.
pub const FALLBACK_CONFIDENCE_FACTOR: f64 = 0.8;

/// Everything one search needs, borrowed from the owning router.
pub struct SearchContext<'a> {
    pub config: &'a EngineConfig,
    pub usage: &'a UsageTracker,
    pub credentials: &'a dyn CredentialStore,
    pub registry: &'a AdapterRegistry,
    pub clock: &'a dyn Clock,
    pub rotation: &'a RotationState,
    pub cache: &'a ResultCache,
}

/// Result of one provider call.
struct ProviderOutcome {
    provider_id: String,
    result: Result<Vec<SearchResult>>,
    usage: UsageKind,
}

/// Merged outcome of one category.
#[derive(Default)]
struct CategoryOutcome {
    results: Vec<SearchResult>,
    sources: Vec<String>,
    attempted: Vec<String>,
    errors: Vec<SearchError>,
    trial_used: BTreeMap<String, u32>,
    byok_calls: u32,
}

impl CategoryOutcome {
    fn absorb(&mut self, category: &str, outcome: ProviderOutcome) {
        self.attempted.push(outcome.provider_id.clone());
        match outcome.result {
            Ok(results) => {
                match outcome.usage {
                    UsageKind::Trial => *self.trial_used.entry(category.to_owned()).or_default() += 1,
                    UsageKind::Byok => self.byok_calls += 1,
                    UsageKind::Untracked => {}
                }
                self.results.extend(results);
                self.sources.push(outcome.provider_id);
            }
            Err(err) => {
                tracing::warn!(provider = %outcome.provider_id, category, error = %err, "provider call failed");
                self.errors
                    .push(SearchError::from_router_error(&outcome.provider_id, category, &err));
            }
        }
    }
}

/// Orchestrate a routed search.
///
/// # Pipeline
///
/// 1. Resolve categories for the role and request
/// 2. Per category, concurrently: select providers, serve from cache or
///    call up to `max_parallel` of them concurrently under the deadline
/// 3. Record usage for successful calls; record failures as [`SearchError`]s
/// 4. If nothing came back, run the fallback cascade per `routing.fallback`
/// 5. Deduplicate, rank, and truncate to `max_results`
///
/// # Errors
///
/// Returns [`RouterError::Configuration`] only when no category resolves.
/// Every provider failure is reported inside the response.
pub async fn orchestrate_search(ctx: &SearchContext<'_>, request: &SearchRequest) -> Result<SearchResponse> {
    let started = Instant::now();
    let timeout = Duration::from_millis(ctx.config.routing.timeout_ms);
    let deadline = started + timeout;

    tracing::trace!(query = %request.query, role = %request.role_id, "routing search");

    // 1. Resolve categories.
    let categories =
        CategoryResolver::new(ctx.config).resolve(&request.role_id, request.categories.as_ref());
    if categories.is_empty() {
        return Err(RouterError::Configuration(format!(
            "no enabled category resolves for role `{}`",
            request.role_id
        )));
    }

    // 2. Fan out per category. `join_all` keeps category order, so the merge
    // order (and therefore dedup) is deterministic.
    let outcomes = futures::future::join_all(
        categories
            .iter()
            .map(|category| search_category(ctx, request, category, deadline)),
    )
    .await;

    // 3. Merge.
    let mut response = SearchResponse {
        categories_searched: categories.iter().cloned().collect(),
        ..Default::default()
    };
    let mut merged: Vec<SearchResult> = Vec::new();
    let mut attempted: Vec<String> = Vec::new();
    for outcome in outcomes {
        merged.extend(outcome.results);
        response.sources_used.extend(outcome.sources);
        response.errors.extend(outcome.errors);
        attempted.extend(outcome.attempted);
        for (category, used) in outcome.trial_used {
            *response.trial_quota_used.entry(category).or_default() += used;
        }
        response.byok_calls_made += outcome.byok_calls;
    }

    // 4. Fallback cascade.
    if merged.is_empty() && ctx.config.routing.fallback != FallbackPolicy::None {
        let trial_only = ctx.config.routing.fallback == FallbackPolicy::TrialOnly;
        let fallback = run_fallback(ctx, request, deadline, trial_only, &attempted).await;
        response.fallback_used = true;
        merged.extend(fallback.results);
        response.sources_used.extend(fallback.sources);
        response.errors.extend(fallback.errors);
        for (category, used) in fallback.trial_used {
            *response.trial_quota_used.entry(category).or_default() += used;
        }
        response.byok_calls_made += fallback.byok_calls;
    }

    // 5. Rank.
    response.results = ranking::rank(merged, &request.query, request.max_results());
    response.search_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    tracing::debug!(
        categories = response.categories_searched.len(),
        sources = response.sources_used.len(),
        results = response.results.len(),
        errors = response.errors.len(),
        fallback = response.fallback_used,
        elapsed_ms = response.search_time_ms,
        "search finished"
    );
    Ok(response)
}

/// Select, call, and merge one category.
async fn search_category(
    ctx: &SearchContext<'_>,
    request: &SearchRequest,
    category_id: &str,
    deadline: Instant,
) -> CategoryOutcome {
    let mut outcome = CategoryOutcome::default();
    let Some(category) = ctx.config.category(category_id) else {
        return outcome;
    };

    let selector = SourceSelector::new(
        ctx.config,
        ctx.usage,
        ctx.credentials,
        ctx.clock,
        ctx.rotation,
    );
    let limit = match ctx.config.routing.category_policy {
        CategoryPolicy::OnePerCategory => 1,
        CategoryPolicy::Parallel => category.max_parallel.max(1),
    };
    let chosen: Vec<String> = selector
        .select(category_id, request)
        .into_iter()
        .take(limit)
        .collect();
    if chosen.is_empty() {
        tracing::debug!(category = category_id, "no eligible providers");
        return outcome;
    }

    let ttl = ctx
        .config
        .routing
        .cache_ttl_sec
        .get(category_id)
        .copied()
        .unwrap_or(0);
    let cache_key = (ttl > 0).then(|| CacheKey::new(category_id, &request.query, &chosen));
    if let Some(key) = &cache_key {
        if let Some(hit) = ctx.cache.get(key).await {
            tracing::debug!(category = category_id, results = hit.results.len(), "cache hit");
            outcome.results = hit.results.clone();
            outcome.sources = hit.sources.clone();
            return outcome;
        }
    }

    // `buffered` runs up to `limit` calls at once and yields in selection order.
    let calls: Vec<ProviderOutcome> = futures::stream::iter(
        chosen
            .iter()
            .map(|id| call_provider(ctx, request, id, category_id, deadline)),
    )
    .buffered(limit)
    .collect()
    .await;

    for call in calls {
        outcome.absorb(category_id, call);
    }

    if let Some(key) = cache_key {
        if !outcome.results.is_empty() {
            ctx.cache
                .insert(
                    key,
                    CachedCategory::new(
                        outcome.results.clone(),
                        outcome.sources.clone(),
                        Duration::from_secs(ttl),
                    ),
                )
                .await;
        }
    }
    outcome
}

/// Call one provider under the shared deadline.
///
/// Adapter errors, panics, and deadline expiry all come back as `Err`.
/// Usage is tracked only for calls that succeed.
async fn call_provider(
    ctx: &SearchContext<'_>,
    request: &SearchRequest,
    provider_id: &str,
    category_id: &str,
    deadline: Instant,
) -> ProviderOutcome {
    let Some(provider) = ctx.config.provider(provider_id) else {
        return ProviderOutcome {
            provider_id: provider_id.to_owned(),
            result: Err(RouterError::System(format!("unknown provider `{provider_id}`"))),
            usage: UsageKind::Untracked,
        };
    };
    call_configured_provider(ctx, request, provider, category_id, deadline).await
}

async fn call_configured_provider(
    ctx: &SearchContext<'_>,
    request: &SearchRequest,
    provider: &ProviderConfig,
    category_id: &str,
    deadline: Instant,
) -> ProviderOutcome {
    let credential = if provider.key_type == KeyType::None {
        None
    } else {
        ctx.credentials.get_credential(&provider.id)
    };

    let call = AssertUnwindSafe(ctx.registry.call(provider, &request.query, credential.as_ref()))
        .catch_unwind();
    let result = match tokio::time::timeout_at(deadline, call).await {
        Ok(Ok(Ok(hits))) => Ok(hits),
        Ok(Ok(Err(err))) => Err(err),
        Ok(Err(_panic)) => Err(RouterError::System(format!(
            "adapter for `{}` panicked",
            provider.id
        ))),
        Err(_elapsed) => Err(RouterError::Timeout(format!(
            "`{}` did not answer within {}ms",
            provider.id, ctx.config.routing.timeout_ms
        ))),
    };

    match result {
        Ok(hits) => {
            let usage = ctx
                .usage
                .track_usage(provider, category_id, credential.is_some());
            let results = hits
                .into_iter()
                .enumerate()
                .map(|(position, hit)| SearchResult::from_hit(hit, &provider.id, category_id, position))
                .collect::<Vec<_>>();
            tracing::debug!(provider = %provider.id, category = category_id, count = results.len(), "provider returned results");
            ProviderOutcome {
                provider_id: provider.id.clone(),
                result: Ok(results),
                usage,
            }
        }
        Err(err) => ProviderOutcome {
            provider_id: provider.id.clone(),
            result: Err(err),
            usage: UsageKind::Untracked,
        },
    }
}

/// Sequentially walk the fallback chain until enough results are collected.
///
/// Unhealthy providers, providers out of quota, providers the role disables
/// and providers already tried in this search are skipped. In trial-only
/// mode, providers without trial eligibility are skipped too. Results are retagged as
/// [`FALLBACK_CATEGORY`] with scaled confidence and capped at
/// [`FALLBACK_RESULT_TARGET`].
async fn run_fallback(
    ctx: &SearchContext<'_>,
    request: &SearchRequest,
    deadline: Instant,
    trial_only: bool,
    attempted: &[String],
) -> CategoryOutcome {
    let mut fallback = CategoryOutcome::default();
    let role = ctx.config.role_override(&request.role_id);

    for provider in ctx.config.fallback_chain() {
        if fallback.results.len() >= FALLBACK_RESULT_TARGET {
            break;
        }
        if Instant::now() >= deadline {
            tracing::debug!("fallback cascade stopped at deadline");
            break;
        }
        if attempted.contains(&provider.id) || !ctx.usage.is_healthy(&provider.id) {
            continue;
        }
        if role.is_some_and(|r| r.disables(&provider.id)) {
            continue;
        }
        if trial_only && !provider.trial_applies {
            continue;
        }
        if !ctx.usage.has_quota_remaining(provider, &ctx.config.trial) {
            continue;
        }

        tracing::debug!(provider = %provider.id, "trying fallback provider");
        let mut outcome =
            call_configured_provider(ctx, request, provider, &provider.category, deadline).await;
        if let Ok(results) = &mut outcome.result {
            for result in results.iter_mut() {
                result.category = FALLBACK_CATEGORY.to_owned();
                result.confidence *= FALLBACK_CONFIDENCE_FACTOR;
            }
        }
        // Usage is charged to the provider's own category; the response
        // reports it there too.
        let usage_category = provider.category.clone();
        let kind = outcome.usage;
        fallback.attempted.push(outcome.provider_id.clone());
        match outcome.result {
            Ok(results) => {
                match kind {
                    UsageKind::Trial => *fallback.trial_used.entry(usage_category).or_default() += 1,
                    UsageKind::Byok => fallback.byok_calls += 1,
                    UsageKind::Untracked => {}
                }
                fallback.results.extend(results);
                fallback.sources.push(outcome.provider_id);
            }
            Err(err) => {
                tracing::warn!(provider = %outcome.provider_id, error = %err, "fallback provider failed");
                fallback.errors.push(SearchError::from_router_error(
                    &outcome.provider_id,
                    FALLBACK_CATEGORY,
                    &err,
                ));
            }
        }
    }

    fallback.results.truncate(FALLBACK_RESULT_TARGET);
    fallback
}
