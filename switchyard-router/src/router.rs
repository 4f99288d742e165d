//! [`SearchRouter`]: the long-lived facade that owns configuration, usage
//! state, adapters, credentials, the result cache, and the health monitor.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::ResultCache;
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigPatch, ConfigStore, EngineConfig};
use crate::credentials::{CredentialStore, NoCredentials};
use crate::error::{Result, RouterError};
use crate::monitor::{HealthMonitor, HealthProbe, SweepReport};
use crate::orchestrator::{orchestrate_search, SearchContext};
use crate::registry::AdapterRegistry;
use crate::selector::RotationState;
use crate::types::{SearchRequest, SearchResponse};
use crate::usage::{UsageState, UsageTracker};

/// A running health monitor task.
struct MonitorHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Routes searches across configured providers. Share it behind an `Arc`.
pub struct SearchRouter {
    config: Arc<ConfigStore>,
    usage: Arc<UsageTracker>,
    registry: AdapterRegistry,
    credentials: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    rotation: RotationState,
    cache: ResultCache,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl std::fmt::Debug for SearchRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchRouter")
            .field("config_version", &self.config.snapshot().version)
            .field("registry", &self.registry)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SearchRouter`].
pub struct SearchRouterBuilder {
    config: EngineConfig,
    registry: AdapterRegistry,
    credentials: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    cache_capacity: Option<u64>,
}

impl SearchRouterBuilder {
    pub fn registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Replace the wall clock, e.g. with a [`ManualClock`](crate::clock::ManualClock) in tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache_capacity(mut self, entries: u64) -> Self {
        self.cache_capacity = Some(entries);
        self
    }

    /// # Errors
    ///
    /// Returns [`RouterError::Configuration`] if the config fails validation.
    pub fn build(self) -> Result<SearchRouter> {
        let config = Arc::new(ConfigStore::new(self.config)?);
        let cache = self
            .cache_capacity
            .map_or_else(ResultCache::default, ResultCache::new);
        Ok(SearchRouter {
            config,
            usage: Arc::new(UsageTracker::new(Arc::clone(&self.clock))),
            registry: self.registry,
            credentials: self.credentials,
            clock: self.clock,
            rotation: RotationState::default(),
            cache,
            monitor: Mutex::new(None),
        })
    }
}

impl SearchRouter {
    /// Start building a router around `config`.
    pub fn builder(config: EngineConfig) -> SearchRouterBuilder {
        SearchRouterBuilder {
            config,
            registry: AdapterRegistry::new(),
            credentials: Arc::new(NoCredentials),
            clock: Arc::new(SystemClock),
            cache_capacity: None,
        }
    }

    /// Router with the given adapters, no credentials, and the system clock.
    pub fn new(config: EngineConfig, registry: AdapterRegistry) -> Result<Self> {
        Self::builder(config).registry(registry).build()
    }

    /// Run a routed search.
    ///
    /// The configuration snapshot taken at the start is used for the whole
    /// call, even if [`update_config`](Self::update_config) lands meanwhile.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Configuration`] when no category resolves for
    /// the request. Provider failures are reported in
    /// [`SearchResponse::errors`].
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let config = self.config.snapshot();
        let ctx = SearchContext {
            config: &config,
            usage: &self.usage,
            credentials: self.credentials.as_ref(),
            registry: &self.registry,
            clock: self.clock.as_ref(),
            rotation: &self.rotation,
            cache: &self.cache,
        };
        orchestrate_search(&ctx, request).await
    }

    /// Merge `patch` into the active configuration.
    ///
    /// Cached results are dropped since they were produced under the old
    /// routing. Searches already in flight finish on their old snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Configuration`] if the merged document is
    /// invalid; the active configuration is unchanged in that case.
    pub fn update_config(&self, patch: ConfigPatch) -> Result<Arc<EngineConfig>> {
        let next = self.config.update(patch)?;
        self.cache.invalidate_all();
        Ok(next)
    }

    /// Replace the whole configuration document.
    pub fn replace_config(&self, config: EngineConfig) -> Result<Arc<EngineConfig>> {
        let next = self.config.replace(config)?;
        self.cache.invalidate_all();
        Ok(next)
    }

    pub fn config(&self) -> Arc<EngineConfig> {
        self.config.snapshot()
    }

    /// Copy of the current usage and health state.
    pub fn get_usage_stats(&self) -> UsageState {
        self.usage.snapshot()
    }

    pub fn reset_daily_usage(&self) {
        self.usage.reset_daily_usage();
    }

    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    /// Run one health sweep now with `probe`, outside the background loop.
    pub async fn check_health_now(&self, probe: Arc<dyn HealthProbe>) -> SweepReport {
        HealthMonitor::new(Arc::clone(&self.config), Arc::clone(&self.usage), probe)
            .check_all()
            .await
    }

    /// Spawn the background health monitor on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::System`] if a monitor is already running.
    pub fn start(&self, probe: Arc<dyn HealthProbe>, interval: Duration) -> Result<()> {
        let mut slot = self.monitor.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(RouterError::System("health monitor already running".into()));
        }
        let cancel = CancellationToken::new();
        let monitor = HealthMonitor::new(Arc::clone(&self.config), Arc::clone(&self.usage), probe)
            .with_interval(interval);
        let task = tokio::spawn(monitor.run(cancel.child_token()));
        *slot = Some(MonitorHandle { cancel, task });
        Ok(())
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stop the background monitor and wait for it to exit. A no-op if it
    /// was never started.
    pub async fn shutdown(&self) {
        let handle = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(MonitorHandle { cancel, task }) = handle {
            cancel.cancel();
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "health monitor task ended abnormally");
            }
            tracing::info!("search router shut down");
        }
    }
}

impl Drop for SearchRouter {
    fn drop(&mut self) {
        let slot = self.monitor.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::{CategoryConfig, HealthCheckConfig, KeyType, ProviderConfig, SelectionStrategy};
    use crate::credentials::Credential;
    use crate::registry::ProviderAdapter;
    use crate::types::ProviderHit;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl ProviderAdapter for Echo {
        async fn call(
            &self,
            provider: &ProviderConfig,
            query: &str,
            _credential: Option<&Credential>,
        ) -> Result<Vec<ProviderHit>> {
            Ok(vec![ProviderHit {
                title: format!("{query} via {}", provider.id),
                url: format!("https://{}.example/{query}", provider.id),
                confidence: 0.5,
                ..Default::default()
            }])
        }
    }

    struct AlwaysDown;

    #[async_trait]
    impl HealthProbe for AlwaysDown {
        async fn probe(&self, _provider: &ProviderConfig, _timeout: Duration) -> Result<()> {
            Err(RouterError::HealthCheckFailed("down".into()))
        }
    }

    fn config() -> EngineConfig {
        EngineConfig {
            categories: vec![CategoryConfig {
                id: "web".into(),
                label: "Web".into(),
                enabled: true,
                selection: SelectionStrategy::Weighted,
                max_parallel: 2,
                provider_ids: vec!["a".into(), "b".into()],
            }],
            providers: ["a", "b"]
                .into_iter()
                .map(|id| ProviderConfig {
                    id: id.into(),
                    label: id.into(),
                    category: "web".into(),
                    base_url: format!("https://{id}.example"),
                    key_type: KeyType::None,
                    trial_applies: false,
                    weight: None,
                    health: Some(HealthCheckConfig::default()),
                    quota: None,
                })
                .collect(),
            ..Default::default()
        }
    }

    fn router() -> SearchRouter {
        SearchRouter::new(
            config(),
            AdapterRegistry::new()
                .with("a", Arc::new(Echo))
                .with("b", Arc::new(Echo)),
        )
        .unwrap()
    }

    #[test]
    fn invalid_config_rejected_at_build() {
        let mut bad = config();
        bad.routing.timeout_ms = 0;
        assert!(SearchRouter::new(bad, AdapterRegistry::new()).is_err());
    }

    #[tokio::test]
    async fn search_routes_through_adapters() {
        let router = router();
        let response = router.search(&SearchRequest::new("tokio", "r1")).await.unwrap();
        assert_eq!(response.results.len(), 2);
        assert_eq!(router.get_usage_stats().daily_provider_calls.len(), 1);
    }

    #[tokio::test]
    async fn update_config_applies_to_next_search() {
        let router = router();
        let mut categories = router.config().categories.clone();
        categories[0].provider_ids = vec!["b".into()];
        let next = router
            .update_config(ConfigPatch {
                categories: Some(categories),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(next.version, 1);

        let response = router.search(&SearchRequest::new("q", "r1")).await.unwrap();
        assert_eq!(response.sources_used.len(), 1);
        assert!(response.sources_used.contains("b"));
    }

    #[tokio::test]
    async fn rejected_update_keeps_active_config() {
        let router = router();
        let mut routing = router.config().routing.clone();
        routing.timeout_ms = 0;
        let result = router.update_config(ConfigPatch {
            routing: Some(routing),
            ..Default::default()
        });
        assert!(result.is_err());
        assert_eq!(router.config().routing.timeout_ms, 8_000);
        assert_eq!(router.config().version, 0);
    }

    #[tokio::test]
    async fn health_sweeps_remove_provider_from_selection() {
        let router = router();
        for _ in 0..3 {
            router.check_health_now(Arc::new(AlwaysDown)).await;
        }
        let response = router.search(&SearchRequest::new("q", "r1")).await.unwrap();
        assert!(response.results.is_empty());
        assert!(response.sources_used.is_empty());
        assert!(!router.get_usage_stats().provider_health["a"].is_healthy);
    }

    #[tokio::test]
    async fn start_twice_fails_and_shutdown_stops_monitor() {
        let router = router();
        router
            .start(Arc::new(AlwaysDown), Duration::from_secs(60))
            .unwrap();
        assert!(router.is_monitoring());
        assert!(router
            .start(Arc::new(AlwaysDown), Duration::from_secs(60))
            .is_err());

        router.shutdown().await;
        assert!(!router.is_monitoring());
        // A second shutdown is harmless.
        router.shutdown().await;
    }
}
