//! Concrete provider adapters and registry assembly.
//!
//! Each provider in the routing document gets one adapter, chosen from its
//! `base_url`: DuckDuckGo's HTML endpoint gets the scraper, everything else
//! the generic JSON adapter.

pub mod duckduckgo;
pub mod http;
pub mod json_api;

use std::sync::Arc;

use switchyard_router::config::ProviderConfig;
use switchyard_router::{AdapterRegistry, EngineConfig, ProviderAdapter};
use url::Url;

pub use duckduckgo::DuckDuckGoAdapter;
pub use json_api::JsonApiAdapter;

/// Which adapter implementation serves a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    DuckDuckGoHtml,
    JsonApi,
}

impl AdapterKind {
    /// Pick the adapter for `provider` from its endpoint host.
    pub fn for_provider(provider: &ProviderConfig) -> Self {
        let is_ddg = Url::parse(&provider.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .is_some_and(|host| host == "duckduckgo.com" || host.ends_with(".duckduckgo.com"));
        if is_ddg {
            Self::DuckDuckGoHtml
        } else {
            Self::JsonApi
        }
    }
}

/// Register an adapter for every provider in `config`, sharing `client`.
///
/// Providers added later through a config update have no adapter until the
/// host restarts; calls to them fail with a provider-call error.
pub fn build_registry(config: &EngineConfig, client: reqwest::Client) -> AdapterRegistry {
    let ddg: Arc<dyn ProviderAdapter> = Arc::new(DuckDuckGoAdapter::new(client.clone()));
    let json: Arc<dyn ProviderAdapter> = Arc::new(JsonApiAdapter::new(client));

    let mut registry = AdapterRegistry::new();
    for provider in &config.providers {
        let kind = AdapterKind::for_provider(provider);
        let adapter = match kind {
            AdapterKind::DuckDuckGoHtml => Arc::clone(&ddg),
            AdapterKind::JsonApi => Arc::clone(&json),
        };
        tracing::debug!(provider = %provider.id, ?kind, "adapter registered");
        registry.register(provider.id.clone(), adapter);
    }
    registry
}
