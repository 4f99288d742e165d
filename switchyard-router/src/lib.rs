//! # switchyard-router
//!
//! Quota- and health-aware search routing for assistant roles.
//!
//! A search names a role and optionally a set of categories (web, news,
//! academic, ...). For each category the router picks eligible providers,
//! calls them concurrently under one deadline, falls back to keyless
//! providers when nothing comes back, then deduplicates and ranks the
//! merged results.
//!
//! ## Design
//!
//! - Routing is driven by a versioned [`EngineConfig`] document that can be
//!   patched at runtime without restarting
//! - Provider eligibility accounts for credentials, trial quotas, role
//!   overrides, and probe-driven health
//! - Provider I/O goes through the [`ProviderAdapter`] trait; this crate
//!   performs no provider HTTP itself beyond health probes
//! - Provider failures never fail the search; they are reported per
//!   provider in [`SearchResponse::errors`]
//!
//! ## Security
//!
//! - Credentials are read through [`CredentialStore`] and never logged
//! - Query text is logged only at trace level
//!
//! ## Example
//!
//! ```no_run
//! # async fn example() -> switchyard_router::Result<()> {
//! use std::sync::Arc;
//! use switchyard_router::{AdapterRegistry, EngineConfig, SearchRequest, SearchRouter};
//!
//! let config = EngineConfig::from_file(std::path::Path::new("routing.toml"))?;
//! let router = SearchRouter::new(config, AdapterRegistry::new())?;
//! let response = router.search(&SearchRequest::new("rust async", "researcher")).await?;
//! for result in &response.results {
//!     println!("[{}] {}: {}", result.category, result.title, result.url);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod health;
pub mod monitor;
pub mod orchestrator;
pub mod ranking;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod selector;
pub mod types;
pub mod usage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigPatch, EngineConfig};
pub use credentials::{Credential, CredentialStore, MemoryCredentials, NoCredentials};
pub use error::{Result, RouterError};
pub use health::ProviderHealth;
pub use monitor::{HealthMonitor, HealthProbe, HttpHealthProbe};
pub use registry::{AdapterRegistry, ProviderAdapter};
pub use router::{SearchRouter, SearchRouterBuilder};
pub use types::{ProviderHit, SearchError, SearchRequest, SearchResponse, SearchResult};
pub use usage::UsageState;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_router_builds() {
        let router = SearchRouter::new(EngineConfig::default(), AdapterRegistry::new());
        assert!(router.is_ok());
    }

    #[tokio::test]
    async fn search_without_categories_is_configuration_error() {
        let router = SearchRouter::new(EngineConfig::default(), AdapterRegistry::new()).unwrap();
        let err = router
            .search(&SearchRequest::new("test", "any-role"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("config error"));
    }
}
