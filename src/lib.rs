//! # switchyard
//!
//! Host process for the [`switchyard_router`] search routing engine.
//!
//! The engine is an in-process library; this crate supplies what a running
//! deployment needs around it:
//!
//! - concrete provider adapters (a JSON API adapter and a keyless
//!   DuckDuckGo HTML adapter), in [`adapters`]
//! - provider keys from the OS keyring with environment overrides, in
//!   [`credentials`]
//! - routing document loading from the platform config directory, in
//!   [`config`]
//! - a newline-delimited JSON bridge for driving the router from another
//!   process, in [`bridge`]

pub mod adapters;
pub mod bridge;
pub mod config;
pub mod credentials;
pub mod error;

use std::path::Path;
use std::sync::Arc;

use switchyard_router::SearchRouter;

pub use error::{HostError, Result};

/// Load the routing document at `config_path` (or the built-in one) and
/// build a router with keyring credentials and the bundled adapters.
///
/// # Errors
///
/// Returns an error if the config is invalid or the HTTP client cannot be
/// built.
pub fn build_router(config_path: &Path) -> Result<SearchRouter> {
    let config = config::load_or_builtin(config_path)?;
    let client = adapters::http::build_client(None)?;
    let registry = adapters::build_registry(&config, client);
    let router = SearchRouter::builder(config)
        .registry(registry)
        .credentials(Arc::new(credentials::KeyringCredentials::default()))
        .build()?;
    Ok(router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_router_from_missing_path_uses_builtin() {
        let dir = tempfile::tempdir().expect("tempdir");
        let router = build_router(&dir.path().join("routing.toml")).expect("router");
        assert_eq!(router.config().providers[0].id, "duckduckgo");
    }
}
