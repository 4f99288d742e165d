//! Pluggable provider adapters and the id → adapter registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ProviderConfig;
use crate::credentials::Credential;
use crate::error::RouterError;
use crate::types::ProviderHit;

/// A pluggable provider backend.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Run `query` against the provider. `credential` is `None` for trial
    /// and keyless calls.
    async fn call(
        &self,
        provider: &ProviderConfig,
        query: &str,
        credential: Option<&Credential>,
    ) -> Result<Vec<ProviderHit>, RouterError>;
}

/// Maps provider ids to adapters.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.adapters.keys().collect();
        ids.sort();
        f.debug_struct("AdapterRegistry").field("providers", &ids).finish()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `adapter` for `provider_id`, replacing any previous one.
    pub fn register(&mut self, provider_id: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(provider_id.into(), adapter);
    }

    pub fn with(mut self, provider_id: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(provider_id, adapter);
        self
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider_id).cloned()
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.adapters.contains_key(provider_id)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Call the adapter registered for `provider`. A missing adapter is a
    /// [`RouterError::ProviderCall`].
    pub async fn call(
        &self,
        provider: &ProviderConfig,
        query: &str,
        credential: Option<&Credential>,
    ) -> Result<Vec<ProviderHit>, RouterError> {
        let adapter = self.get(&provider.id).ok_or_else(|| {
            RouterError::ProviderCall(format!("no adapter registered for `{}`", provider.id))
        })?;
        adapter.call(provider, query, credential).await
    }
}
