//! Provider selection within a category.
//!
//! A provider is a candidate only when every condition holds:
//!
//! 1. its category is enabled;
//! 2. it needs no credential, the caller holds one, or the request allows
//!    trial sources and the provider is not BYOK-only;
//! 3. it has trial/daily quota remaining;
//! 4. it is not marked unhealthy;
//! 5. the requesting role has not disabled it.
//!
//! Survivors are then ordered by the category's [`SelectionStrategy`].

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::clock::Clock;
use crate::config::{
    EngineConfig, KeyType, ProviderConfig, RoleOverride, RotationMode, SelectionStrategy,
    DEFAULT_PROVIDER_WEIGHT,
};
use crate::credentials::CredentialStore;
use crate::types::SearchRequest;
use crate::usage::UsageTracker;

/// Per-category counters for [`RotationMode::PerCall`] round-robin.
#[derive(Debug, Default)]
pub struct RotationState {
    counters: Mutex<HashMap<String, usize>>,
}

impl RotationState {
    /// Returns the current offset for `category` and advances it.
    fn next(&self, category: &str) -> usize {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let counter = counters.entry(category.to_owned()).or_default();
        let current = *counter;
        *counter = counter.wrapping_add(1);
        current
    }
}

/// Filters and orders a category's providers for one request.
pub struct SourceSelector<'a> {
    config: &'a EngineConfig,
    usage: &'a UsageTracker,
    credentials: &'a dyn CredentialStore,
    clock: &'a dyn Clock,
    rotation: &'a RotationState,
}

impl<'a> SourceSelector<'a> {
    pub fn new(
        config: &'a EngineConfig,
        usage: &'a UsageTracker,
        credentials: &'a dyn CredentialStore,
        clock: &'a dyn Clock,
        rotation: &'a RotationState,
    ) -> Self {
        Self {
            config,
            usage,
            credentials,
            clock,
            rotation,
        }
    }

    /// Ordered provider ids to call for `category_id`.
    ///
    /// Unknown or disabled categories select nothing.
    pub fn select(&self, category_id: &str, request: &SearchRequest) -> Vec<String> {
        let Some(category) = self.config.category(category_id) else {
            return Vec::new();
        };
        if !category.enabled {
            return Vec::new();
        }
        let role = self.config.role_override(&request.role_id);

        let survivors: Vec<&ProviderConfig> = category
            .provider_ids
            .iter()
            .filter_map(|id| self.config.provider(id))
            .filter(|p| self.is_candidate(p, category_id, request, role))
            .collect();

        let ordered = match category.selection {
            SelectionStrategy::Weighted => order_weighted(survivors, role),
            SelectionStrategy::Priority => order_priority(survivors, role),
            SelectionStrategy::RoundRobin => {
                let offset = match self.config.routing.round_robin {
                    RotationMode::PerMinute => {
                        usize::try_from(self.clock.minute_index()).unwrap_or(0)
                    }
                    RotationMode::PerCall => self.rotation.next(category_id),
                };
                order_round_robin(survivors, offset)
            }
        };

        tracing::debug!(
            category = category_id,
            strategy = ?category.selection,
            selected = ?ordered,
            "providers selected"
        );
        ordered
    }

    fn is_candidate(
        &self,
        provider: &ProviderConfig,
        category_id: &str,
        request: &SearchRequest,
        role: Option<&RoleOverride>,
    ) -> bool {
        if role.is_some_and(|r| r.disables(&provider.id)) {
            return false;
        }
        if provider.key_type != KeyType::None
            && !self.credentials.has_credential(&provider.id)
            && !(request.include_trial_sources() && !provider.is_byok_only())
        {
            tracing::trace!(provider = %provider.id, "skipped: no credential");
            return false;
        }
        if !self
            .usage
            .has_quota_remaining_in(provider, category_id, &self.config.trial)
        {
            tracing::debug!(provider = %provider.id, category = category_id, "skipped: quota exhausted");
            return false;
        }
        if !self.usage.is_healthy(&provider.id) {
            tracing::debug!(provider = %provider.id, "skipped: unhealthy");
            return false;
        }
        true
    }
}

fn effective_weight(provider: &ProviderConfig, role: Option<&RoleOverride>) -> f64 {
    role.and_then(|r| r.weight_for(&provider.id))
        .or(provider.weight)
        .unwrap_or(DEFAULT_PROVIDER_WEIGHT)
}

/// Descending by weight; ties keep declared order.
fn order_weighted(mut providers: Vec<&ProviderConfig>, role: Option<&RoleOverride>) -> Vec<String> {
    providers.sort_by(|a, b| effective_weight(b, role).total_cmp(&effective_weight(a, role)));
    providers.into_iter().map(|p| p.id.clone()).collect()
}

/// Role pins first (pin order), then the rest in declared order.
fn order_priority(providers: Vec<&ProviderConfig>, role: Option<&RoleOverride>) -> Vec<String> {
    let mut ordered: Vec<String> = Vec::with_capacity(providers.len());
    if let Some(pins) = role.and_then(|r| r.pin.as_ref()) {
        for pin in pins {
            if providers.iter().any(|p| &p.id == pin) && !ordered.contains(pin) {
                ordered.push(pin.clone());
            }
        }
    }
    for provider in providers {
        if !ordered.contains(&provider.id) {
            ordered.push(provider.id.clone());
        }
    }
    ordered
}

/// Declared order rotated left by `offset mod len`.
fn order_round_robin(providers: Vec<&ProviderConfig>, offset: usize) -> Vec<String> {
    let mut ids: Vec<String> = providers.into_iter().map(|p| p.id.clone()).collect();
    if !ids.is_empty() {
        let shift = offset % ids.len();
        ids.rotate_left(shift);
    }
    ids
}
