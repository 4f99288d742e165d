//! Routing configuration and the hot-swappable [`ConfigStore`].
//!
//! An [`EngineConfig`] is the whole versioned routing document: global
//! routing policy, categories, providers, trial quotas, and per-role
//! overrides. It is parsed from TOML, validated, and then treated as
//! immutable. Updates build a new document and swap it in wholesale.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};

/// Weight assumed for providers that declare none.
pub const DEFAULT_PROVIDER_WEIGHT: f64 = 10.0;

/// Default health probe timeout in milliseconds.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;

/// How many providers a category may use per search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryPolicy {
    /// Only the top-ranked provider of each category is called.
    OnePerCategory,
    /// Up to `max_parallel` providers are called concurrently.
    #[default]
    Parallel,
}

/// What to do when normal routing produced no results at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Cascade through keyless fallback providers one at a time.
    #[default]
    NextAvailable,
    /// Cascade, but only through trial-eligible providers with quota left.
    TrialOnly,
    /// Return the empty result set.
    None,
}

/// Provider ordering strategy within a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Descending by weight (role override, then provider, then default).
    #[default]
    Weighted,
    /// Role pins first, then declared order.
    Priority,
    /// Declared order rotated by a moving offset.
    RoundRobin,
}

/// How the round-robin offset advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationMode {
    /// Offset is `floor(now / 60s)`.
    #[default]
    PerMinute,
    /// Offset is a per-category counter bumped on every selection.
    PerCall,
}

/// Credential requirement of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    /// Public provider, no credential.
    #[default]
    None,
    /// Caller brings their own API key.
    Byok,
    /// Caller authorises through OAuth.
    Oauth,
}

/// Global routing policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub category_policy: CategoryPolicy,
    pub fallback: FallbackPolicy,
    /// Deadline for a whole search call.
    pub timeout_ms: u64,
    /// Result cache lifetime per category. Absent or zero disables caching.
    pub cache_ttl_sec: BTreeMap<String, u64>,
    /// Ordered fallback cascade. Empty means every keyless provider in
    /// declared order.
    pub fallback_providers: Vec<String>,
    pub round_robin: RotationMode,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            category_policy: CategoryPolicy::Parallel,
            fallback: FallbackPolicy::NextAvailable,
            timeout_ms: 8_000,
            cache_ttl_sec: BTreeMap::new(),
            fallback_providers: Vec::new(),
            round_robin: RotationMode::PerMinute,
        }
    }
}

/// A logical group of providers returning the same kind of result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub selection: SelectionStrategy,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Candidate providers in declared order.
    #[serde(default)]
    pub provider_ids: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_max_parallel() -> usize {
    3
}

/// Connectivity probe settings for a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Probe target. Defaults to the provider's `base_url`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
        }
    }
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

/// Provider-wide call cap shared by every caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default)]
    pub daily_limit: Option<u32>,
}

/// One external search or data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub category: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub key_type: KeyType,
    #[serde(default)]
    pub trial_applies: bool,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub health: Option<HealthCheckConfig>,
    #[serde(default)]
    pub quota: Option<QuotaConfig>,
}

impl ProviderConfig {
    /// Whether the provider can only ever be used with the caller's own key.
    pub fn is_byok_only(&self) -> bool {
        self.key_type == KeyType::Byok && !self.trial_applies
    }

    /// Whether the provider needs no credential at all.
    pub fn is_keyless(&self) -> bool {
        self.key_type == KeyType::None
    }

    /// URL the health monitor should probe.
    pub fn probe_url(&self) -> Option<&str> {
        let health = self.health.as_ref()?;
        let url = health.url.as_deref().unwrap_or(&self.base_url);
        (!url.is_empty()).then_some(url)
    }
}

/// Free, credential-less daily allotment per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    pub enabled: bool,
    pub per_user_daily_by_category: BTreeMap<String, u32>,
}

impl TrialConfig {
    /// Daily trial limit for `category`; `None` means unlimited.
    pub fn limit_for(&self, category: &str) -> Option<u32> {
        if !self.enabled {
            return None;
        }
        self.per_user_daily_by_category.get(category).copied()
    }
}

/// Per-role customisation of category and provider eligibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleOverride {
    pub enabled_categories: Option<BTreeSet<String>>,
    pub pin: Option<Vec<String>>,
    pub weights: Option<HashMap<String, f64>>,
    pub disable: Option<BTreeSet<String>>,
}

impl RoleOverride {
    /// Whether this role has disabled `provider_id`.
    pub fn disables(&self, provider_id: &str) -> bool {
        self.disable
            .as_ref()
            .is_some_and(|set| set.contains(provider_id))
    }

    /// Weight override for `provider_id`, if any.
    pub fn weight_for(&self, provider_id: &str) -> Option<f64> {
        self.weights.as_ref()?.get(provider_id).copied()
    }
}

/// The complete versioned routing document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub version: u64,
    pub routing: RoutingConfig,
    pub categories: Vec<CategoryConfig>,
    pub providers: Vec<ProviderConfig>,
    pub trial: TrialConfig,
    pub role_overrides: HashMap<String, RoleOverride>,
}

impl EngineConfig {
    /// Parse and validate a TOML routing document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| RouterError::ConfigLoad(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML routing document from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RouterError::ConfigLoad(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Serialise to pretty TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RouterError::ConfigLoad(e.to_string()))
    }

    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `routing.timeout_ms` must be greater than 0
    /// - category and provider ids must be unique
    /// - every category's `provider_ids` must name a declared provider
    /// - enabled categories must allow at least one parallel call
    /// - provider weights must be finite and non-negative
    pub fn validate(&self) -> Result<()> {
        if self.routing.timeout_ms == 0 {
            return Err(RouterError::Configuration(
                "routing.timeout_ms must be greater than 0".into(),
            ));
        }

        let mut provider_ids = BTreeSet::new();
        for provider in &self.providers {
            if !provider_ids.insert(provider.id.as_str()) {
                return Err(RouterError::Configuration(format!(
                    "duplicate provider id `{}`",
                    provider.id
                )));
            }
            if let Some(weight) = provider.weight {
                if !weight.is_finite() || weight < 0.0 {
                    return Err(RouterError::Configuration(format!(
                        "provider `{}` has invalid weight",
                        provider.id
                    )));
                }
            }
        }

        let mut category_ids = BTreeSet::new();
        for category in &self.categories {
            if !category_ids.insert(category.id.as_str()) {
                return Err(RouterError::Configuration(format!(
                    "duplicate category id `{}`",
                    category.id
                )));
            }
            if category.enabled && category.max_parallel == 0 {
                return Err(RouterError::Configuration(format!(
                    "category `{}` max_parallel must be greater than 0",
                    category.id
                )));
            }
            for id in &category.provider_ids {
                if !provider_ids.contains(id.as_str()) {
                    return Err(RouterError::Configuration(format!(
                        "category `{}` references unknown provider `{id}`",
                        category.id
                    )));
                }
            }
        }

        for id in &self.routing.fallback_providers {
            if !provider_ids.contains(id.as_str()) {
                return Err(RouterError::Configuration(format!(
                    "fallback references unknown provider `{id}`"
                )));
            }
        }
        Ok(())
    }

    /// Look up a provider by id.
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Look up a category by id.
    pub fn category(&self, id: &str) -> Option<&CategoryConfig> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// Override for `role_id`, if one is declared.
    pub fn role_override(&self, role_id: &str) -> Option<&RoleOverride> {
        self.role_overrides.get(role_id)
    }

    /// Providers the fallback cascade walks, in order.
    pub fn fallback_chain(&self) -> Vec<&ProviderConfig> {
        if self.routing.fallback_providers.is_empty() {
            return self.providers.iter().filter(|p| p.is_keyless()).collect();
        }
        self.routing
            .fallback_providers
            .iter()
            .filter_map(|id| self.provider(id))
            .filter(|p| p.is_keyless())
            .collect()
    }
}

/// A partial update applied by [`ConfigStore::update`].
///
/// Each present field replaces the corresponding section of the current
/// document; absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub routing: Option<RoutingConfig>,
    pub categories: Option<Vec<CategoryConfig>>,
    pub providers: Option<Vec<ProviderConfig>>,
    pub trial: Option<TrialConfig>,
    pub role_overrides: Option<HashMap<String, RoleOverride>>,
}

/// Holds the active [`EngineConfig`] and swaps it atomically.
///
/// Readers take an `Arc` snapshot that stays consistent for the whole
/// search even if an update lands mid-flight.
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<Arc<EngineConfig>>,
}

impl ConfigStore {
    /// Create a store holding a validated `config`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(config)),
        })
    }

    /// Current configuration snapshot.
    pub fn snapshot(&self) -> Arc<EngineConfig> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the whole document. The version is bumped past the current one
    /// if the new document does not already carry a newer version.
    pub fn replace(&self, mut config: EngineConfig) -> Result<Arc<EngineConfig>> {
        config.validate()?;
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if config.version <= guard.version {
            config.version = guard.version + 1;
        }
        let next = Arc::new(config);
        *guard = Arc::clone(&next);
        tracing::info!(version = next.version, "routing config replaced");
        Ok(next)
    }

    /// Merge `patch` over the current document and swap in the result.
    ///
    /// The current document is left untouched if the merged one fails
    /// validation.
    pub fn update(&self, patch: ConfigPatch) -> Result<Arc<EngineConfig>> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = EngineConfig::clone(&guard);
        if let Some(routing) = patch.routing {
            next.routing = routing;
        }
        if let Some(categories) = patch.categories {
            next.categories = categories;
        }
        if let Some(providers) = patch.providers {
            next.providers = providers;
        }
        if let Some(trial) = patch.trial {
            next.trial = trial;
        }
        if let Some(role_overrides) = patch.role_overrides {
            next.role_overrides = role_overrides;
        }
        next.version = guard.version + 1;
        next.validate()?;

        let next = Arc::new(next);
        *guard = Arc::clone(&next);
        tracing::info!(version = next.version, "routing config updated");
        Ok(next)
    }
}
