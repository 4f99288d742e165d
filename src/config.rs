//! Routing config file location and loading for the host.
//!
//! The host reads one TOML [`EngineConfig`] document. When no file exists a
//! built-in document is used: a single keyless web category backed by
//! DuckDuckGo, so the binary works with zero setup.

use std::path::{Path, PathBuf};

use switchyard_router::config::{
    CategoryConfig, HealthCheckConfig, KeyType, ProviderConfig, SelectionStrategy,
};
use switchyard_router::EngineConfig;

use crate::error::{HostError, Result};

/// File name of the routing document inside [`config_dir`].
pub const CONFIG_FILE_NAME: &str = "routing.toml";

/// Host config directory.
///
/// Resolves to `dirs::config_dir()/switchyard/`. Override with the
/// `SWITCHYARD_CONFIG_DIR` environment variable.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("SWITCHYARD_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("switchyard"))
        .unwrap_or_else(|| PathBuf::from("/tmp/switchyard-config"))
}

/// Default routing document path.
#[must_use]
pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Load the routing document at `path`, or the built-in one if the file does
/// not exist.
///
/// # Errors
///
/// Returns [`HostError::Router`] if the file exists but cannot be read,
/// parsed, or validated.
pub fn load_or_builtin(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no routing config found; using built-in defaults");
        return Ok(builtin_config());
    }
    let config = EngineConfig::from_file(path)?;
    tracing::info!(
        path = %path.display(),
        version = config.version,
        categories = config.categories.len(),
        providers = config.providers.len(),
        "routing config loaded"
    );
    Ok(config)
}

/// Write `config` to `path` as TOML, creating parent directories.
///
/// # Errors
///
/// Returns [`HostError::Config`] if the directory or file cannot be written.
pub fn save(config: &EngineConfig, path: &Path) -> Result<()> {
    let content = config.to_toml_string()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| HostError::Config(format!("cannot create {}: {e}", parent.display())))?;
    }
    std::fs::write(path, content)
        .map_err(|e| HostError::Config(format!("cannot write {}: {e}", path.display())))
}

/// Zero-setup routing document: one keyless web provider.
#[must_use]
pub fn builtin_config() -> EngineConfig {
    EngineConfig {
        categories: vec![CategoryConfig {
            id: "web".into(),
            label: "Web".into(),
            enabled: true,
            selection: SelectionStrategy::Weighted,
            max_parallel: 1,
            provider_ids: vec!["duckduckgo".into()],
        }],
        providers: vec![ProviderConfig {
            id: "duckduckgo".into(),
            label: "DuckDuckGo".into(),
            category: "web".into(),
            base_url: "https://html.duckduckgo.com/html/".into(),
            key_type: KeyType::None,
            trial_applies: false,
            weight: None,
            health: Some(HealthCheckConfig::default()),
            quota: None,
        }],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_is_valid() {
        let config = builtin_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.fallback_chain().len(), 1);
    }

    #[test]
    fn missing_file_falls_back_to_builtin() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_or_builtin(&dir.path().join("absent.toml")).expect("builtin");
        assert_eq!(config, builtin_config());
    }

    #[test]
    fn save_then_load_preserves_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let mut config = builtin_config();
        config.routing.timeout_ms = 2_500;
        config.routing.cache_ttl_sec.insert("web".into(), 120);

        save(&config, &path).expect("save");
        let loaded = load_or_builtin(&path).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[routing]\ntimeout_ms = 0\n").expect("write");
        let err = load_or_builtin(&path).unwrap_err();
        assert!(err.to_string().contains("timeout_ms"));
    }

    #[test]
    fn default_path_ends_with_file_name() {
        assert!(default_config_path().ends_with(CONFIG_FILE_NAME));
    }
}
