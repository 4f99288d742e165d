//! Provider credential lookup backed by the OS keyring.
//!
//! Each provider's key lives in the platform credential store under the
//! service [`SERVICE_NAME`] with the provider id as account. An environment
//! variable `SWITCHYARD_KEY_<PROVIDER_ID>` takes precedence, which is how
//! headless deployments and CI supply keys.

use switchyard_router::{Credential, CredentialStore};

use crate::error::{HostError, Result};

/// Keyring service name for all switchyard provider keys.
pub const SERVICE_NAME: &str = "com.saorsalabs.switchyard";

/// Prefix of the per-provider override environment variable.
const ENV_PREFIX: &str = "SWITCHYARD_KEY_";

/// Environment variable consulted for `provider_id`, e.g.
/// `news-api` → `SWITCHYARD_KEY_NEWS_API`.
#[must_use]
pub fn env_var_name(provider_id: &str) -> String {
    let suffix: String = provider_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{ENV_PREFIX}{suffix}")
}

/// Credential store reading environment overrides, then the OS keyring.
#[derive(Clone)]
pub struct KeyringCredentials {
    service: String,
    env: fn(&str) -> Option<String>,
}

impl std::fmt::Debug for KeyringCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringCredentials")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl Default for KeyringCredentials {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl KeyringCredentials {
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            env: |name| std::env::var(name).ok(),
        }
    }

    /// Replace the environment lookup.
    #[must_use]
    pub fn with_env_lookup(mut self, env: fn(&str) -> Option<String>) -> Self {
        self.env = env;
        self
    }

    /// Store `value` as the key for `provider_id`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Credential`] if the keyring rejects the write.
    pub fn store(&self, provider_id: &str, value: &str) -> Result<()> {
        let entry = keyring::Entry::new(&self.service, provider_id)
            .map_err(|e| HostError::Credential(format!("keyring entry for `{provider_id}`: {e}")))?;
        entry
            .set_password(value)
            .map_err(|e| HostError::Credential(format!("failed to store key for `{provider_id}`: {e}")))
    }

    /// Remove the key for `provider_id`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Credential`] on any keyring failure other than a
    /// missing entry.
    pub fn delete(&self, provider_id: &str) -> Result<()> {
        let entry = keyring::Entry::new(&self.service, provider_id)
            .map_err(|e| HostError::Credential(format!("keyring entry for `{provider_id}`: {e}")))?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(HostError::Credential(format!(
                "failed to delete key for `{provider_id}`: {e}"
            ))),
        }
    }

    fn from_keyring(&self, provider_id: &str) -> Option<String> {
        let entry = match keyring::Entry::new(&self.service, provider_id) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(provider = provider_id, error = %e, "keyring entry unavailable");
                return None;
            }
        };
        match entry.get_password() {
            Ok(value) => Some(value),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                tracing::warn!(provider = provider_id, error = %e, "keyring lookup failed");
                None
            }
        }
    }
}

impl CredentialStore for KeyringCredentials {
    fn get_credential(&self, provider_id: &str) -> Option<Credential> {
        if let Some(value) = (self.env)(&env_var_name(provider_id)).filter(|v| !v.trim().is_empty()) {
            return Some(Credential::new(value));
        }
        self.from_keyring(provider_id).map(Credential::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_env(name: &str) -> Option<String> {
        match name {
            "SWITCHYARD_KEY_NEWS_API" => Some("env-secret".into()),
            _ => None,
        }
    }

    #[test]
    fn env_var_names_are_sanitised() {
        assert_eq!(env_var_name("news-api"), "SWITCHYARD_KEY_NEWS_API");
        assert_eq!(env_var_name("semantic.scholar"), "SWITCHYARD_KEY_SEMANTIC_SCHOLAR");
        assert_eq!(env_var_name("gnews2"), "SWITCHYARD_KEY_GNEWS2");
    }

    #[test]
    fn environment_override_wins() {
        let store = KeyringCredentials::new("switchyard.test").with_env_lookup(fake_env);
        let credential = store.get_credential("news-api").expect("env credential");
        assert_eq!(credential.expose(), "env-secret");
        assert!(store.has_credential("news-api"));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let store = KeyringCredentials::new("switchyard.test").with_env_lookup(fake_env);
        let credential = store.get_credential("news-api").expect("env credential");
        assert!(!format!("{credential:?}").contains("env-secret"));
    }

    #[test]
    #[ignore] // Requires a platform keyring, run manually
    fn store_retrieve_delete() {
        let store = KeyringCredentials::new("switchyard.test").with_env_lookup(|_| None);
        store.store("manual-provider", "secret-12345").expect("store");
        assert_eq!(
            store
                .get_credential("manual-provider")
                .map(|c| c.expose().to_owned()),
            Some("secret-12345".to_owned())
        );
        store.delete("manual-provider").expect("delete");
        assert!(store.get_credential("manual-provider").is_none());
    }
}
