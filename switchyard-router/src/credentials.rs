//! Credential lookup consumed by provider selection and adapters.
//!
//! Storage and encryption of credentials live outside this crate; the
//! router only asks whether a credential exists and hands the opaque value
//! to adapters.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

/// An opaque credential value. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw secret, for adapters building requests.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Lookup of per-provider credentials held by the caller.
pub trait CredentialStore: Send + Sync {
    /// Returns the credential for `provider_id`, if one is held.
    fn get_credential(&self, provider_id: &str) -> Option<Credential>;

    /// Whether a credential for `provider_id` is held.
    fn has_credential(&self, provider_id: &str) -> bool {
        self.get_credential(provider_id).is_some()
    }
}

/// A store that holds nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCredentials;

impl CredentialStore for NoCredentials {
    fn get_credential(&self, _provider_id: &str) -> Option<Credential> {
        None
    }
}

/// In-process credential map, mainly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    entries: RwLock<HashMap<String, Credential>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(self, provider_id: &str, value: &str) -> Self {
        self.insert(provider_id, value);
        self
    }

    pub fn insert(&self, provider_id: &str, value: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider_id.to_owned(), Credential::new(value));
    }

    pub fn remove(&self, provider_id: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(provider_id);
    }
}

impl CredentialStore for MemoryCredentials {
    fn get_credential(&self, provider_id: &str) -> Option<Credential> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secret() {
        let cred = Credential::new("sk-secret");
        let debug = format!("{cred:?}");
        assert!(!debug.contains("sk-secret"));
        assert_eq!(cred.expose(), "sk-secret");
    }

    #[test]
    fn memory_store_insert_and_remove() {
        let store = MemoryCredentials::new().with("newsapi", "key-1");
        assert!(store.has_credential("newsapi"));
        assert!(!store.has_credential("gnews"));
        store.remove("newsapi");
        assert!(!store.has_credential("newsapi"));
    }

    #[test]
    fn no_credentials_holds_nothing() {
        assert!(!NoCredentials.has_credential("anything"));
    }
}
