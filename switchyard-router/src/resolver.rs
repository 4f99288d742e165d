//! Resolves which categories a search covers.
//!
//! Starts from every enabled category, then narrows by the role's
//! `enabled_categories` and by the caller's requested categories.

use std::collections::BTreeSet;

use crate::config::EngineConfig;

/// Computes the enabled category set for a role and an optional filter.
#[derive(Debug, Clone, Copy)]
pub struct CategoryResolver<'a> {
    config: &'a EngineConfig,
}

impl<'a> CategoryResolver<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Categories to search, in declared order. Empty when nothing survives.
    pub fn resolve(&self, role_id: &str, requested: Option<&BTreeSet<String>>) -> Vec<String> {
        let role_filter = self
            .config
            .role_override(role_id)
            .and_then(|o| o.enabled_categories.as_ref());

        self.config
            .categories
            .iter()
            .filter(|c| c.enabled)
            .filter(|c| role_filter.is_none_or(|allowed| allowed.contains(&c.id)))
            .filter(|c| requested.is_none_or(|wanted| wanted.contains(&c.id)))
            .map(|c| c.id.clone())
            .collect()
    }
}
