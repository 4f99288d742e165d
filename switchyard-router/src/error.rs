//! Error types for the switchyard-router crate.
//!
//! All errors use stable string messages suitable for display to users
//! and programmatic handling. No credentials or query text appear in
//! error messages.

/// Errors that can occur while routing a search.
///
/// Only [`RouterError::Configuration`] ever escapes
/// [`SearchRouter::search`](crate::SearchRouter::search); every other
/// variant is converted into a per-provider
/// [`SearchError`](crate::types::SearchError) entry on the response.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// No enabled category survived resolution, or the routing document is
    /// internally inconsistent.
    #[error("config error: {0}")]
    Configuration(String),

    /// The routing document could not be read or parsed.
    #[error("config load error: {0}")]
    ConfigLoad(String),

    /// A provider's trial or daily quota is used up.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// A provider is marked unhealthy by the health monitor.
    #[error("health check failed: {0}")]
    HealthCheckFailed(String),

    /// A provider adapter returned an error.
    #[error("provider call failed: {0}")]
    ProviderCall(String),

    /// A provider call did not finish before the search deadline.
    #[error("search timed out: {0}")]
    Timeout(String),

    /// An unexpected internal fault.
    #[error("system error: {0}")]
    System(String),
}

impl RouterError {
    /// Returns `true` for the timeout variant.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Convenience type alias for switchyard-router results.
pub type Result<T> = std::result::Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_configuration() {
        let err = RouterError::Configuration("no enabled categories".into());
        assert_eq!(err.to_string(), "config error: no enabled categories");
    }

    #[test]
    fn display_config_load() {
        let err = RouterError::ConfigLoad("missing file".into());
        assert_eq!(err.to_string(), "config load error: missing file");
    }

    #[test]
    fn display_provider_call() {
        let err = RouterError::ProviderCall("connection refused".into());
        assert_eq!(err.to_string(), "provider call failed: connection refused");
    }

    #[test]
    fn display_timeout() {
        let err = RouterError::Timeout("exceeded 8000ms deadline".into());
        assert_eq!(err.to_string(), "search timed out: exceeded 8000ms deadline");
        assert!(err.is_timeout());
    }

    #[test]
    fn display_quota_and_health() {
        let quota = RouterError::QuotaExceeded("news".into());
        let health = RouterError::HealthCheckFailed("gnews".into());
        assert_eq!(quota.to_string(), "quota exceeded: news");
        assert_eq!(health.to_string(), "health check failed: gnews");
        assert!(!quota.is_timeout());
    }

    #[test]
    fn display_system() {
        let err = RouterError::System("task panicked".into());
        assert_eq!(err.to_string(), "system error: task panicked");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RouterError>();
    }
}
