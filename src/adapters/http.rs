//! Shared HTTP client with User-Agent rotation for provider requests.

use rand::seq::SliceRandom;
use std::time::Duration;

use crate::error::{HostError, Result};

/// Realistic browser User-Agent strings, rotated per client.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
];

/// Per-request ceiling for adapters. The router's search deadline usually
/// fires first.
pub const ADAPTER_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the [`reqwest::Client`] shared by all adapters.
///
/// Cookies are kept (some HTML endpoints set consent cookies), responses
/// are transparently decompressed, and redirects are capped at 10.
///
/// # Errors
///
/// Returns [`HostError::Config`] if the client cannot be constructed.
pub fn build_client(user_agent: Option<&str>) -> Result<reqwest::Client> {
    let ua = user_agent.unwrap_or_else(|| random_user_agent());
    reqwest::Client::builder()
        .cookie_store(true)
        .timeout(ADAPTER_TIMEOUT)
        .user_agent(ua)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| HostError::Config(format!("failed to build HTTP client: {e}")))
}

/// Select a random User-Agent string from the rotation list.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0])
}
