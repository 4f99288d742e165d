//! Generic adapter for JSON search APIs.
//!
//! Sends `GET {base_url}?q={query}` and expects either a bare array of hits
//! or an object with a `results` array, each entry shaped like
//! [`ProviderHit`]. When a credential is held it is sent as a bearer token.

use async_trait::async_trait;
use serde::Deserialize;
use switchyard_router::config::ProviderConfig;
use switchyard_router::{Credential, ProviderAdapter, ProviderHit, RouterError};

/// Accepted response shapes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HitsPayload {
    Bare(Vec<ProviderHit>),
    Wrapped { results: Vec<ProviderHit> },
}

impl HitsPayload {
    fn into_hits(self) -> Vec<ProviderHit> {
        match self {
            Self::Bare(hits) | Self::Wrapped { results: hits } => hits,
        }
    }
}

/// JSON-over-HTTP provider adapter.
#[derive(Debug, Clone)]
pub struct JsonApiAdapter {
    client: reqwest::Client,
}

impl JsonApiAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter for JsonApiAdapter {
    async fn call(
        &self,
        provider: &ProviderConfig,
        query: &str,
        credential: Option<&Credential>,
    ) -> Result<Vec<ProviderHit>, RouterError> {
        if provider.base_url.is_empty() {
            return Err(RouterError::ProviderCall(format!(
                "`{}` has no base_url",
                provider.id
            )));
        }
        tracing::trace!(query, provider = %provider.id, "JSON API search");

        let mut request = self
            .client
            .get(&provider.base_url)
            .query(&[("q", query)])
            .header("Accept", "application/json");
        if let Some(credential) = credential {
            request = request.bearer_auth(credential.expose());
        }

        let response = request
            .send()
            .await
            .map_err(|e| RouterError::ProviderCall(format!("{} request failed: {e}", provider.id)))?;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(RouterError::QuotaExceeded(format!(
                "{} rate limited the request",
                provider.id
            )));
        }
        if !status.is_success() {
            return Err(RouterError::ProviderCall(format!(
                "{} returned HTTP {}",
                provider.id,
                status.as_u16()
            )));
        }

        let payload: HitsPayload = response.json().await.map_err(|e| {
            RouterError::ProviderCall(format!("{} returned malformed JSON: {e}", provider.id))
        })?;
        let hits = payload.into_hits();
        tracing::debug!(provider = %provider.id, count = hits.len(), "JSON API results parsed");
        Ok(hits)
    }
}
