//! Newline-delimited JSON bridge exposing a [`SearchRouter`] over a byte
//! stream (stdin/stdout in the `switchyard-host` binary).
//!
//! Each input line is one [`BridgeRequest`]; each produces exactly one
//! [`BridgeResponse`] line. The writer is reserved for the protocol; all
//! diagnostics go through `tracing`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use switchyard_router::{ConfigPatch, HealthProbe, SearchRequest, SearchRouter};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{HostError, Result};

/// Contract version for bridge envelopes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Commands understood by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeCommand {
    #[serde(rename = "search")]
    Search,
    #[serde(rename = "usage.stats")]
    UsageStats,
    #[serde(rename = "usage.reset")]
    UsageReset,
    #[serde(rename = "health.check")]
    HealthCheck,
    #[serde(rename = "config.get")]
    ConfigGet,
    #[serde(rename = "config.patch")]
    ConfigPatch,
    #[serde(rename = "host.stop")]
    HostStop,
}

/// A versioned request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub v: u32,
    pub request_id: String,
    pub command: BridgeCommand,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl BridgeRequest {
    #[must_use]
    pub fn new(request_id: impl Into<String>, command: BridgeCommand, payload: serde_json::Value) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.v != PROTOCOL_VERSION {
            return Err(format!(
                "unsupported protocol version {}; expected {PROTOCOL_VERSION}",
                self.v
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err("request_id cannot be empty".to_owned());
        }
        Ok(())
    }
}

/// A versioned response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl BridgeResponse {
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// Dispatches bridge requests to a router.
pub struct Bridge {
    router: Arc<SearchRouter>,
    probe: Arc<dyn HealthProbe>,
}

impl Bridge {
    pub fn new(router: Arc<SearchRouter>, probe: Arc<dyn HealthProbe>) -> Self {
        Self { router, probe }
    }

    /// Handle one request.
    pub async fn dispatch(&self, request: BridgeRequest) -> BridgeResponse {
        if let Err(message) = request.validate() {
            return BridgeResponse::error(request.request_id, message);
        }
        let request_id = request.request_id.clone();
        match self.handle(request).await {
            Ok(payload) => BridgeResponse::ok(request_id, payload),
            Err(e) => {
                tracing::debug!(request_id = %request_id, error = %e, "bridge request failed");
                BridgeResponse::error(request_id, e.to_string())
            }
        }
    }

    async fn handle(&self, request: BridgeRequest) -> Result<serde_json::Value> {
        match request.command {
            BridgeCommand::Search => {
                let search: SearchRequest = from_payload(request.payload)?;
                let response = self.router.search(&search).await?;
                to_payload(&response)
            }
            BridgeCommand::UsageStats => Ok(serde_json::json!({
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "usage": to_payload(&self.router.get_usage_stats())?,
            })),
            BridgeCommand::UsageReset => {
                self.router.reset_daily_usage();
                Ok(serde_json::Value::Null)
            }
            BridgeCommand::HealthCheck => {
                let report = self.router.check_health_now(Arc::clone(&self.probe)).await;
                Ok(serde_json::json!({
                    "probed": report.probed,
                    "failed": report.failed,
                    "unhealthy": report.unhealthy,
                }))
            }
            BridgeCommand::ConfigGet => to_payload(&*self.router.config()),
            BridgeCommand::ConfigPatch => {
                let patch: ConfigPatch = from_payload(request.payload)?;
                let next = self.router.update_config(patch)?;
                Ok(serde_json::json!({ "version": next.version }))
            }
            BridgeCommand::HostStop => Ok(serde_json::Value::Null),
        }
    }

    /// Serve requests from `reader` until EOF or `host.stop`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Io`] if reading or writing the stream fails.
    pub async fn run<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                tracing::info!("input closed (EOF); shutting down bridge");
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: BridgeRequest = match serde_json::from_str(trimmed) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to parse bridge request");
                    let response =
                        BridgeResponse::error("parse-error", format!("failed to parse request: {e}"));
                    write_line(&mut writer, &response).await?;
                    continue;
                }
            };

            let is_stop = request.command == BridgeCommand::HostStop;
            let response = self.dispatch(request).await;
            write_line(&mut writer, &response).await?;

            if is_stop && response.ok {
                tracing::info!("host.stop received; shutting down bridge");
                break;
            }
        }
        Ok(())
    }
}

fn from_payload<T: serde::de::DeserializeOwned>(payload: serde_json::Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| HostError::Protocol(format!("invalid payload: {e}")))
}

fn to_payload<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| HostError::Protocol(format!("failed to serialize payload: {e}")))
}

/// Write one JSON line and flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, response: &BridgeResponse) -> Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| HostError::Protocol(format!("failed to serialize response: {e}")))?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use switchyard_router::config::{
        CategoryConfig, HealthCheckConfig, KeyType, ProviderConfig, SelectionStrategy,
    };
    use switchyard_router::{
        AdapterRegistry, Credential, EngineConfig, ProviderAdapter, ProviderHit, RouterError,
    };

    struct Fixed;

    #[async_trait]
    impl ProviderAdapter for Fixed {
        async fn call(
            &self,
            _provider: &ProviderConfig,
            query: &str,
            _credential: Option<&Credential>,
        ) -> std::result::Result<Vec<ProviderHit>, RouterError> {
            Ok(vec![ProviderHit {
                title: format!("About {query}"),
                url: "https://fixed.example/1".into(),
                confidence: 0.7,
                ..Default::default()
            }])
        }
    }

    struct Down;

    #[async_trait]
    impl HealthProbe for Down {
        async fn probe(
            &self,
            _provider: &ProviderConfig,
            _timeout: Duration,
        ) -> std::result::Result<(), RouterError> {
            Err(RouterError::HealthCheckFailed("down".into()))
        }
    }

    fn bridge() -> Bridge {
        let config = EngineConfig {
            categories: vec![CategoryConfig {
                id: "web".into(),
                label: "Web".into(),
                enabled: true,
                selection: SelectionStrategy::Weighted,
                max_parallel: 1,
                provider_ids: vec!["fixed".into()],
            }],
            providers: vec![ProviderConfig {
                id: "fixed".into(),
                label: "Fixed".into(),
                category: "web".into(),
                base_url: "https://fixed.example".into(),
                key_type: KeyType::None,
                trial_applies: false,
                weight: None,
                health: Some(HealthCheckConfig::default()),
                quota: None,
            }],
            ..Default::default()
        };
        let router = SearchRouter::new(config, AdapterRegistry::new().with("fixed", Arc::new(Fixed)))
            .expect("router");
        Bridge::new(Arc::new(router), Arc::new(Down))
    }

    #[tokio::test]
    async fn search_returns_response_payload() {
        let bridge = bridge();
        let response = bridge
            .dispatch(BridgeRequest::new(
                "req-1",
                BridgeCommand::Search,
                serde_json::json!({"query": "tokio", "role_id": "assistant"}),
            ))
            .await;
        assert!(response.ok, "{:?}", response.error);
        assert_eq!(response.request_id, "req-1");
        assert_eq!(response.payload["results"][0]["title"], "About tokio");
        assert_eq!(response.payload["fallback_used"], false);
    }

    #[tokio::test]
    async fn invalid_search_payload_is_error_response() {
        let response = bridge()
            .dispatch(BridgeRequest::new(
                "req-2",
                BridgeCommand::Search,
                serde_json::json!({"role_id": "assistant"}),
            ))
            .await;
        assert!(!response.ok);
        assert!(response.error.unwrap_or_default().contains("invalid payload"));
    }

    #[tokio::test]
    async fn wrong_version_rejected() {
        let mut request = BridgeRequest::new("req-3", BridgeCommand::UsageStats, serde_json::Value::Null);
        request.v = 99;
        let response = bridge().dispatch(request).await;
        assert!(!response.ok);
        assert!(response.error.unwrap_or_default().contains("unsupported protocol version"));
    }

    #[tokio::test]
    async fn usage_stats_and_reset() {
        let bridge = bridge();
        bridge
            .dispatch(BridgeRequest::new(
                "s",
                BridgeCommand::Search,
                serde_json::json!({"query": "q", "role_id": "r"}),
            ))
            .await;

        let stats = bridge
            .dispatch(BridgeRequest::new("u1", BridgeCommand::UsageStats, serde_json::Value::Null))
            .await;
        assert!(stats.ok);
        let calls = stats.payload["usage"]["daily_provider_calls"]
            .as_object()
            .expect("calls map");
        assert_eq!(calls.len(), 1);

        let reset = bridge
            .dispatch(BridgeRequest::new("u2", BridgeCommand::UsageReset, serde_json::Value::Null))
            .await;
        assert!(reset.ok);
        let stats = bridge
            .dispatch(BridgeRequest::new("u3", BridgeCommand::UsageStats, serde_json::Value::Null))
            .await;
        assert!(stats.payload["usage"]["daily_provider_calls"]
            .as_object()
            .expect("calls map")
            .is_empty());
    }

    #[tokio::test]
    async fn health_check_reports_sweep() {
        let response = bridge()
            .dispatch(BridgeRequest::new("h", BridgeCommand::HealthCheck, serde_json::Value::Null))
            .await;
        assert!(response.ok);
        assert_eq!(response.payload["probed"], 1);
        assert_eq!(response.payload["failed"], 1);
        assert_eq!(response.payload["unhealthy"], 0);
    }

    #[tokio::test]
    async fn config_patch_bumps_version() {
        let bridge = bridge();
        let response = bridge
            .dispatch(BridgeRequest::new(
                "c1",
                BridgeCommand::ConfigPatch,
                serde_json::json!({"trial": {"enabled": true, "per_user_daily_by_category": {"web": 3}}}),
            ))
            .await;
        assert!(response.ok, "{:?}", response.error);
        assert_eq!(response.payload["version"], 1);

        let config = bridge
            .dispatch(BridgeRequest::new("c2", BridgeCommand::ConfigGet, serde_json::Value::Null))
            .await;
        assert_eq!(config.payload["trial"]["per_user_daily_by_category"]["web"], 3);
    }

    #[tokio::test]
    async fn run_answers_each_line_and_stops() {
        let bridge = bridge();
        let input = concat!(
            r#"{"v":1,"request_id":"a","command":"usage.reset"}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"v":1,"request_id":"b","command":"host.stop"}"#,
            "\n",
            r#"{"v":1,"request_id":"c","command":"usage.reset"}"#,
            "\n",
        );
        let mut output: Vec<u8> = Vec::new();
        bridge.run(input.as_bytes(), &mut output).await.expect("run");

        let lines: Vec<BridgeResponse> = String::from_utf8(output)
            .expect("utf8")
            .lines()
            .map(|l| serde_json::from_str(l).expect("response json"))
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].request_id, "a");
        assert_eq!(lines[1].request_id, "parse-error");
        assert!(!lines[1].ok);
        assert_eq!(lines[2].request_id, "b");
    }
}
