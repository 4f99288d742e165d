//! Background provider health monitoring.
//!
//! [`HealthMonitor`] periodically probes every provider that declares a
//! `health` block and feeds the outcome into the [`UsageTracker`] health
//! map. The loop is an explicit task driven by a [`CancellationToken`];
//! tests call [`HealthMonitor::check_all`] directly instead of waiting on
//! wall-clock ticks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ConfigStore, ProviderConfig, DEFAULT_PROBE_TIMEOUT_MS};
use crate::error::RouterError;
use crate::usage::UsageTracker;

/// Interval between health sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// User-Agent sent with health probes.
const PROBE_USER_AGENT: &str = concat!("switchyard-health/", env!("CARGO_PKG_VERSION"));

/// A lightweight connectivity check against one provider.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe `provider`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::HealthCheckFailed`] when the provider is
    /// unreachable or answers with a server error.
    async fn probe(&self, provider: &ProviderConfig, timeout: Duration) -> Result<(), RouterError>;
}

/// Probes with an HTTP `HEAD` request.
///
/// Any response below 500 counts as reachable; a provider that rejects
/// `HEAD` with 405 is still up.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    /// # Errors
    ///
    /// Returns [`RouterError::System`] if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, RouterError> {
        let client = reqwest::Client::builder()
            .user_agent(PROBE_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| RouterError::System(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, provider: &ProviderConfig, timeout: Duration) -> Result<(), RouterError> {
        let url = provider.probe_url().ok_or_else(|| {
            RouterError::HealthCheckFailed(format!("`{}` has no probe url", provider.id))
        })?;
        let response = self
            .client
            .head(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| RouterError::HealthCheckFailed(format!("probe request failed: {e}")))?;
        let status = response.status();
        if status.is_server_error() {
            return Err(RouterError::HealthCheckFailed(format!(
                "probe returned HTTP {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}

/// Outcome counts of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub failed: usize,
    /// Providers marked unhealthy after this sweep.
    pub unhealthy: usize,
}

/// Periodically probes providers and updates their health records.
pub struct HealthMonitor {
    config: Arc<ConfigStore>,
    usage: Arc<UsageTracker>,
    probe: Arc<dyn HealthProbe>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(config: Arc<ConfigStore>, usage: Arc<UsageTracker>, probe: Arc<dyn HealthProbe>) -> Self {
        Self {
            config,
            usage,
            probe,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Override the sweep interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Probe every provider with a health block once, concurrently.
    pub async fn check_all(&self) -> SweepReport {
        let config = self.config.snapshot();
        let targets: Vec<&ProviderConfig> =
            config.providers.iter().filter(|p| p.health.is_some()).collect();

        let outcomes = futures::future::join_all(targets.iter().map(|provider| async move {
            let timeout = provider
                .health
                .as_ref()
                .map_or(DEFAULT_PROBE_TIMEOUT_MS, |h| h.timeout_ms);
            let timeout = Duration::from_millis(timeout);
            let outcome = match tokio::time::timeout(timeout, self.probe.probe(provider, timeout)).await {
                Ok(result) => result,
                Err(_) => Err(RouterError::HealthCheckFailed(format!(
                    "probe exceeded {}ms",
                    timeout.as_millis()
                ))),
            };
            (provider.id.as_str(), outcome)
        }))
        .await;

        let mut report = SweepReport {
            probed: outcomes.len(),
            ..Default::default()
        };
        for (provider_id, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    debug!(provider = provider_id, "health probe ok");
                    self.usage.record_probe_success(provider_id);
                }
                Err(err) => {
                    report.failed += 1;
                    let still_healthy = self.usage.record_probe_failure(provider_id, &err.to_string());
                    if still_healthy {
                        debug!(provider = provider_id, error = %err, "health probe failed");
                    } else {
                        warn!(provider = provider_id, error = %err, "provider marked unhealthy");
                    }
                }
            }
        }
        report.unhealthy = targets
            .iter()
            .filter(|p| !self.usage.is_healthy(&p.id))
            .count();
        report
    }

    /// Run sweeps until `cancel` fires. The first sweep runs immediately.
    ///
    /// Intended to be spawned as a background task:
    ///
    /// ```rust,ignore
    /// let handle = tokio::spawn(monitor.run(cancel.child_token()));
    /// ```
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "health monitor started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("health monitor cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.check_all().await;
                    debug!(
                        probed = report.probed,
                        failed = report.failed,
                        unhealthy = report.unhealthy,
                        "health sweep finished"
                    );
                }
            }
        }
    }
}
