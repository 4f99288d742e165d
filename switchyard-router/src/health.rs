//! Per-provider health record and its state machine.
//!
//! Providers start healthy. A provider is excluded from selection only
//! after a run of consecutive failed probes; a single success restores it.
//!
//! # State Machine
//!
//! ```text
//! ┌─────────┐  3 consecutive failures  ┌───────────┐
//! │ Healthy ├─────────────────────────►│ Unhealthy │
//! └───▲─────┘                          └─────┬─────┘
//!     │              1 success               │
//!     └──────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Consecutive failures needed to mark a provider unhealthy.
pub const FAILURE_THRESHOLD: u32 = 3;

/// Health tracking data for a single provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub is_healthy: bool,
    /// When the last probe finished.
    pub last_check: DateTime<Utc>,
    /// Number of consecutive failures since the last success.
    pub consecutive_failures: u32,
    /// Message from the most recent failure.
    pub last_error: Option<String>,
}

impl ProviderHealth {
    /// A healthy record checked at `at`.
    pub fn healthy(at: DateTime<Utc>) -> Self {
        Self {
            is_healthy: true,
            last_check: at,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    /// Record a successful probe.
    ///
    /// Resets the failure count and marks the provider healthy regardless
    /// of previous state.
    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.is_healthy = true;
        self.consecutive_failures = 0;
        self.last_check = at;
    }

    /// Record a failed probe.
    ///
    /// Increments the failure count; once it reaches [`FAILURE_THRESHOLD`]
    /// the provider is marked unhealthy.
    pub fn record_failure(&mut self, at: DateTime<Utc>, error: impl Into<String>) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error.into());
        self.last_check = at;
        if self.consecutive_failures >= FAILURE_THRESHOLD {
            self.is_healthy = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, minute, 0).unwrap()
    }

    #[test]
    fn initial_state_is_healthy() {
        let health = ProviderHealth::healthy(at(0));
        assert!(health.is_healthy);
        assert_eq!(health.consecutive_failures, 0);
        assert!(health.last_error.is_none());
    }

    #[test]
    fn stays_healthy_below_threshold() {
        let mut health = ProviderHealth::healthy(at(0));
        health.record_failure(at(1), "refused");
        health.record_failure(at(2), "refused");
        assert!(health.is_healthy);
        assert_eq!(health.consecutive_failures, 2);
        assert_eq!(health.last_error.as_deref(), Some("refused"));
    }

    #[test]
    fn trips_to_unhealthy_at_threshold() {
        let mut health = ProviderHealth::healthy(at(0));
        for minute in 1..=3 {
            health.record_failure(at(minute), format!("failure {minute}"));
        }
        assert!(!health.is_healthy);
        assert_eq!(health.last_check, at(3));
        assert_eq!(health.last_error.as_deref(), Some("failure 3"));
    }

    #[test]
    fn single_success_restores_unhealthy() {
        let mut health = ProviderHealth::healthy(at(0));
        for minute in 1..=5 {
            health.record_failure(at(minute), "timeout");
        }
        health.record_success(at(6));
        assert!(health.is_healthy);
        assert_eq!(health.consecutive_failures, 0);
    }

    #[test]
    fn rapid_success_failure_alternation() {
        let mut health = ProviderHealth::healthy(at(0));
        // Alternating never trips because the failure count resets.
        for minute in 0..10 {
            health.record_failure(at(minute), "flaky");
            health.record_success(at(minute));
        }
        assert!(health.is_healthy);
    }

    #[test]
    fn serde_round_trip() {
        let mut health = ProviderHealth::healthy(at(0));
        health.record_failure(at(1), "dns");
        let json = serde_json::to_string(&health).expect("serialize");
        let decoded: ProviderHealth = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(decoded, health);
    }
}
