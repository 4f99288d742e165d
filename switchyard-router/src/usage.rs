//! Day-keyed usage counters and the provider health map.
//!
//! [`UsageTracker`] owns a single [`UsageState`] behind a mutex. In-flight
//! searches increment counters; the health monitor writes health records.
//! Selection reads may be slightly stale; exact double-spend prevention
//! across concurrent searches is not attempted.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::{KeyType, ProviderConfig, TrialConfig};
use crate::health::ProviderHealth;

/// Snapshot of all usage and health state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageState {
    pub daily_trial_usage: BTreeMap<NaiveDate, BTreeMap<String, u32>>,
    pub daily_byok_calls: BTreeMap<NaiveDate, u32>,
    /// Calls per provider per day, for provider-wide daily limits.
    pub daily_provider_calls: BTreeMap<NaiveDate, BTreeMap<String, u32>>,
    pub provider_health: BTreeMap<String, ProviderHealth>,
}

impl UsageState {
    /// Drop counters for days before `today`.
    fn prune_before(&mut self, today: NaiveDate) {
        self.daily_trial_usage.retain(|day, _| *day >= today);
        self.daily_byok_calls.retain(|day, _| *day >= today);
        self.daily_provider_calls.retain(|day, _| *day >= today);
    }
}

/// Which counter a tracked call landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageKind {
    /// Counted against the category's trial allotment.
    Trial,
    /// Counted as a bring-your-own-key call.
    Byok,
    /// Neither counter applies.
    Untracked,
}

/// Thread-safe store of usage counters and provider health.
pub struct UsageTracker {
    state: Mutex<UsageState>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for UsageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageTracker").finish_non_exhaustive()
    }
}

impl UsageTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(UsageState::default()),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, UsageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one completed call to `provider` made while searching `category`.
    ///
    /// A BYOK provider called with the caller's own key counts as a BYOK
    /// call; otherwise a trial-eligible provider counts against the
    /// category's trial allotment. A call never increments both.
    pub fn track_usage(
        &self,
        provider: &ProviderConfig,
        category: &str,
        credential_used: bool,
    ) -> UsageKind {
        let today = self.clock.today();
        let mut state = self.lock();
        state.prune_before(today);

        *state
            .daily_provider_calls
            .entry(today)
            .or_default()
            .entry(provider.id.clone())
            .or_default() += 1;

        let kind = if provider.key_type == KeyType::Byok && credential_used {
            *state.daily_byok_calls.entry(today).or_default() += 1;
            UsageKind::Byok
        } else if provider.trial_applies {
            *state
                .daily_trial_usage
                .entry(today)
                .or_default()
                .entry(category.to_owned())
                .or_default() += 1;
            UsageKind::Trial
        } else {
            UsageKind::Untracked
        };
        tracing::debug!(provider = %provider.id, category, ?kind, "usage tracked");
        kind
    }

    /// Whether `provider` may still be called today.
    ///
    /// Trial-eligible providers are bounded by the trial limit of their
    /// category; any provider with a `quota.daily_limit` is bounded by its
    /// own call count.
    pub fn has_quota_remaining(&self, provider: &ProviderConfig, trial: &TrialConfig) -> bool {
        self.has_quota_remaining_in(provider, &provider.category, trial)
    }

    /// Like [`has_quota_remaining`](Self::has_quota_remaining) but charged to
    /// an explicit category.
    pub fn has_quota_remaining_in(
        &self,
        provider: &ProviderConfig,
        category: &str,
        trial: &TrialConfig,
    ) -> bool {
        let today = self.clock.today();
        let state = self.lock();

        if provider.trial_applies {
            if let Some(limit) = trial.limit_for(category) {
                let used = state
                    .daily_trial_usage
                    .get(&today)
                    .and_then(|by_category| by_category.get(category))
                    .copied()
                    .unwrap_or(0);
                if used >= limit {
                    return false;
                }
            }
        }

        if let Some(limit) = provider.quota.as_ref().and_then(|q| q.daily_limit) {
            let calls = state
                .daily_provider_calls
                .get(&today)
                .and_then(|by_provider| by_provider.get(&provider.id))
                .copied()
                .unwrap_or(0);
            if calls >= limit {
                return false;
            }
        }
        true
    }

    /// Today's trial usage per category.
    pub fn trial_usage_for_today(&self) -> BTreeMap<String, u32> {
        let today = self.clock.today();
        self.lock()
            .daily_trial_usage
            .get(&today)
            .cloned()
            .unwrap_or_default()
    }

    /// Today's BYOK call count.
    pub fn byok_calls_for_today(&self) -> u32 {
        let today = self.clock.today();
        self.lock().daily_byok_calls.get(&today).copied().unwrap_or(0)
    }

    /// Clear every usage counter. Health records are kept.
    pub fn reset_daily_usage(&self) {
        let mut state = self.lock();
        state.daily_trial_usage.clear();
        state.daily_byok_calls.clear();
        state.daily_provider_calls.clear();
        tracing::info!("daily usage counters reset");
    }

    /// Whether `provider_id` may be selected. Unknown providers are healthy.
    pub fn is_healthy(&self, provider_id: &str) -> bool {
        self.lock()
            .provider_health
            .get(provider_id)
            .is_none_or(|h| h.is_healthy)
    }

    /// Health record for `provider_id`, if it has ever been probed.
    pub fn health_of(&self, provider_id: &str) -> Option<ProviderHealth> {
        self.lock().provider_health.get(provider_id).cloned()
    }

    /// Apply a successful probe result.
    pub fn record_probe_success(&self, provider_id: &str) {
        let now = self.clock.now();
        let mut state = self.lock();
        state
            .provider_health
            .entry(provider_id.to_owned())
            .or_insert_with(|| ProviderHealth::healthy(now))
            .record_success(now);
    }

    /// Apply a failed probe result. Returns whether the provider is still healthy.
    pub fn record_probe_failure(&self, provider_id: &str, error: &str) -> bool {
        let now = self.clock.now();
        let mut state = self.lock();
        let health = state
            .provider_health
            .entry(provider_id.to_owned())
            .or_insert_with(|| ProviderHealth::healthy(now));
        health.record_failure(now, error);
        health.is_healthy
    }

    /// Full snapshot for diagnostics.
    pub fn snapshot(&self) -> UsageState {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::QuotaConfig;
    use chrono::{Duration, TimeZone, Utc};

    fn make_provider(id: &str, key_type: KeyType, trial_applies: bool) -> ProviderConfig {
        ProviderConfig {
            id: id.into(),
            label: id.into(),
            category: "news".into(),
            base_url: String::new(),
            key_type,
            trial_applies,
            weight: None,
            health: None,
            quota: None,
        }
    }

    fn news_trial(limit: u32) -> TrialConfig {
        TrialConfig {
            enabled: true,
            per_user_daily_by_category: BTreeMap::from([("news".to_string(), limit)]),
        }
    }

    fn tracker() -> (Arc<ManualClock>, UsageTracker) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap(),
        ));
        let tracker = UsageTracker::new(clock.clone());
        (clock, tracker)
    }

    #[test]
    fn trial_provider_counts_against_category() {
        let (_, tracker) = tracker();
        let provider = make_provider("gnews", KeyType::None, true);
        assert_eq!(tracker.track_usage(&provider, "news", false), UsageKind::Trial);
        assert_eq!(tracker.trial_usage_for_today().get("news"), Some(&1));
        assert_eq!(tracker.byok_calls_for_today(), 0);
    }

    #[test]
    fn byok_with_credential_counts_as_byok_only() {
        let (_, tracker) = tracker();
        let provider = make_provider("newsapi", KeyType::Byok, true);
        assert_eq!(tracker.track_usage(&provider, "news", true), UsageKind::Byok);
        assert_eq!(tracker.byok_calls_for_today(), 1);
        assert!(tracker.trial_usage_for_today().is_empty());
    }

    #[test]
    fn byok_without_credential_falls_back_to_trial() {
        let (_, tracker) = tracker();
        let provider = make_provider("newsapi", KeyType::Byok, true);
        assert_eq!(tracker.track_usage(&provider, "news", false), UsageKind::Trial);
        assert_eq!(tracker.byok_calls_for_today(), 0);
    }

    #[test]
    fn untracked_provider_increments_neither() {
        let (_, tracker) = tracker();
        let provider = make_provider("wiki", KeyType::None, false);
        assert_eq!(
            tracker.track_usage(&provider, "web", false),
            UsageKind::Untracked
        );
        assert!(tracker.trial_usage_for_today().is_empty());
        assert_eq!(tracker.byok_calls_for_today(), 0);
    }

    #[test]
    fn quota_exhausts_after_limit_and_reset_restores() {
        let (_, tracker) = tracker();
        let provider = make_provider("gnews", KeyType::None, true);
        let trial = news_trial(2);

        assert!(tracker.has_quota_remaining(&provider, &trial));
        tracker.track_usage(&provider, "news", false);
        assert!(tracker.has_quota_remaining(&provider, &trial));
        tracker.track_usage(&provider, "news", false);
        assert!(!tracker.has_quota_remaining(&provider, &trial));

        tracker.reset_daily_usage();
        assert!(tracker.has_quota_remaining(&provider, &trial));
    }

    #[test]
    fn quota_rolls_over_with_the_calendar_day() {
        let (clock, tracker) = tracker();
        let provider = make_provider("gnews", KeyType::None, true);
        let trial = news_trial(1);
        tracker.track_usage(&provider, "news", false);
        assert!(!tracker.has_quota_remaining(&provider, &trial));

        clock.advance(Duration::days(1));
        assert!(tracker.has_quota_remaining(&provider, &trial));
        assert!(tracker.trial_usage_for_today().is_empty());
    }

    #[test]
    fn tracking_drops_counters_from_earlier_days() {
        let (clock, tracker) = tracker();
        let trial = make_provider("gnews", KeyType::None, true);
        let byok = make_provider("newsapi", KeyType::Byok, false);
        tracker.track_usage(&trial, "news", false);
        tracker.track_usage(&byok, "news", true);
        let first_day = clock.today();

        clock.advance(Duration::days(3));
        tracker.track_usage(&trial, "news", false);

        let snapshot = tracker.snapshot();
        let today = clock.today();
        assert_eq!(snapshot.daily_trial_usage.keys().collect::<Vec<_>>(), vec![&today]);
        assert_eq!(snapshot.daily_provider_calls.keys().collect::<Vec<_>>(), vec![&today]);
        assert!(!snapshot.daily_byok_calls.contains_key(&first_day));
        assert_eq!(snapshot.daily_trial_usage[&today]["news"], 1);
    }

    #[test]
    fn non_trial_provider_ignores_trial_limit() {
        let (_, tracker) = tracker();
        let trial_provider = make_provider("gnews", KeyType::None, true);
        let other = make_provider("wiki", KeyType::None, false);
        let trial = news_trial(1);
        tracker.track_usage(&trial_provider, "news", false);
        assert!(tracker.has_quota_remaining(&other, &trial));
    }

    #[test]
    fn provider_daily_limit_enforced() {
        let (_, tracker) = tracker();
        let mut provider = make_provider("scholar", KeyType::None, false);
        provider.quota = Some(QuotaConfig {
            daily_limit: Some(1),
        });
        let trial = TrialConfig::default();
        assert!(tracker.has_quota_remaining(&provider, &trial));
        tracker.track_usage(&provider, "academic", false);
        assert!(!tracker.has_quota_remaining(&provider, &trial));
    }

    #[test]
    fn health_defaults_to_healthy_and_flips_after_three_failures() {
        let (_, tracker) = tracker();
        assert!(tracker.is_healthy("gnews"));
        assert!(tracker.record_probe_failure("gnews", "refused"));
        assert!(tracker.record_probe_failure("gnews", "refused"));
        assert!(!tracker.record_probe_failure("gnews", "refused"));
        assert!(!tracker.is_healthy("gnews"));

        tracker.record_probe_success("gnews");
        assert!(tracker.is_healthy("gnews"));
        let record = tracker.health_of("gnews").expect("record");
        assert_eq!(record.consecutive_failures, 0);
    }

    #[test]
    fn reset_keeps_health_records() {
        let (_, tracker) = tracker();
        for _ in 0..3 {
            tracker.record_probe_failure("gnews", "refused");
        }
        tracker.reset_daily_usage();
        assert!(!tracker.is_healthy("gnews"));
    }

    #[test]
    fn snapshot_contains_all_maps() {
        let (clock, tracker) = tracker();
        let provider = make_provider("gnews", KeyType::None, true);
        tracker.track_usage(&provider, "news", false);
        tracker.record_probe_success("gnews");
        let snapshot = tracker.snapshot();
        let today = clock.today();
        assert_eq!(snapshot.daily_trial_usage[&today]["news"], 1);
        assert_eq!(snapshot.daily_provider_calls[&today]["gnews"], 1);
        assert!(snapshot.provider_health.contains_key("gnews"));
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let (_, tracker) = tracker();
        let tracker = Arc::new(tracker);
        let provider = Arc::new(make_provider("gnews", KeyType::None, true));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                let provider = Arc::clone(&provider);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.track_usage(&provider, "news", false);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }
        assert_eq!(tracker.trial_usage_for_today().get("news"), Some(&800));
    }
}
