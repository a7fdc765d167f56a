//! Daily usage caps for free-tier features.
//!
//! Counters live in a key-value store under `{feature}:{YYYY-MM-DD}`, so a
//! new calendar day starts from an absent key and nothing is ever reset.
//! This gate is advisory: store failures allow the request, and the billing
//! backend stays the authority on entitlements.

use crate::backends::KeyValueStore;
use crate::clock::Clock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub const MOOD_SUGGESTION: &str = "mood_suggestion";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Trial,
    Premium,
}

impl Tier {
    pub fn is_metered(self) -> bool {
        matches!(self, Tier::Free)
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "trial" => Ok(Tier::Trial),
            "premium" | "pro" => Ok(Tier::Premium),
            other => Err(format!("unknown tier '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenyReason {
    QuotaExceeded { feature: String, limit: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageDecision {
    pub allowed: bool,
    /// Uses counted today, this one included when allowed.
    pub used: u32,
    /// `None` for unmetered tiers and features.
    pub limit: Option<u32>,
    pub reason: Option<DenyReason>,
}

impl UsageDecision {
    fn unmetered() -> Self {
        Self {
            allowed: true,
            used: 0,
            limit: None,
            reason: None,
        }
    }

    pub fn remaining(&self) -> Option<u32> {
        self.limit.map(|l| l.saturating_sub(self.used))
    }
}

pub struct FeatureUsageGate {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    limits: HashMap<String, u32>,
}

impl FeatureUsageGate {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            limits: HashMap::new(),
        }
    }

    pub fn with_limit(mut self, feature: impl Into<String>, per_day: u32) -> Self {
        self.limits.insert(feature.into(), per_day);
        self
    }

    pub fn limit(&self, feature: &str) -> Option<u32> {
        self.limits.get(feature).copied()
    }

    fn key(&self, feature: &str) -> String {
        format!("{}:{}", feature, self.clock.today().format("%Y-%m-%d"))
    }

    fn read_count(&self, key: &str) -> Option<u32> {
        match self.store.get(key) {
            Ok(Some(raw)) => Some(raw.trim().parse::<u32>().unwrap_or_else(|_| {
                tracing::warn!(key, raw = %raw, "Unparseable usage counter, treating as 0");
                0
            })),
            Ok(None) => Some(0),
            Err(e) => {
                tracing::warn!(key, error = %e, "Usage store read failed, allowing");
                None
            }
        }
    }

    /// Check and, when allowed, count one use of `feature`.
    pub fn check(&self, feature: &str, tier: Tier) -> UsageDecision {
        if !tier.is_metered() {
            return UsageDecision::unmetered();
        }
        let Some(limit) = self.limit(feature) else {
            return UsageDecision::unmetered();
        };

        let key = self.key(feature);
        let Some(count) = self.read_count(&key) else {
            return UsageDecision {
                allowed: true,
                used: 0,
                limit: Some(limit),
                reason: None,
            };
        };

        if count >= limit {
            tracing::info!(feature, count, limit, "Daily limit reached");
            return UsageDecision {
                allowed: false,
                used: count,
                limit: Some(limit),
                reason: Some(DenyReason::QuotaExceeded {
                    feature: feature.to_string(),
                    limit,
                }),
            };
        }

        let used = count + 1;
        match self.store.set(&key, &used.to_string()) {
            Ok(true) => {}
            Ok(false) => tracing::warn!(key = %key, "Usage store refused write, allowing"),
            Err(e) => tracing::warn!(key = %key, error = %e, "Usage store write failed, allowing"),
        }

        UsageDecision {
            allowed: true,
            used,
            limit: Some(limit),
            reason: None,
        }
    }

    /// Uses counted so far today, without counting a new one.
    pub fn usage_today(&self, feature: &str) -> u32 {
        self.read_count(&self.key(feature)).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::kv::MemoryStore;
    use crate::clock::ManualClock;
    use crate::error::{Error, Result};
    use chrono::{TimeZone, Utc};

    fn gate(limit: u32) -> (FeatureUsageGate, Arc<ManualClock>, Arc<MemoryStore>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::new());
        let gate = FeatureUsageGate::new(store.clone(), clock.clone()).with_limit("ai_mood", limit);
        (gate, clock, store)
    }

    #[test]
    fn test_free_user_denied_after_limit_then_reset_next_day() {
        let (gate, clock, _) = gate(3);

        for call in 1..=3 {
            let d = gate.check("ai_mood", Tier::Free);
            assert!(d.allowed, "call {} should be allowed", call);
            assert_eq!(d.used, call);
        }

        let denied = gate.check("ai_mood", Tier::Free);
        assert!(!denied.allowed);
        assert_eq!(
            denied.reason,
            Some(DenyReason::QuotaExceeded {
                feature: "ai_mood".into(),
                limit: 3
            })
        );
        assert_eq!(denied.remaining(), Some(0));

        clock.advance(chrono::Duration::days(1));
        assert!(gate.check("ai_mood", Tier::Free).allowed);
        assert_eq!(gate.usage_today("ai_mood"), 1);
    }

    #[test]
    fn test_paid_tiers_do_not_touch_counters() {
        let (gate, _, store) = gate(1);
        for _ in 0..5 {
            assert!(gate.check("ai_mood", Tier::Premium).allowed);
            assert!(gate.check("ai_mood", Tier::Trial).allowed);
        }
        assert_eq!(store.get("ai_mood:2026-10-18").unwrap(), None);
    }

    #[test]
    fn test_key_embeds_calendar_date() {
        let (gate, _, store) = gate(5);
        gate.check("ai_mood", Tier::Free);
        assert_eq!(store.get("ai_mood:2026-10-18").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_unknown_feature_is_allowed() {
        let (gate, _, _) = gate(1);
        assert!(gate.check("something_else", Tier::Free).allowed);
    }

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::Store("disk gone".into()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<bool> {
            Err(Error::Store("disk gone".into()))
        }
    }

    #[test]
    fn test_store_failure_fails_open() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let gate = FeatureUsageGate::new(Arc::new(BrokenStore), clock).with_limit("ai_mood", 0);
        assert!(gate.check("ai_mood", Tier::Free).allowed);
    }
}
