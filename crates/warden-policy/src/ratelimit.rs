//! Sliding-log rate limiter keyed by caller and window.
//!
//! Every accepted unit is timestamped; a counter has room when fewer than
//! `limit` timestamps fall inside the trailing window. A refused attempt
//! consumes nothing.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use warden_config::RateLimitConfig;
use warden_core::Tier;

/// The three counters kept per caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateWindow {
    /// Every action.
    PerMinute,
    /// Tier2 actions only.
    Tier2PerHour,
    /// Tier3 actions only.
    Tier3PerDay,
}

impl RateWindow {
    pub fn duration(&self) -> Duration {
        match self {
            Self::PerMinute => Duration::from_secs(60),
            Self::Tier2PerHour => Duration::from_secs(60 * 60),
            Self::Tier3PerDay => Duration::from_secs(24 * 60 * 60),
        }
    }

    pub fn limit(&self, config: &RateLimitConfig) -> u32 {
        match self {
            Self::PerMinute => config.per_minute,
            Self::Tier2PerHour => config.tier2_per_hour,
            Self::Tier3PerDay => config.tier3_per_day,
        }
    }

    /// The tier-specific counter an action of `tier` also draws from.
    pub fn for_tier(tier: Tier) -> Option<Self> {
        match tier {
            Tier::Tier1Safe => None,
            Tier::Tier2Constrained => Some(Self::Tier2PerHour),
            Tier::Tier3Sensitive => Some(Self::Tier3PerDay),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerMinute => "per_minute",
            Self::Tier2PerHour => "tier2_per_hour",
            Self::Tier3PerDay => "tier3_per_day",
        }
    }
}

#[derive(Debug, Default)]
struct SlidingLog {
    hits: VecDeque<Instant>,
}

impl SlidingLog {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.hits.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Shared rate limiter state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    logs: Arc<DashMap<(String, RateWindow), SlidingLog>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            logs: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Take one unit from `window` for `caller_id` if there is room.
    pub fn try_acquire(&self, caller_id: &str, window: RateWindow) -> bool {
        self.try_acquire_at(caller_id, window, Instant::now())
    }

    pub fn try_acquire_at(&self, caller_id: &str, window: RateWindow, now: Instant) -> bool {
        let limit = window.limit(&self.config) as usize;
        let mut log = self
            .logs
            .entry((caller_id.to_string(), window))
            .or_default();
        log.prune(now, window.duration());
        if log.hits.len() >= limit {
            return false;
        }
        log.hits.push_back(now);
        true
    }

    /// Units left in `window` for `caller_id` right now.
    pub fn remaining(&self, caller_id: &str, window: RateWindow) -> u32 {
        let limit = window.limit(&self.config);
        let key = (caller_id.to_string(), window);
        match self.logs.get_mut(&key) {
            Some(mut log) => {
                log.prune(Instant::now(), window.duration());
                limit.saturating_sub(log.hits.len() as u32)
            }
            None => limit,
        }
    }

    /// Number of live (caller, window) counters.
    pub fn tracked(&self) -> usize {
        self.logs.len()
    }

    /// Evict counters with nothing left in their window. Returns how many
    /// were removed.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    pub fn cleanup_at(&self, now: Instant) -> usize {
        let before = self.logs.len();
        self.logs.retain(|(_, window), log| {
            log.prune(now, window.duration());
            !log.hits.is_empty()
        });
        before.saturating_sub(self.logs.len())
    }

    pub fn reset(&self) {
        self.logs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(per_minute: u32) -> RateLimitConfig {
        RateLimitConfig {
            per_minute,
            tier2_per_hour: 2,
            tier3_per_day: 1,
        }
    }

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(config(3));
        let now = Instant::now();
        assert!(limiter.try_acquire_at("ceo", RateWindow::PerMinute, now));
        assert!(limiter.try_acquire_at("ceo", RateWindow::PerMinute, now));
        assert!(limiter.try_acquire_at("ceo", RateWindow::PerMinute, now));
        // 4th should be denied
        assert!(!limiter.try_acquire_at("ceo", RateWindow::PerMinute, now));
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(config(1));
        let start = Instant::now();
        assert!(limiter.try_acquire_at("ceo", RateWindow::PerMinute, start));
        assert!(!limiter.try_acquire_at("ceo", RateWindow::PerMinute, start + Duration::from_secs(59)));
        assert!(limiter.try_acquire_at("ceo", RateWindow::PerMinute, start + Duration::from_secs(60)));
    }

    #[test]
    fn test_refusal_consumes_nothing() {
        let limiter = RateLimiter::new(config(1));
        let start = Instant::now();
        assert!(limiter.try_acquire_at("ceo", RateWindow::PerMinute, start));
        for s in 1..30 {
            assert!(!limiter.try_acquire_at("ceo", RateWindow::PerMinute, start + Duration::from_secs(s)));
        }
        // Only the first hit is in the log, so room opens 60s after it.
        assert!(limiter.try_acquire_at("ceo", RateWindow::PerMinute, start + Duration::from_secs(61)));
    }

    #[test]
    fn test_callers_and_windows_independent() {
        let limiter = RateLimiter::new(config(1));
        let now = Instant::now();
        assert!(limiter.try_acquire_at("a", RateWindow::PerMinute, now));
        assert!(limiter.try_acquire_at("b", RateWindow::PerMinute, now));
        assert!(limiter.try_acquire_at("a", RateWindow::Tier3PerDay, now));
        assert!(!limiter.try_acquire_at("a", RateWindow::Tier3PerDay, now));
    }

    #[test]
    fn test_zero_limit_refuses_everything() {
        let limiter = RateLimiter::new(config(0));
        assert!(!limiter.try_acquire("ceo", RateWindow::PerMinute));
    }

    #[test]
    fn test_remaining_and_reset() {
        let limiter = RateLimiter::new(config(5));
        assert_eq!(limiter.remaining("ceo", RateWindow::PerMinute), 5);
        limiter.try_acquire("ceo", RateWindow::PerMinute);
        assert_eq!(limiter.remaining("ceo", RateWindow::PerMinute), 4);
        limiter.cleanup();
        assert_eq!(limiter.logs.len(), 1);
        limiter.reset();
        assert_eq!(limiter.remaining("ceo", RateWindow::PerMinute), 5);
    }

    #[test]
    fn test_cleanup_evicts_expired_counters() {
        let limiter = RateLimiter::new(config(5));
        let start = Instant::now();
        for caller in ["a", "b", "c"] {
            assert!(limiter.try_acquire_at(caller, RateWindow::PerMinute, start));
        }
        assert!(limiter.try_acquire_at("a", RateWindow::Tier3PerDay, start));
        assert_eq!(limiter.tracked(), 4);

        assert_eq!(limiter.cleanup_at(start + Duration::from_secs(30)), 0);
        // Per-minute counters expire; the per-day one is still live.
        assert_eq!(limiter.cleanup_at(start + Duration::from_secs(61)), 3);
        assert_eq!(limiter.tracked(), 1);
        assert_eq!(limiter.cleanup_at(start + Duration::from_secs(24 * 60 * 60)), 1);
        assert_eq!(limiter.tracked(), 0);
    }

    #[test]
    fn test_for_tier() {
        assert_eq!(RateWindow::for_tier(Tier::Tier1Safe), None);
        assert_eq!(RateWindow::for_tier(Tier::Tier2Constrained), Some(RateWindow::Tier2PerHour));
        assert_eq!(RateWindow::for_tier(Tier::Tier3Sensitive), Some(RateWindow::Tier3PerDay));
    }
}
