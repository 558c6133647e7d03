use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use warden_config::BreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerState {
    /// Normal operation; calls flow through.
    Closed,
    /// Upstream is failing; calls are rejected immediately.
    Open,
    /// Recovery timeout elapsed; trial calls are let through.
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }

    /// Numeric value for the metrics gauge.
    pub fn gauge(&self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::HalfOpen => 1,
            Self::Open => 2,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    total_failures: u64,
    total_successes: u64,
    times_opened: u64,
}

/// Point-in-time view of a breaker, for `/v1/breaker` and metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub times_opened: u64,
}

/// One breaker per upstream dependency, shared by every caller.
///
/// `Open -> HalfOpen` happens lazily inside [`CircuitBreaker::can_proceed`].
/// Trials under `HalfOpen` are not serialized: every caller is let through
/// and the first recorded outcome decides the next state.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            inner: Arc::new(Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                total_failures: 0,
                total_successes: 0,
                times_opened: 0,
            })),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &BreakerConfig) -> Self {
        Self::new(
            name,
            config.failure_threshold,
            Duration::from_secs(config.recovery_timeout_secs),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn can_proceed(&self) -> bool {
        self.can_proceed_at(Instant::now())
    }

    pub fn can_proceed_at(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| now.saturating_duration_since(t))
                    .unwrap_or_default();
                if elapsed >= self.recovery_timeout {
                    inner.state = BreakerState::HalfOpen;
                    info!(breaker = %self.name, "circuit breaker half-open, allowing trial call");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.total_successes += 1;
        if inner.state != BreakerState::Closed {
            info!(breaker = %self.name, from = inner.state.as_str(), "circuit breaker closed");
        }
        inner.state = BreakerState::Closed;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&self, now: Instant) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.total_failures += 1;

        let trip = match inner.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => inner.consecutive_failures >= self.failure_threshold,
            // Late failure from a call that started before the trip.
            BreakerState::Open => false,
        };
        if trip {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(now);
            inner.times_opened += 1;
            warn!(
                breaker = %self.name,
                failures = inner.consecutive_failures,
                "circuit breaker OPEN, rejecting calls for {}s",
                self.recovery_timeout.as_secs()
            );
        }
    }

    /// Stored state. Does not perform the lazy `Open -> HalfOpen` transition.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            failure_threshold: self.failure_threshold,
            recovery_timeout_secs: self.recovery_timeout.as_secs(),
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            times_opened: inner.times_opened,
        }
    }

    /// Back to a fresh `Closed` breaker with zeroed counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.total_failures = 0;
        inner.total_successes = 0;
        inner.times_opened = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new("planner", 3, Duration::from_secs(60))
    }

    #[test]
    fn test_trips_after_threshold() {
        let cb = breaker();
        let now = Instant::now();
        cb.record_failure_at(now);
        cb.record_failure_at(now);
        assert!(cb.can_proceed_at(now));
        cb.record_failure_at(now);
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.can_proceed_at(now + Duration::from_secs(59)));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = breaker();
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_then_closed() {
        let cb = breaker();
        let now = Instant::now();
        for _ in 0..3 {
            cb.record_failure_at(now);
        }
        assert!(cb.can_proceed_at(now + Duration::from_secs(60)));
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.can_proceed());
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = breaker();
        let now = Instant::now();
        for _ in 0..3 {
            cb.record_failure_at(now);
        }
        let later = now + Duration::from_secs(61);
        assert!(cb.can_proceed_at(later));
        cb.record_failure_at(later);
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.can_proceed_at(later + Duration::from_secs(1)));
        assert!(cb.can_proceed_at(later + Duration::from_secs(60)));
    }

    #[test]
    fn test_half_open_admits_concurrent_trials() {
        let cb = breaker();
        let now = Instant::now();
        for _ in 0..3 {
            cb.record_failure_at(now);
        }
        let later = now + Duration::from_secs(60);
        assert!(cb.can_proceed_at(later));
        assert!(cb.can_proceed_at(later));
    }

    #[test]
    fn test_failure_while_open_keeps_open_time() {
        let cb = breaker();
        let now = Instant::now();
        for _ in 0..3 {
            cb.record_failure_at(now);
        }
        cb.record_failure_at(now + Duration::from_secs(30));
        assert!(cb.can_proceed_at(now + Duration::from_secs(60)));
        assert_eq!(cb.snapshot().times_opened, 1);
    }

    #[test]
    fn test_snapshot_and_reset() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_failure();
        }
        let snap = cb.snapshot();
        assert_eq!(snap.state, BreakerState::Open);
        assert_eq!(snap.total_failures, 3);
        assert_eq!(snap.failure_threshold, 3);
        cb.reset();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.snapshot().total_failures, 0);
    }

    #[test]
    fn test_clones_share_state() {
        let cb = breaker();
        let other = cb.clone();
        for _ in 0..3 {
            other.record_failure();
        }
        assert_eq!(cb.state(), BreakerState::Open);
    }
}
