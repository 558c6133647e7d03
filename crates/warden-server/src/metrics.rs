//! Prometheus-compatible metrics for the warden server.
//!
//! Tracks HTTP traffic, plan submissions and their outcomes. The breaker
//! gauge is read from the live breaker at render time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use warden_core::{DispositionStatus, WardenError};
use warden_upstream::BreakerState;

/// Global metrics registry.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    http_requests_total: AtomicU64,
    http_errors_total: AtomicU64,
    /// Plans received on `POST /v1/plans`.
    submissions_total: AtomicU64,
    approved_total: AtomicU64,
    partially_approved_total: AtomicU64,
    blocked_total: AtomicU64,
    simulation_only_total: AtomicU64,
    service_unavailable_total: AtomicU64,
    budget_exceeded_total: AtomicU64,
    /// Any other infrastructure error.
    failed_total: AtomicU64,
    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                http_requests_total: AtomicU64::new(0),
                http_errors_total: AtomicU64::new(0),
                submissions_total: AtomicU64::new(0),
                approved_total: AtomicU64::new(0),
                partially_approved_total: AtomicU64::new(0),
                blocked_total: AtomicU64::new(0),
                simulation_only_total: AtomicU64::new(0),
                service_unavailable_total: AtomicU64::new(0),
                budget_exceeded_total: AtomicU64::new(0),
                failed_total: AtomicU64::new(0),
                started_at: Instant::now(),
            }),
        }
    }

    pub fn inc_http_requests(&self) {
        self.inner
            .http_requests_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_http_errors(&self) {
        self.inner.http_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_submissions(&self) {
        self.inner.submissions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disposition(&self, status: DispositionStatus) {
        let counter = match status {
            DispositionStatus::Approved => &self.inner.approved_total,
            DispositionStatus::PartiallyApproved => &self.inner.partially_approved_total,
            DispositionStatus::Blocked => &self.inner.blocked_total,
            DispositionStatus::SimulationOnly => &self.inner.simulation_only_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, err: &WardenError) {
        let counter = match err {
            WardenError::ServiceUnavailable { .. } => &self.inner.service_unavailable_total,
            WardenError::BudgetExceeded { .. } => &self.inner.budget_exceeded_total,
            _ => &self.inner.failed_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Render metrics in Prometheus text exposition format.
    pub fn render_prometheus(&self, breaker: BreakerState) -> String {
        let m = &self.inner;
        let uptime = m.started_at.elapsed().as_secs();

        format!(
            r#"# HELP warden_uptime_seconds Time since the server started.
# TYPE warden_uptime_seconds gauge
warden_uptime_seconds {}

# HELP warden_http_requests_total Total HTTP requests served.
# TYPE warden_http_requests_total counter
warden_http_requests_total {}

# HELP warden_http_errors_total Total HTTP errors (4xx/5xx).
# TYPE warden_http_errors_total counter
warden_http_errors_total {}

# HELP warden_submissions_total Total plans submitted.
# TYPE warden_submissions_total counter
warden_submissions_total {}

# HELP warden_dispositions_total Plans evaluated, by disposition status.
# TYPE warden_dispositions_total counter
warden_dispositions_total{{status="Approved"}} {}
warden_dispositions_total{{status="PartiallyApproved"}} {}
warden_dispositions_total{{status="Blocked"}} {}
warden_dispositions_total{{status="SimulationOnly"}} {}

# HELP warden_service_unavailable_total Plans refused because the upstream was unavailable.
# TYPE warden_service_unavailable_total counter
warden_service_unavailable_total {}

# HELP warden_budget_exceeded_total Plans refused for budget.
# TYPE warden_budget_exceeded_total counter
warden_budget_exceeded_total {}

# HELP warden_failed_total Plans that ended in any other error.
# TYPE warden_failed_total counter
warden_failed_total {}

# HELP warden_breaker_state Upstream circuit breaker state (0=closed, 1=half-open, 2=open).
# TYPE warden_breaker_state gauge
warden_breaker_state {}
"#,
            uptime,
            m.http_requests_total.load(Ordering::Relaxed),
            m.http_errors_total.load(Ordering::Relaxed),
            m.submissions_total.load(Ordering::Relaxed),
            m.approved_total.load(Ordering::Relaxed),
            m.partially_approved_total.load(Ordering::Relaxed),
            m.blocked_total.load(Ordering::Relaxed),
            m.simulation_only_total.load(Ordering::Relaxed),
            m.service_unavailable_total.load(Ordering::Relaxed),
            m.budget_exceeded_total.load(Ordering::Relaxed),
            m.failed_total.load(Ordering::Relaxed),
            breaker.gauge(),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_counter_increments() {
        let m = Metrics::new();
        m.inc_http_requests();
        m.inc_http_requests();
        m.inc_submissions();
        let output = m.render_prometheus(BreakerState::Closed);
        assert!(output.contains("warden_http_requests_total 2"));
        assert!(output.contains("warden_submissions_total 1"));
    }

    #[test]
    fn test_metrics_outcomes() {
        let m = Metrics::new();
        m.record_disposition(DispositionStatus::Blocked);
        m.record_disposition(DispositionStatus::Blocked);
        m.record_error(&WardenError::BudgetExceeded {
            resource: "daily_budget".into(),
            used: 1.0,
            limit: 1.0,
        });
        m.record_error(&WardenError::Cancelled);
        let output = m.render_prometheus(BreakerState::Open);
        assert!(output.contains("warden_dispositions_total{status=\"Blocked\"} 2"));
        assert!(output.contains("warden_budget_exceeded_total 1"));
        assert!(output.contains("warden_failed_total 1"));
        assert!(output.contains("warden_breaker_state 2"));
    }

    #[test]
    fn test_metrics_prometheus_format() {
        let m = Metrics::new();
        let output = m.render_prometheus(BreakerState::Closed);
        assert!(output.contains("# HELP warden_uptime_seconds"));
        assert!(output.contains("# TYPE warden_uptime_seconds gauge"));
        assert!(output.contains("# TYPE warden_dispositions_total counter"));
    }
}
