use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use warden_config::BudgetConfig;
use warden_core::WardenError;

/// Absorbs float drift when many small charges add up to exactly the limit.
const EPSILON: f64 = 1e-9;

/// The two rolling periods every caller is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetWindowKind {
    Day,
    Month,
}

impl BudgetWindowKind {
    /// Start of the period containing `now` (UTC midnight / first of month).
    pub fn period_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let date = match self {
            Self::Day => now.date_naive(),
            Self::Month => NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
                .unwrap_or_else(|| now.date_naive()),
        };
        Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
    }

    pub fn resource(&self) -> &'static str {
        match self {
            Self::Day => "daily_budget",
            Self::Month => "monthly_budget",
        }
    }
}

/// Consumption in one period for one caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetWindow {
    pub kind: BudgetWindowKind,
    pub used: f64,
    pub limit: f64,
    pub window_start: DateTime<Utc>,
}

impl BudgetWindow {
    fn new(kind: BudgetWindowKind, limit: f64, now: DateTime<Utc>) -> Self {
        Self {
            kind,
            used: 0.0,
            limit,
            window_start: kind.period_start(now),
        }
    }

    pub fn remaining(&self) -> f64 {
        (self.limit - self.used).max(0.0)
    }

    fn fits(&self, amount: f64) -> bool {
        self.used + amount <= self.limit + EPSILON
    }

    /// Reset the counter if the wall-clock period has moved on.
    fn roll(&mut self, now: DateTime<Utc>) {
        let start = self.kind.period_start(now);
        if start != self.window_start {
            debug!(window = ?self.kind, used = self.used, "budget window rolled over");
            self.window_start = start;
            self.used = 0.0;
        }
    }
}

/// Both windows for one caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerBudget {
    pub caller_id: String,
    pub day: BudgetWindow,
    pub month: BudgetWindow,
}

impl CallerBudget {
    fn new(caller_id: &str, limits: &BudgetConfig, now: DateTime<Utc>) -> Self {
        Self {
            caller_id: caller_id.to_string(),
            day: BudgetWindow::new(BudgetWindowKind::Day, limits.daily_limit, now),
            month: BudgetWindow::new(BudgetWindowKind::Month, limits.monthly_limit, now),
        }
    }

    fn window_mut(&mut self, kind: BudgetWindowKind) -> &mut BudgetWindow {
        match kind {
            BudgetWindowKind::Day => &mut self.day,
            BudgetWindowKind::Month => &mut self.month,
        }
    }

    fn roll(&mut self, now: DateTime<Utc>) {
        self.day.roll(now);
        self.month.roll(now);
    }
}

/// Per-caller day and month spend windows.
///
/// Each caller's entry is only ever touched while holding its map shard
/// lock, so check-and-charge is atomic per caller without a global lock.
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    callers: Arc<DashMap<String, CallerBudget>>,
    limits: BudgetConfig,
}

impl BudgetTracker {
    pub fn new(limits: BudgetConfig) -> Self {
        Self {
            callers: Arc::new(DashMap::new()),
            limits,
        }
    }

    pub fn limits(&self) -> &BudgetConfig {
        &self.limits
    }

    /// Atomically check one window and charge it if the amount fits.
    /// Returns whether it was charged and what is left afterwards.
    pub fn check_and_reserve(
        &self,
        caller_id: &str,
        kind: BudgetWindowKind,
        amount: f64,
    ) -> (bool, f64) {
        self.check_and_reserve_at(caller_id, kind, amount, Utc::now())
    }

    pub fn check_and_reserve_at(
        &self,
        caller_id: &str,
        kind: BudgetWindowKind,
        amount: f64,
        now: DateTime<Utc>,
    ) -> (bool, f64) {
        let mut entry = self
            .callers
            .entry(caller_id.to_string())
            .or_insert_with(|| CallerBudget::new(caller_id, &self.limits, now));
        entry.roll(now);
        let window = entry.window_mut(kind);
        if !window.fits(amount) {
            return (false, window.remaining());
        }
        window.used += amount;
        (true, window.remaining())
    }

    /// Charge `amount` against both windows, or neither.
    ///
    /// The returned guard refunds the charge when dropped unless
    /// [`BudgetReservation::commit`] was called.
    pub fn reserve(&self, caller_id: &str, amount: f64) -> warden_core::Result<BudgetReservation> {
        self.reserve_at(caller_id, amount, Utc::now())
    }

    pub fn reserve_at(
        &self,
        caller_id: &str,
        amount: f64,
        now: DateTime<Utc>,
    ) -> warden_core::Result<BudgetReservation> {
        let mut entry = self
            .callers
            .entry(caller_id.to_string())
            .or_insert_with(|| CallerBudget::new(caller_id, &self.limits, now));
        entry.roll(now);

        for window in [&entry.day, &entry.month] {
            if !window.fits(amount) {
                warn!(
                    caller_id,
                    window = ?window.kind,
                    used = window.used,
                    requested = amount,
                    limit = window.limit,
                    "budget exceeded"
                );
                return Err(WardenError::BudgetExceeded {
                    resource: window.kind.resource().into(),
                    used: window.used,
                    limit: window.limit,
                });
            }
        }

        entry.day.used += amount;
        entry.month.used += amount;
        debug!(
            caller_id,
            amount,
            day_used = entry.day.used,
            month_used = entry.month.used,
            "budget reserved"
        );

        Ok(BudgetReservation {
            tracker: self.clone(),
            caller_id: caller_id.to_string(),
            amount,
            day_start: entry.day.window_start,
            month_start: entry.month.window_start,
            committed: false,
        })
    }

    /// Current windows for a caller, rolled forward to now. `None` if the
    /// caller has never reserved anything.
    pub fn snapshot(&self, caller_id: &str) -> Option<CallerBudget> {
        let mut entry = self.callers.get_mut(caller_id)?;
        entry.roll(Utc::now());
        Some(entry.clone())
    }

    /// Number of callers currently holding an entry.
    pub fn tracked_callers(&self) -> usize {
        self.callers.len()
    }

    /// Evict callers with nothing charged in either current window. Returns
    /// how many were removed.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now())
    }

    pub fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.callers.len();
        self.callers.retain(|_, entry| {
            entry.roll(now);
            entry.day.used > EPSILON || entry.month.used > EPSILON
        });
        before.saturating_sub(self.callers.len())
    }

    /// Drop every caller's counters.
    pub fn reset(&self) {
        self.callers.clear();
    }

    fn refund(&self, caller_id: &str, amount: f64, day_start: DateTime<Utc>, month_start: DateTime<Utc>) {
        let Some(mut entry) = self.callers.get_mut(caller_id) else {
            return;
        };
        // A refund only applies to the period it was charged in.
        if entry.day.window_start == day_start {
            entry.day.used = (entry.day.used - amount).max(0.0);
        }
        if entry.month.window_start == month_start {
            entry.month.used = (entry.month.used - amount).max(0.0);
        }
        debug!(caller_id, amount, "budget reservation refunded");
    }
}

/// A budget charge that is refunded on drop unless committed.
#[derive(Debug)]
#[must_use = "dropping a reservation refunds it"]
pub struct BudgetReservation {
    tracker: BudgetTracker,
    caller_id: String,
    amount: f64,
    day_start: DateTime<Utc>,
    month_start: DateTime<Utc>,
    committed: bool,
}

impl BudgetReservation {
    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn caller_id(&self) -> &str {
        &self.caller_id
    }

    /// Keep the charge.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for BudgetReservation {
    fn drop(&mut self) {
        if !self.committed && self.amount > 0.0 {
            self.tracker
                .refund(&self.caller_id, self.amount, self.day_start, self.month_start);
        }
    }
}
