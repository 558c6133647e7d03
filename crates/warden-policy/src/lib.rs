//! # warden-policy
//!
//! The deterministic half of the pipeline: the action classifier, the
//! per-caller budget tracker and rate limiter, and the governor that
//! evaluates every classified action against static policy.

pub mod budget;
pub mod classifier;
pub mod governor;
pub mod ratelimit;

pub use budget::{BudgetReservation, BudgetTracker, BudgetWindow, BudgetWindowKind, CallerBudget};
pub use classifier::ActionClassifier;
pub use governor::{Governor, apply_verdict, rules};
pub use ratelimit::{RateLimiter, RateWindow};
