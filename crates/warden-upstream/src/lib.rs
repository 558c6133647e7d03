//! # warden-upstream
//!
//! The external planning and verification service, and the machinery that
//! guards calls to it: a shared circuit breaker and a fixed-backoff retry
//! policy with per-attempt timeouts and cancellation.

pub mod breaker;
pub mod http;
pub mod mock;
pub mod provider;
pub mod retry;

pub use breaker::{BreakerSnapshot, BreakerState, CircuitBreaker};
pub use http::HttpUpstream;
pub use mock::{MockFault, MockUpstream, MockVerdict};
pub use provider::{
    PlanRefinement, PlanningRequest, Upstream, VerificationReport, VerificationRequest,
};
pub use retry::{RetryPolicy, is_retryable};
