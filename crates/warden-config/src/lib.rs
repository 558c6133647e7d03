//! # warden-config
//!
//! Configuration system for warden. Reads from `warden.toml` and environment
//! variables, in that precedence order, and validates the result.
//!
//! Supports hot-reload via filesystem watcher (used for the global kill switch).

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::WardenConfig;
pub use schema::{
    AuditConfig, BreakerConfig, BudgetConfig, ConfigWarning, LoggingConfig, PolicyConfig,
    RateLimitConfig, RetryConfig, ServerConfig, TierConfig, UpstreamConfig, WarningSeverity,
};
