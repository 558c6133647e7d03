//! # warden-gateway
//!
//! Owns one instance of every pipeline component and runs requests through
//! them in order. See [`Gateway::submit`].

pub mod auditor;
pub mod gateway;
pub mod kill_switch;

pub use auditor::{RedundantAuditor, apply_auditor_verdict};
pub use gateway::Gateway;
pub use kill_switch::KillSwitch;
