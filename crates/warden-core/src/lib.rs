//! # warden-core
//!
//! Core types and error definitions for the warden action governance pipeline.
//! This crate defines the shared vocabulary used by every other crate in the workspace:
//! proposed and classified actions, plans, governor and auditor verdicts, and the
//! final disposition.

pub mod action;
pub mod error;
pub mod request;
pub mod verdict;

pub use action::{Action, Plan, ProposedAction, RiskLevel, Tier, assign_action_ids};
pub use error::{Result, WardenError};
pub use request::{DEFAULT_TIMEOUT_MS, SubmitRequest};
pub use verdict::{
    AUDITOR_SKIPPED, AuditorVerdict, Disposition, DispositionStatus, ExecutionSummary,
    GovernorVerdict, PolicyViolation,
};
