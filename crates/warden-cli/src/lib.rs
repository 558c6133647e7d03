//! # warden-cli
//!
//! Command-line interface for the warden governance pipeline.
//!
//! ## Commands
//!
//! - `warden serve` : Run the HTTP API
//! - `warden evaluate` : Run one plan file through the pipeline
//! - `warden config` : Show the effective configuration
//! - `warden validate` : Check the configuration for problems
//! - `warden verify-log` : Verify the audit log hash chain

pub mod commands;

pub use commands::Cli;
