//! # warden-audit
//!
//! Immutable record of every governance decision.
//!
//! Each [`AuditLogEntry`] is one JSON line carrying the request, the
//! disposition (or the infrastructure error that replaced it), a sequence
//! number, and a BLAKE3 link to the previous entry. [`verify_chain`] replays
//! the links offline; rotated segments are read back in order by
//! [`read_log`].

pub mod entry;
pub mod log;
pub mod sink;

pub use entry::{AuditError, AuditLogEntry, ChainVerification, GENESIS_HASH, verify_chain};
pub use log::AuditLog;
pub use sink::{AuditSink, JsonlFileSink, MemorySink, read_log, segments};
