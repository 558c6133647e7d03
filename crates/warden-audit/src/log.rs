use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info};
use uuid::Uuid;

use warden_config::AuditConfig;
use warden_core::{Disposition, SubmitRequest, WardenError};

use crate::entry::{AuditError, AuditLogEntry, GENESIS_HASH};
use crate::sink::{AuditSink, JsonlFileSink, MemorySink};

struct ChainState {
    next_sequence: u64,
    last_hash: String,
}

/// The pipeline's append-only record of every `submit`.
///
/// Appends never fail: a sink error is reported on the error log and
/// counted, and the already computed disposition is left untouched.
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
    chain: Mutex<ChainState>,
    write_failures: AtomicU64,
}

impl AuditLog {
    /// Start a fresh chain on `sink`.
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self::resume(sink, 0, GENESIS_HASH.to_string())
    }

    /// Continue a chain whose last entry had `next_sequence - 1` and `last_hash`.
    pub fn resume(sink: Arc<dyn AuditSink>, next_sequence: u64, last_hash: String) -> Self {
        Self {
            sink,
            chain: Mutex::new(ChainState {
                next_sequence,
                last_hash,
            }),
            write_failures: AtomicU64::new(0),
        }
    }

    /// Continue from whatever `sink` already holds.
    pub fn continue_on(sink: Arc<dyn AuditSink>) -> warden_core::Result<Self> {
        match sink.last_entry()? {
            Some(last) => {
                info!(sink = sink.name(), next_sequence = last.sequence + 1, "resuming audit chain");
                Ok(Self::resume(sink, last.sequence + 1, last.entry_hash))
            }
            None => Ok(Self::new(sink)),
        }
    }

    /// Open the configured JSON-lines file and continue its chain.
    pub fn open_file(config: &AuditConfig) -> warden_core::Result<Self> {
        let sink = JsonlFileSink::open(&config.path, config.rotate_bytes)?;
        Self::continue_on(Arc::new(sink))
    }

    /// A log backed by memory, plus a handle for reading it back.
    pub fn in_memory() -> (Self, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (Self::new(sink.clone()), sink)
    }

    pub fn append_disposition(&self, request: &SubmitRequest, disposition: &Disposition) -> AuditLogEntry {
        self.append(
            &disposition.correlation_id,
            request,
            Some(disposition.clone()),
            None,
        )
    }

    pub fn append_error(
        &self,
        correlation_id: &str,
        request: &SubmitRequest,
        err: &WardenError,
    ) -> AuditLogEntry {
        self.append(correlation_id, request, None, Some(AuditError::from(err)))
    }

    fn append(
        &self,
        correlation_id: &str,
        request: &SubmitRequest,
        disposition: Option<Disposition>,
        error: Option<AuditError>,
    ) -> AuditLogEntry {
        // Held across the write so file order matches sequence order. The
        // sink does a buffered write and flush, no fsync, so blocking the
        // calling worker for that long is fine. A sink that syncs to disk
        // should move the write onto `spawn_blocking`.
        let mut chain = self.chain.lock();
        let mut entry = AuditLogEntry {
            log_id: Uuid::new_v4(),
            sequence: chain.next_sequence,
            correlation_id: correlation_id.to_string(),
            caller_id: request.caller_id.clone(),
            timestamp: Utc::now(),
            request: request.clone(),
            disposition,
            error,
            prev_hash: chain.last_hash.clone(),
            entry_hash: String::new(),
        };
        entry.seal();

        chain.next_sequence += 1;
        chain.last_hash = entry.entry_hash.clone();

        match self.sink.write(&entry) {
            Ok(()) => debug!(sequence = entry.sequence, correlation_id, "audit entry written"),
            Err(e) => {
                self.write_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    sink = self.sink.name(),
                    sequence = entry.sequence,
                    correlation_id,
                    error = %e,
                    "failed to write audit entry"
                );
            }
        }
        entry
    }

    pub fn next_sequence(&self) -> u64 {
        self.chain.lock().next_sequence
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }
}
