use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_core::{AuditorVerdict, Disposition, GovernorVerdict, SubmitRequest, WardenError};

/// `prev_hash` of the first entry in a log.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Infrastructure error that ended a request before a disposition existed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditError {
    pub kind: String,
    pub message: String,
}

impl From<&WardenError> for AuditError {
    fn from(e: &WardenError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

/// One line of the audit log. Written once, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub log_id: Uuid,
    /// Position in the chain, starting at 0.
    pub sequence: u64,
    pub correlation_id: String,
    pub caller_id: String,
    pub timestamp: DateTime<Utc>,
    pub request: SubmitRequest,
    /// Absent when the request ended in an infrastructure error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disposition: Option<Disposition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AuditError>,
    /// `entry_hash` of the previous entry, or [`GENESIS_HASH`].
    pub prev_hash: String,
    /// BLAKE3 of this entry's canonical JSON with `entry_hash` empty.
    #[serde(default)]
    pub entry_hash: String,
}

impl AuditLogEntry {
    pub fn governor_verdict(&self) -> Option<&GovernorVerdict> {
        self.disposition.as_ref().map(|d| &d.governor_verdict)
    }

    pub fn auditor_verdict(&self) -> Option<&AuditorVerdict> {
        self.disposition.as_ref().map(|d| &d.auditor_verdict)
    }

    /// Hash of the entry as it would be written, ignoring the stored hash.
    pub fn compute_hash(&self) -> String {
        let mut unsealed = self.clone();
        unsealed.entry_hash.clear();
        let json = serde_json::to_vec(&unsealed).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }

    /// Fill in `entry_hash`.
    pub fn seal(&mut self) {
        self.entry_hash = self.compute_hash();
    }

    pub fn is_sealed_correctly(&self) -> bool {
        self.entry_hash == self.compute_hash()
    }
}

/// Result of verifying the hash chain over a sequence of entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub total_entries: u64,
    pub chain_intact: bool,
    /// Sequence of the first entry whose hash or link does not check out.
    pub first_break_at: Option<u64>,
    pub missing_sequences: Vec<u64>,
    /// (first, last) sequence seen.
    pub sequence_range: Option<(u64, u64)>,
}

/// Verify links, hashes and sequence continuity of `entries`, in log order.
///
/// A log that starts at sequence 0 must start from [`GENESIS_HASH`]; a
/// later starting point (a partial read) is taken on trust.
pub fn verify_chain(entries: &[AuditLogEntry]) -> ChainVerification {
    let mut first_break_at = None;
    let mut missing_sequences = Vec::new();
    fn mark(seq: u64, first_break_at: &mut Option<u64>) {
        if first_break_at.is_none() {
            *first_break_at = Some(seq);
        }
    }

    let mut prev: Option<&AuditLogEntry> = None;
    for entry in entries {
        if !entry.is_sealed_correctly() {
            mark(entry.sequence, &mut first_break_at);
        }
        match prev {
            None => {
                if entry.sequence == 0 && entry.prev_hash != GENESIS_HASH {
                    mark(entry.sequence, &mut first_break_at);
                }
            }
            Some(p) => {
                let expected = p.sequence + 1;
                if entry.sequence > expected {
                    missing_sequences.extend(expected..entry.sequence);
                } else if entry.sequence < expected {
                    mark(entry.sequence, &mut first_break_at);
                }
                if entry.prev_hash != p.entry_hash {
                    mark(entry.sequence, &mut first_break_at);
                }
            }
        }
        prev = Some(entry);
    }

    ChainVerification {
        total_entries: entries.len() as u64,
        chain_intact: first_break_at.is_none() && missing_sequences.is_empty(),
        first_break_at,
        missing_sequences,
        sequence_range: entries
            .first()
            .zip(entries.last())
            .map(|(f, l)| (f.sequence, l.sequence)),
    }
}
