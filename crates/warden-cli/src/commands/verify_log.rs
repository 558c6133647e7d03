use std::path::{Path, PathBuf};

use warden_audit::{ChainVerification, read_log, verify_chain};
use warden_core::WardenError;

pub(super) fn cmd_verify_log(path: PathBuf) -> warden_core::Result<()> {
    let report = verify(&path)?;
    println!("Audit log: {}", path.display());
    println!("  entries:   {}", report.total_entries);
    if let Some((first, last)) = report.sequence_range {
        println!("  sequences: {first}..={last}");
    }
    if !report.missing_sequences.is_empty() {
        println!("  missing:   {:?}", report.missing_sequences);
    }

    if report.chain_intact {
        println!("  chain:     intact");
        Ok(())
    } else {
        let at = report
            .first_break_at
            .map(|s| format!("sequence {s}"))
            .unwrap_or_else(|| "a sequence gap".into());
        println!("  chain:     BROKEN at {at}");
        Err(WardenError::AuditLog(format!(
            "hash chain of {} is broken at {at}",
            path.display()
        )))
    }
}

fn verify(path: &Path) -> warden_core::Result<ChainVerification> {
    let entries = read_log(path)?;
    Ok(verify_chain(&entries))
}
