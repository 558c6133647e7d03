use std::fmt::Write as _;
use std::path::Path;

use warden_config::WardenConfig;
use warden_core::{Disposition, SubmitRequest, WardenError};
use warden_gateway::Gateway;

pub(super) async fn cmd_evaluate(
    config: WardenConfig,
    plan: &Path,
    json: bool,
) -> warden_core::Result<()> {
    let request = read_request(plan)?;
    let gateway = Gateway::from_config(&config)?;
    let disposition = gateway.submit(request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&disposition)?);
    } else {
        print!("{}", render(&disposition));
    }
    Ok(())
}

fn read_request(path: &Path) -> warden_core::Result<SubmitRequest> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| WardenError::Config(format!("cannot read {}: {e}", path.display())))?;
    Ok(serde_json::from_str(&raw)?)
}

/// Human-readable summary of a disposition.
fn render(d: &Disposition) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Plan {} ({})", d.plan_id, d.correlation_id);
    let _ = writeln!(out, "Status: {}  [{} ms]", d.status.as_str(), d.latency_ms);
    let _ = writeln!(out);

    for a in &d.actions {
        let mark = if a.auto_executable {
            "auto"
        } else if a.is_approved() {
            "held"
        } else {
            "blocked"
        };
        let _ = writeln!(out, "  [{mark:>7}] {:<24} {:<24} {}", a.action_id, a.action_type, a.tier);
    }

    let violations: Vec<_> = d.governor_verdict.violations().collect();
    if !violations.is_empty() {
        let _ = writeln!(out, "\nGovernor:");
        for v in violations {
            let _ = writeln!(out, "  {} {}: {}", v.action_id, v.rule, v.reason);
        }
    }

    let auditor = &d.auditor_verdict;
    if !auditor.was_skipped() {
        let _ = writeln!(
            out,
            "\nAuditor ({}): {}",
            auditor.model_used,
            if auditor.passed { "passed" } else { "failed" }
        );
        for c in &auditor.concerns {
            let _ = writeln!(out, "  - {c}");
        }
    }

    let s = &d.execution_summary;
    let _ = writeln!(
        out,
        "\nTier1 executed: {}  Tier2 executed: {}  Tier3 proposed: {}  Blocked: {}",
        s.tier1_executed, s.tier2_executed, s.tier3_proposed, s.blocked_actions
    );
    out
}
