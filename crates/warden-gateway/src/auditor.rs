//! Redundant second-opinion pass over Tier2+ actions.
//!
//! The auditor makes at most one outbound call per plan. Anything short of a
//! well-formed report (open breaker, timeout, transport error, malformed
//! body) produces a fail-closed verdict that rejects every audited action.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use warden_core::{Action, AuditorVerdict, Plan, Result, WardenError};
use warden_upstream::{CircuitBreaker, Upstream, VerificationReport, VerificationRequest};

pub struct RedundantAuditor {
    upstream: Arc<dyn Upstream>,
    breaker: CircuitBreaker,
    model: String,
}

impl RedundantAuditor {
    pub fn new(upstream: Arc<dyn Upstream>, breaker: CircuitBreaker, model: impl Into<String>) -> Self {
        Self {
            upstream,
            breaker,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Actions the auditor looks at: Tier2+ and still approved by the governor.
    pub fn candidates(plan: &Plan) -> Vec<Action> {
        plan.actions
            .iter()
            .filter(|a| a.tier.requires_audit() && a.governor_approved)
            .cloned()
            .collect()
    }

    /// Audit a plan. The only error is [`WardenError::Cancelled`]; every
    /// upstream problem becomes a fail-closed verdict instead.
    pub async fn audit(
        &self,
        plan: &Plan,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<AuditorVerdict> {
        let candidates = Self::candidates(plan);
        if candidates.is_empty() {
            debug!(plan_id = %plan.plan_id, "no Tier2+ actions to audit, skipping");
            return Ok(AuditorVerdict::skipped());
        }

        let audited: Vec<String> = candidates.iter().map(|a| a.action_id.clone()).collect();

        if !self.breaker.can_proceed() {
            return Ok(self.fail_closed(plan, audited, "circuit breaker is open"));
        }

        let request = VerificationRequest {
            correlation_id: plan.correlation_id.clone(),
            caller_id: plan.caller_id.clone(),
            model: self.model.clone(),
            context: plan.context.clone(),
            actions: candidates,
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WardenError::Cancelled),
            r = tokio::time::timeout(timeout, self.upstream.verify(&request)) => match r {
                Ok(inner) => inner.and_then(|report| report.validate(&request).map(|_| report)),
                Err(_) => Err(WardenError::UpstreamTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                }),
            },
        };

        match outcome {
            Ok(report) => {
                self.breaker.record_success();
                Ok(verdict_from_report(audited, report))
            }
            Err(e) => {
                self.breaker.record_failure();
                Ok(self.fail_closed(plan, audited, &e.to_string()))
            }
        }
    }

    fn fail_closed(&self, plan: &Plan, audited: Vec<String>, reason: &str) -> AuditorVerdict {
        warn!(
            plan_id = %plan.plan_id,
            correlation_id = %plan.correlation_id,
            upstream = self.upstream.name(),
            actions = audited.len(),
            reason,
            "auditor failed closed, rejecting all Tier2+ actions"
        );
        AuditorVerdict::fail_closed(audited, reason)
    }
}

fn verdict_from_report(audited: Vec<String>, report: VerificationReport) -> AuditorVerdict {
    let passed = report.rejected.is_empty();
    info!(
        model = %report.model,
        approved = report.approved.len(),
        rejected = report.rejected.len(),
        downgraded = report.downgraded.len(),
        "auditor verdict received"
    );
    AuditorVerdict {
        passed,
        audited_actions: audited,
        rejected_actions: report.rejected,
        downgraded_actions: report.downgraded,
        concerns: report.concerns,
        model_used: report.model,
        fail_closed: false,
    }
}

/// Write an auditor verdict onto the classified actions. Rejected actions
/// lose their auditor approval; downgraded ones keep it but can never run
/// automatically.
pub fn apply_auditor_verdict(actions: &mut [Action], verdict: &AuditorVerdict) {
    for action in actions {
        if verdict.rejects(&action.action_id) {
            action.auditor_approved = false;
            action.auto_executable = false;
        } else if verdict.downgrades(&action.action_id) {
            action.auto_executable = false;
        }
    }
}
