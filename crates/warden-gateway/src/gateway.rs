//! The pipeline orchestrator.
//!
//! `submit` runs one request through breaker, budget, planner, classifier,
//! governor and auditor, then records the outcome in the audit log. Policy
//! and audit rejections come back inside the [`Disposition`]; only
//! infrastructure failures are errors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use warden_audit::AuditLog;
use warden_config::WardenConfig;
use warden_core::{
    Action, AuditorVerdict, Disposition, DispositionStatus, ExecutionSummary, GovernorVerdict,
    Plan, Result, SubmitRequest, WardenError,
};
use warden_policy::{ActionClassifier, BudgetTracker, Governor, apply_verdict};
use warden_upstream::{
    CircuitBreaker, HttpUpstream, PlanRefinement, PlanningRequest, RetryPolicy, Upstream,
};

use crate::auditor::{RedundantAuditor, apply_auditor_verdict};
use crate::kill_switch::KillSwitch;

pub struct Gateway {
    classifier: ActionClassifier,
    governor: Governor,
    budget: BudgetTracker,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    auditor: RedundantAuditor,
    upstream: Arc<dyn Upstream>,
    audit_log: Arc<AuditLog>,
    kill_switch: KillSwitch,
    default_timeout: Duration,
}

impl Gateway {
    /// Build a gateway whose components are all owned by this instance.
    pub fn new(config: &WardenConfig, upstream: Arc<dyn Upstream>, audit_log: Arc<AuditLog>) -> Self {
        let breaker = CircuitBreaker::from_config(upstream.name(), &config.breaker);
        let auditor = RedundantAuditor::new(
            Arc::clone(&upstream),
            breaker.clone(),
            config.upstream.model.clone(),
        );
        Self {
            classifier: ActionClassifier::new(&config.tiers),
            governor: Governor::from_config(config),
            budget: BudgetTracker::new(config.budget.clone()),
            breaker,
            retry: RetryPolicy::from_config(&config.retry),
            auditor,
            upstream,
            audit_log,
            kill_switch: KillSwitch::new(config.policy.kill_switch),
            default_timeout: Duration::from_millis(config.upstream.default_timeout_ms),
        }
    }

    /// HTTP upstream plus the on-disk audit log named in `config`.
    pub fn from_config(config: &WardenConfig) -> Result<Self> {
        let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::from_config(&config.upstream));
        let audit_log = Arc::new(AuditLog::open_file(&config.audit)?);
        Ok(Self::new(config, upstream, audit_log))
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn budget(&self) -> &BudgetTracker {
        &self.budget
    }

    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    pub fn classifier(&self) -> &ActionClassifier {
        &self.classifier
    }

    pub fn upstream(&self) -> &Arc<dyn Upstream> {
        &self.upstream
    }

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit_log
    }

    pub fn kill_switch(&self) -> &KillSwitch {
        &self.kill_switch
    }

    /// Returns the previous state.
    pub fn set_kill_switch(&self, active: bool) -> bool {
        self.kill_switch.set(active)
    }

    /// Evict idle budget entries and expired rate-limit counters. Both maps
    /// are keyed by caller id, so without this they grow with every id seen.
    pub fn cleanup(&self) -> (usize, usize) {
        let budgets = self.budget.cleanup();
        let counters = self.governor.limiter().cleanup();
        if budgets + counters > 0 {
            debug!(budgets, counters, "evicted idle caller state");
        }
        (budgets, counters)
    }

    /// Clear breaker, budget and rate-limit state. The audit log is untouched.
    pub fn reset_for_test(&self) {
        self.breaker.reset();
        self.budget.reset();
        self.governor.reset();
    }

    pub async fn submit(&self, request: SubmitRequest) -> Result<Disposition> {
        self.submit_with_cancel(request, &CancellationToken::new()).await
    }

    /// Run one request through the pipeline. Every call that runs to
    /// completion appends exactly one audit entry, success or not.
    pub async fn submit_with_cancel(
        &self,
        request: SubmitRequest,
        cancel: &CancellationToken,
    ) -> Result<Disposition> {
        let started = Instant::now();
        let correlation_id = request
            .correlation_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let result = self.run(&request, &correlation_id, started, cancel).await;
        match &result {
            Ok(disposition) => {
                self.audit_log.append_disposition(&request, disposition);
            }
            Err(e) => {
                warn!(
                    caller_id = %request.caller_id,
                    correlation_id = %correlation_id,
                    kind = e.kind(),
                    error = %e,
                    "plan not evaluated"
                );
                self.audit_log.append_error(&correlation_id, &request, e);
            }
        }
        result
    }

    async fn run(
        &self,
        request: &SubmitRequest,
        correlation_id: &str,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<Disposition> {
        let caller_id = request.caller_id.as_str();

        let simulate_only = request.simulate_only || self.kill_switch.is_active();
        if simulate_only && !request.simulate_only {
            info!(caller_id, correlation_id, "kill switch active, forcing simulation");
        }

        if !self.breaker.can_proceed() {
            return Err(WardenError::ServiceUnavailable {
                reason: format!("circuit breaker '{}' is open", self.breaker.name()),
            });
        }

        let reservation = self.budget.reserve(caller_id, request.effective_budget())?;

        let timeout = self.attempt_timeout(request.timeout_ms);
        let planning = PlanningRequest {
            caller_id: caller_id.to_string(),
            correlation_id: correlation_id.to_string(),
            actions: request.actions.clone(),
            simulate_only,
        };
        let refinement = self.refine(&planning, timeout, cancel).await?;

        let mut plan = Plan {
            plan_id: Uuid::new_v4(),
            caller_id: caller_id.to_string(),
            correlation_id: correlation_id.to_string(),
            actions: self.classifier.classify_all(refinement.actions),
            simulate_only,
            context: refinement.rationale,
        };
        for action in &mut plan.actions {
            action.auto_executable = action.tier.allows_auto_execution();
        }

        let governor_verdict = self.governor.evaluate(&plan.actions, caller_id);
        apply_verdict(&mut plan.actions, &governor_verdict);

        let auditor_verdict = self.auditor.audit(&plan, timeout, cancel).await?;
        apply_auditor_verdict(&mut plan.actions, &auditor_verdict);

        let status = finalize(
            &mut plan.actions,
            &governor_verdict,
            &auditor_verdict,
            simulate_only,
        );

        // Only plans that can actually run keep their charge.
        if matches!(
            status,
            DispositionStatus::Approved | DispositionStatus::PartiallyApproved
        ) {
            reservation.commit();
        } else {
            debug!(caller_id, status = status.as_str(), "releasing budget reservation");
        }

        let disposition = Disposition {
            plan_id: plan.plan_id,
            correlation_id: plan.correlation_id,
            caller_id: plan.caller_id,
            status,
            execution_summary: ExecutionSummary::from_actions(&plan.actions, status),
            actions: plan.actions,
            governor_verdict,
            auditor_verdict,
            latency_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        };

        info!(
            plan_id = %disposition.plan_id,
            caller_id,
            correlation_id,
            status = status.as_str(),
            actions = disposition.actions.len(),
            latency_ms = disposition.latency_ms,
            "plan evaluated"
        );
        Ok(disposition)
    }

    /// Step 4: the single retried outbound call. Caller cancellation never
    /// counts against the breaker.
    async fn refine(
        &self,
        planning: &PlanningRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<PlanRefinement> {
        let upstream = self.upstream.as_ref();
        let outcome = self
            .retry
            .run("refine", timeout, cancel, |attempt| async move {
                debug!(attempt, upstream = upstream.name(), "calling planner");
                let refinement = upstream.refine(planning).await?;
                refinement.validate(planning)?;
                Ok(refinement)
            })
            .await;

        match outcome {
            Ok(refinement) => {
                self.breaker.record_success();
                Ok(refinement)
            }
            Err(WardenError::Cancelled) => Err(WardenError::Cancelled),
            Err(e) => {
                self.breaker.record_failure();
                Err(WardenError::ServiceUnavailable {
                    reason: format!("upstream planner failed: {e}"),
                })
            }
        }
    }

    fn attempt_timeout(&self, timeout_ms: u64) -> Duration {
        if timeout_ms == 0 {
            self.default_timeout
        } else {
            Duration::from_millis(timeout_ms)
        }
    }
}

/// Compute the plan status and settle every `auto_executable` flag.
fn finalize(
    actions: &mut [Action],
    governor: &GovernorVerdict,
    auditor: &AuditorVerdict,
    simulate_only: bool,
) -> DispositionStatus {
    for action in actions.iter_mut() {
        action.auto_executable = action.auto_executable
            && action.is_approved()
            && action.tier.allows_auto_execution()
            && !auditor.downgrades(&action.action_id);
    }

    let governor_failed =
        !governor.caller_allowed || (!actions.is_empty() && actions.iter().all(|a| !a.governor_approved));
    let blocked = governor_failed || auditor.failed_outright();

    let status = if simulate_only {
        DispositionStatus::SimulationOnly
    } else if blocked {
        DispositionStatus::Blocked
    } else if actions.iter().any(|a| !a.auto_executable) {
        DispositionStatus::PartiallyApproved
    } else {
        DispositionStatus::Approved
    };

    if matches!(
        status,
        DispositionStatus::SimulationOnly | DispositionStatus::Blocked
    ) {
        for action in actions.iter_mut() {
            action.auto_executable = false;
        }
    }
    status
}
