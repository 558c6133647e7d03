use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::action::{Action, Tier};

/// `model_used` value for an auditor pass that made no outbound call.
pub const AUDITOR_SKIPPED: &str = "SKIPPED";

/// A single policy rule hit, keyed by the action it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyViolation {
    pub action_id: String,
    /// Rule name, e.g. "denied_action_type", "per_action_ceiling".
    pub rule: String,
    pub reason: String,
}

impl PolicyViolation {
    pub fn new(action_id: &str, rule: &str, reason: impl Into<String>) -> Self {
        Self {
            action_id: action_id.to_string(),
            rule: rule.to_string(),
            reason: reason.into(),
        }
    }
}

/// Outcome of one governor evaluation over a whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernorVerdict {
    pub passed: bool,
    pub caller_allowed: bool,
    pub blocked_actions: Vec<PolicyViolation>,
    pub budget_violations: Vec<PolicyViolation>,
    pub rate_limit_violations: Vec<PolicyViolation>,
    pub allowlist_violations: Vec<PolicyViolation>,
}

impl GovernorVerdict {
    /// All violations across the four lists, in list order.
    pub fn violations(&self) -> impl Iterator<Item = &PolicyViolation> {
        self.blocked_actions
            .iter()
            .chain(&self.budget_violations)
            .chain(&self.rate_limit_violations)
            .chain(&self.allowlist_violations)
    }

    pub fn violating_ids(&self) -> BTreeSet<&str> {
        self.violations().map(|v| v.action_id.as_str()).collect()
    }

    /// Whether the governor let this action through.
    pub fn approves(&self, action_id: &str) -> bool {
        self.caller_allowed && !self.violations().any(|v| v.action_id == action_id)
    }
}

/// Outcome of the redundant second-opinion pass over Tier2+ actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditorVerdict {
    pub passed: bool,
    /// Action ids that were sent for audit.
    pub audited_actions: Vec<String>,
    pub rejected_actions: Vec<String>,
    pub downgraded_actions: Vec<String>,
    pub concerns: Vec<String>,
    pub model_used: String,
    /// True when the verdict was produced without a usable upstream answer.
    #[serde(default)]
    pub fail_closed: bool,
}

impl AuditorVerdict {
    /// Verdict for a batch with nothing to audit.
    pub fn skipped() -> Self {
        Self {
            passed: true,
            audited_actions: vec![],
            rejected_actions: vec![],
            downgraded_actions: vec![],
            concerns: vec![],
            model_used: AUDITOR_SKIPPED.to_string(),
            fail_closed: false,
        }
    }

    /// Reject every audited action because no trustworthy answer was obtained.
    pub fn fail_closed(audited: Vec<String>, reason: &str) -> Self {
        Self {
            passed: false,
            rejected_actions: audited.clone(),
            audited_actions: audited,
            downgraded_actions: vec![],
            concerns: vec![format!(
                "auditor unavailable, rejecting all Tier2+ actions (fail closed): {reason}"
            )],
            model_used: "UNAVAILABLE".to_string(),
            fail_closed: true,
        }
    }

    pub fn was_skipped(&self) -> bool {
        self.model_used == AUDITOR_SKIPPED
    }

    pub fn rejects(&self, action_id: &str) -> bool {
        self.rejected_actions.iter().any(|id| id == action_id)
    }

    pub fn downgrades(&self, action_id: &str) -> bool {
        self.downgraded_actions.iter().any(|id| id == action_id)
    }

    /// Ran, and nothing it looked at survived.
    pub fn failed_outright(&self) -> bool {
        !self.passed
            && (self.fail_closed
                || (!self.audited_actions.is_empty()
                    && self.audited_actions.iter().all(|id| self.rejects(id))))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispositionStatus {
    Approved,
    PartiallyApproved,
    Blocked,
    SimulationOnly,
}

impl DispositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "Approved",
            Self::PartiallyApproved => "PartiallyApproved",
            Self::Blocked => "Blocked",
            Self::SimulationOnly => "SimulationOnly",
        }
    }
}

/// Counts of what is actually eligible to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub tier1_executed: u32,
    pub tier2_executed: u32,
    pub tier3_proposed: u32,
    pub blocked_actions: u32,
}

impl ExecutionSummary {
    pub fn from_actions(actions: &[Action], status: DispositionStatus) -> Self {
        let runnable = matches!(
            status,
            DispositionStatus::Approved | DispositionStatus::PartiallyApproved
        );
        let mut summary = Self::default();
        for action in actions {
            if !action.is_approved() {
                summary.blocked_actions += 1;
                continue;
            }
            if !runnable {
                continue;
            }
            match action.tier {
                Tier::Tier1Safe if action.auto_executable => summary.tier1_executed += 1,
                Tier::Tier2Constrained if action.auto_executable => summary.tier2_executed += 1,
                Tier::Tier3Sensitive => summary.tier3_proposed += 1,
                _ => {}
            }
        }
        summary
    }
}

/// The final, immutable outcome of governance for one plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disposition {
    pub plan_id: Uuid,
    pub correlation_id: String,
    pub caller_id: String,
    pub status: DispositionStatus,
    pub actions: Vec<Action>,
    pub governor_verdict: GovernorVerdict,
    pub auditor_verdict: AuditorVerdict,
    pub execution_summary: ExecutionSummary,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl Disposition {
    pub fn auto_executable(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(|a| a.auto_executable)
    }
}
