use serde::{Deserialize, Serialize};

use crate::action::ProposedAction;

/// Default bound on the outbound planner call, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Inbound request from the planning collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub caller_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub actions: Vec<ProposedAction>,
    #[serde(default)]
    pub simulate_only: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Estimated cost of the whole plan. Falls back to the sum of the
    /// actions' `budgetImpact` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_budget: Option<f64>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl SubmitRequest {
    pub fn new(caller_id: impl Into<String>, actions: Vec<ProposedAction>) -> Self {
        Self {
            caller_id: caller_id.into(),
            correlation_id: None,
            actions,
            simulate_only: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            estimated_budget: None,
        }
    }

    pub fn simulated(mut self) -> Self {
        self.simulate_only = true;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_estimated_budget(mut self, amount: f64) -> Self {
        self.estimated_budget = Some(amount);
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Cost to reserve against the caller's budget windows. Never negative;
    /// NaN becomes infinite so it can never fit a window.
    pub fn effective_budget(&self) -> f64 {
        let amount = self
            .estimated_budget
            .unwrap_or_else(|| self.actions.iter().map(|a| a.budget_impact.max(0.0)).sum());
        if amount.is_nan() { f64::INFINITY } else { amount.max(0.0) }
    }
}
