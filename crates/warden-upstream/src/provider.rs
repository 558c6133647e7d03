use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use warden_core::{Action, ProposedAction, Result, WardenError};

/// Sent to the planner to refine a proposed batch (pipeline step 4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningRequest {
    pub caller_id: String,
    pub correlation_id: String,
    pub actions: Vec<ProposedAction>,
    pub simulate_only: bool,
}

/// The planner's refined batch. This is what gets classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRefinement {
    pub actions: Vec<ProposedAction>,
    #[serde(default)]
    pub rationale: String,
}

impl PlanRefinement {
    /// Pass a request through unchanged.
    pub fn passthrough(request: &PlanningRequest) -> Self {
        Self {
            actions: request.actions.clone(),
            rationale: String::new(),
        }
    }

    /// Reject refinements that cannot be the answer to `request`.
    pub fn validate(&self, request: &PlanningRequest) -> Result<()> {
        if self.actions.is_empty() && !request.actions.is_empty() {
            return Err(WardenError::MalformedUpstream(format!(
                "planner returned no actions for a batch of {}",
                request.actions.len()
            )));
        }
        if let Some(a) = self.actions.iter().find(|a| a.action_type.trim().is_empty()) {
            return Err(WardenError::MalformedUpstream(format!(
                "planner returned an action without a type (id {:?})",
                a.action_id
            )));
        }
        Ok(())
    }
}

/// Sent to the verifier by the redundant auditor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub correlation_id: String,
    pub caller_id: String,
    pub model: String,
    /// Planner rationale, if any.
    pub context: String,
    pub actions: Vec<Action>,
}

impl VerificationRequest {
    pub fn action_ids(&self) -> Vec<String> {
        self.actions.iter().map(|a| a.action_id.clone()).collect()
    }
}

/// The verifier's decision on every submitted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub model: String,
    pub approved: Vec<String>,
    pub rejected: Vec<String>,
    pub downgraded: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
}

impl VerificationReport {
    /// Every submitted id must land in exactly one list and nothing else
    /// may appear. Anything less is treated as no answer at all.
    pub fn validate(&self, request: &VerificationRequest) -> Result<()> {
        let submitted: BTreeSet<&str> = request.actions.iter().map(|a| a.action_id.as_str()).collect();
        let mut seen = BTreeSet::new();
        for id in self.approved.iter().chain(&self.rejected).chain(&self.downgraded) {
            if !submitted.contains(id.as_str()) {
                return Err(WardenError::MalformedUpstream(format!(
                    "verifier returned unknown action id '{id}'"
                )));
            }
            if !seen.insert(id.as_str()) {
                return Err(WardenError::MalformedUpstream(format!(
                    "verifier returned action id '{id}' more than once"
                )));
            }
        }
        if let Some(missing) = submitted.difference(&seen).next() {
            return Err(WardenError::MalformedUpstream(format!(
                "verifier returned no decision for action id '{missing}'"
            )));
        }
        if self.model.trim().is_empty() {
            return Err(WardenError::MalformedUpstream(
                "verifier report has no model name".into(),
            ));
        }
        Ok(())
    }
}

/// The external planning and verification service.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Human-readable name used in logs and metrics.
    fn name(&self) -> &str;

    /// Refine a proposed batch into the batch that will be governed.
    async fn refine(&self, request: &PlanningRequest) -> Result<PlanRefinement>;

    /// Second-opinion review of Tier2+ actions.
    async fn verify(&self, request: &VerificationRequest) -> Result<VerificationReport>;

    /// Check if the service is reachable.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
