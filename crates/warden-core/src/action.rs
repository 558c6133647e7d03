use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Fixed risk classification of an action type.
///
/// - **Tier1Safe**: may execute automatically once the governor approves it.
/// - **Tier2Constrained**: needs a template allow-list match and a passing audit.
/// - **Tier3Sensitive**: never executes automatically; it can only be proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Tier1Safe,
    Tier2Constrained,
    Tier3Sensitive,
}

impl Tier {
    /// Whether an action of this tier may ever run without a human.
    pub fn allows_auto_execution(&self) -> bool {
        !matches!(self, Self::Tier3Sensitive)
    }

    /// Whether actions of this tier go through the redundant auditor.
    pub fn requires_audit(&self) -> bool {
        *self >= Self::Tier2Constrained
    }

    pub fn level(&self) -> u8 {
        match self {
            Self::Tier1Safe => 1,
            Self::Tier2Constrained => 2,
            Self::Tier3Sensitive => 3,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{} ({})", self.level(), match self {
            Self::Tier1Safe => "Safe",
            Self::Tier2Constrained => "Constrained",
            Self::Tier3Sensitive => "Sensitive",
        })
    }
}

/// Caller-declared risk. Advisory only: it is forwarded to the auditor but
/// never changes the tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

/// An action as submitted by the caller. There is deliberately no `tier`
/// field: any tier the caller sends is dropped during deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    pub action_type: String,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub budget_impact: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default)]
    pub risk_level: RiskLevel,
}

impl ProposedAction {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_id: None,
            action_type: action_type.into(),
            resources: vec![],
            budget_impact: 0.0,
            template_id: None,
            risk_level: RiskLevel::Low,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.action_id = Some(id.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resources.push(resource.into());
        self
    }

    pub fn with_budget(mut self, amount: f64) -> Self {
        self.budget_impact = amount;
        self
    }

    pub fn with_template(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = Some(template_id.into());
        self
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = risk;
        self
    }
}

/// A classified action inside a [`Plan`], annotated with its approval flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub action_id: String,
    pub action_type: String,
    pub tier: Tier,
    pub risk_level: RiskLevel,
    pub resources: BTreeSet<String>,
    pub budget_impact: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    pub auto_executable: bool,
    pub governor_approved: bool,
    pub auditor_approved: bool,
}

impl Action {
    /// Build a classified action. Approvals start out `true` and
    /// `auto_executable` starts out `false` until the pipeline computes it.
    pub fn classified(action_id: String, proposed: ProposedAction, tier: Tier) -> Self {
        Self {
            action_id,
            action_type: proposed.action_type,
            tier,
            risk_level: proposed.risk_level,
            resources: proposed.resources.into_iter().collect(),
            budget_impact: proposed.budget_impact.max(0.0),
            template_id: proposed.template_id,
            auto_executable: false,
            governor_approved: true,
            auditor_approved: true,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.governor_approved && self.auditor_approved
    }
}

/// An ordered batch of classified actions submitted together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub plan_id: Uuid,
    pub caller_id: String,
    pub correlation_id: String,
    pub actions: Vec<Action>,
    pub simulate_only: bool,
    /// Free-text rationale from the upstream planner, handed to the auditor.
    #[serde(default)]
    pub context: String,
}

impl Plan {
    pub fn has_tier(&self, tier: Tier) -> bool {
        self.actions.iter().any(|a| a.tier == tier)
    }

    pub fn action(&self, id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.action_id == id)
    }
}

/// Assign unique ids to a batch of proposed actions: missing ids become
/// `action-<index>`, repeated ids get a `#<n>` suffix.
pub fn assign_action_ids(actions: &[ProposedAction]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    actions
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let base = a
                .action_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("action-{i}"));
            let mut id = base.clone();
            let mut n = 2;
            while !seen.insert(id.clone()) {
                id = format!("{base}#{n}");
                n += 1;
            }
            id
        })
        .collect()
}
