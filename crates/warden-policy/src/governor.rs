use std::time::Instant;
use tracing::info;

use warden_config::{PolicyConfig, WardenConfig};
use warden_core::{Action, GovernorVerdict, PolicyViolation, Tier};

use crate::ratelimit::{RateLimiter, RateWindow};

/// Rule names recorded on violations.
pub mod rules {
    pub const DENIED_ACTION_TYPE: &str = "denied_action_type";
    pub const DENIED_RESOURCE: &str = "denied_resource";
    pub const TEMPLATE_NOT_ALLOWED: &str = "template_not_allowed";
    pub const ACTION_TYPE_NOT_ALLOWED: &str = "action_type_not_allowed";
    pub const PER_ACTION_CEILING: &str = "per_action_ceiling";
    pub const RATE_LIMIT: &str = "rate_limit";
    pub const CALLER_NOT_ALLOWED: &str = "caller_not_allowed";
}

/// The policy engine every action passes through.
///
/// One `evaluate` call consumes rate-limit units exactly once per action,
/// so a plan must never be evaluated twice.
#[derive(Debug, Clone)]
pub struct Governor {
    policy: PolicyConfig,
    per_action_max: f64,
    limiter: RateLimiter,
    denied_types: Vec<String>,
    denied_resources: Vec<String>,
}

impl Governor {
    pub fn new(policy: PolicyConfig, per_action_max: f64, limiter: RateLimiter) -> Self {
        let lower = |v: &[String]| -> Vec<String> {
            v.iter().map(|s| s.trim().to_lowercase()).collect()
        };
        Self {
            denied_types: lower(&policy.denied_action_types),
            denied_resources: lower(&policy.denied_resources),
            policy,
            per_action_max,
            limiter,
        }
    }

    pub fn from_config(config: &WardenConfig) -> Self {
        Self::new(
            config.policy.clone(),
            config.budget.per_action_max,
            RateLimiter::new(config.rate_limit.clone()),
        )
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn caller_allowed(&self, caller_id: &str) -> bool {
        self.policy
            .allowed_callers
            .iter()
            .any(|c| c == "*" || c == caller_id)
    }

    pub fn evaluate(&self, actions: &[Action], caller_id: &str) -> GovernorVerdict {
        self.evaluate_at(actions, caller_id, Instant::now())
    }

    /// Run every rule over every action and collect the violations.
    pub fn evaluate_at(&self, actions: &[Action], caller_id: &str, now: Instant) -> GovernorVerdict {
        let mut verdict = GovernorVerdict {
            passed: true,
            caller_allowed: true,
            blocked_actions: vec![],
            budget_violations: vec![],
            rate_limit_violations: vec![],
            allowlist_violations: vec![],
        };

        for action in actions {
            let id = action.action_id.as_str();

            // 1. Deny lists
            let action_type = action.action_type.trim().to_lowercase();
            if self.denied_types.contains(&action_type) {
                verdict.blocked_actions.push(PolicyViolation::new(
                    id,
                    rules::DENIED_ACTION_TYPE,
                    format!("action type '{}' is on the deny-list", action.action_type),
                ));
            }
            for resource in &action.resources {
                let lowered = resource.to_lowercase();
                if let Some(denied) = self
                    .denied_resources
                    .iter()
                    .find(|d| !d.is_empty() && lowered.contains(d.as_str()))
                {
                    verdict.blocked_actions.push(PolicyViolation::new(
                        id,
                        rules::DENIED_RESOURCE,
                        format!("resource '{resource}' matches denied resource '{denied}'"),
                    ));
                }
            }

            // 2. Allow lists
            if !self.policy.allowed_action_types.is_empty()
                && !self
                    .policy
                    .allowed_action_types
                    .iter()
                    .any(|t| t.trim().eq_ignore_ascii_case(&action_type))
            {
                verdict.allowlist_violations.push(PolicyViolation::new(
                    id,
                    rules::ACTION_TYPE_NOT_ALLOWED,
                    format!("action type '{}' is not on the allow-list", action.action_type),
                ));
            }
            if action.tier == Tier::Tier2Constrained {
                match action.template_id.as_deref() {
                    Some(t) if self.policy.allowed_templates.iter().any(|a| a == t) => {}
                    Some(t) => verdict.allowlist_violations.push(PolicyViolation::new(
                        id,
                        rules::TEMPLATE_NOT_ALLOWED,
                        format!("template '{t}' is not on the template allow-list"),
                    )),
                    None => verdict.allowlist_violations.push(PolicyViolation::new(
                        id,
                        rules::TEMPLATE_NOT_ALLOWED,
                        "Tier2 action has no templateId",
                    )),
                }
            }

            // 3. Per-action ceiling
            if action.budget_impact > self.per_action_max {
                verdict.budget_violations.push(PolicyViolation::new(
                    id,
                    rules::PER_ACTION_CEILING,
                    format!(
                        "budget impact {} exceeds per-action ceiling {}",
                        action.budget_impact, self.per_action_max
                    ),
                ));
            }

            // 4. Rate limits
            let mut exceeded = Vec::new();
            if !self.limiter.try_acquire_at(caller_id, RateWindow::PerMinute, now) {
                exceeded.push(RateWindow::PerMinute);
            }
            if let Some(window) = RateWindow::for_tier(action.tier)
                && !self.limiter.try_acquire_at(caller_id, window, now)
            {
                exceeded.push(window);
            }
            if !exceeded.is_empty() {
                let names: Vec<_> = exceeded.iter().map(RateWindow::as_str).collect();
                verdict.rate_limit_violations.push(PolicyViolation::new(
                    id,
                    rules::RATE_LIMIT,
                    format!("rate limit exceeded: {}", names.join(", ")),
                ));
            }
        }

        // 5. Caller allow-list
        if !self.caller_allowed(caller_id) {
            verdict.caller_allowed = false;
            for action in actions {
                verdict.allowlist_violations.push(PolicyViolation::new(
                    &action.action_id,
                    rules::CALLER_NOT_ALLOWED,
                    format!("caller '{caller_id}' is not on the caller allow-list"),
                ));
            }
        }

        verdict.passed = verdict.caller_allowed && verdict.violations().next().is_none();

        for v in verdict.violations() {
            info!(
                caller_id,
                action_id = %v.action_id,
                rule = %v.rule,
                reason = %v.reason,
                "governor violation"
            );
        }

        verdict
    }

    /// Clear rate-limit state.
    pub fn reset(&self) {
        self.limiter.reset();
    }
}

/// Write a governor verdict onto the classified actions.
pub fn apply_verdict(actions: &mut [Action], verdict: &GovernorVerdict) {
    for action in actions {
        action.governor_approved = verdict.approves(&action.action_id);
        if !action.governor_approved {
            action.auto_executable = false;
        }
    }
}
