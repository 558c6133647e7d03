use std::collections::HashMap;

use warden_config::TierConfig;
use warden_core::{Action, ProposedAction, Tier, assign_action_ids};

/// Maps an action type to its tier through a static table.
///
/// Lookups are total: anything missing from the table is `Tier1Safe`.
#[derive(Debug, Clone)]
pub struct ActionClassifier {
    table: HashMap<String, Tier>,
}

impl Default for ActionClassifier {
    fn default() -> Self {
        Self::new(&TierConfig::default())
    }
}

impl ActionClassifier {
    pub fn new(tiers: &TierConfig) -> Self {
        let mut table = HashMap::new();
        for (tier, types) in [
            (Tier::Tier1Safe, &tiers.tier1),
            (Tier::Tier2Constrained, &tiers.tier2),
            (Tier::Tier3Sensitive, &tiers.tier3),
        ] {
            for action_type in types {
                let entry = table.entry(normalize(action_type)).or_insert(tier);
                // Listed twice: the stricter tier wins.
                if tier > *entry {
                    *entry = tier;
                }
            }
        }
        Self { table }
    }

    pub fn classify(&self, action_type: &str) -> Tier {
        self.table
            .get(&normalize(action_type))
            .copied()
            .unwrap_or(Tier::Tier1Safe)
    }

    /// Assign ids and classify a whole batch. Whatever tier the caller had
    /// in mind is irrelevant here.
    pub fn classify_all(&self, proposed: Vec<ProposedAction>) -> Vec<Action> {
        let ids = assign_action_ids(&proposed);
        proposed
            .into_iter()
            .zip(ids)
            .map(|(p, id)| {
                let tier = self.classify(&p.action_type);
                Action::classified(id, p, tier)
            })
            .collect()
    }

    /// Number of known action types.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

fn normalize(action_type: &str) -> String {
    action_type.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let c = ActionClassifier::default();
        assert_eq!(c.classify("generate_report"), Tier::Tier1Safe);
        assert_eq!(c.classify("send_email"), Tier::Tier2Constrained);
        assert_eq!(c.classify("financial_transaction"), Tier::Tier3Sensitive);
    }

    #[test]
    fn test_unknown_is_tier1() {
        let c = ActionClassifier::default();
        assert_eq!(c.classify("launch_rocket"), Tier::Tier1Safe);
        assert_eq!(c.classify(""), Tier::Tier1Safe);
    }

    #[test]
    fn test_lookup_is_case_and_space_insensitive() {
        let c = ActionClassifier::default();
        assert_eq!(c.classify("  Send_Email "), Tier::Tier2Constrained);
        assert_eq!(c.classify("MODIFY_PRICING"), Tier::Tier3Sensitive);
    }

    #[test]
    fn test_overlap_resolves_to_highest_tier() {
        let tiers = TierConfig {
            tier1: vec!["publish".into()],
            tier2: vec![],
            tier3: vec!["Publish".into()],
        };
        let c = ActionClassifier::new(&tiers);
        assert_eq!(c.classify("publish"), Tier::Tier3Sensitive);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_classify_all_assigns_ids() {
        let c = ActionClassifier::default();
        let actions = c.classify_all(vec![
            ProposedAction::new("send_email").with_id("a"),
            ProposedAction::new("read_metrics"),
            ProposedAction::new("sign_contract").with_id("a"),
        ]);
        let ids: Vec<_> = actions.iter().map(|a| a.action_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "action-1", "a#2"]);
        assert_eq!(actions[2].tier, Tier::Tier3Sensitive);
    }
}
