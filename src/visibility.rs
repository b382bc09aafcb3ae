use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel config key marking a whole step as hidden from non-privileged
/// views. Hidden steps stay in the list so indices keep lining up with the
/// remote store; they just render as "hidden".
pub const STEP_HIDDEN_KEY: &str = "__step__";

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VisibilityRule {
    pub config_key: String,
    #[serde(default = "default_true")]
    pub client_visible: bool,
    #[serde(default)]
    pub client_label: Option<String>,
    #[serde(default)]
    pub order_index: Option<i64>,
}

impl VisibilityRule {
    pub fn new(config_key: &str) -> Self {
        Self {
            config_key: config_key.to_string(),
            client_visible: true,
            client_label: None,
            order_index: None,
        }
    }

    pub fn hidden(config_key: &str) -> Self {
        Self {
            client_visible: false,
            ..Self::new(config_key)
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.client_label = Some(label.to_string());
        self
    }

    pub fn with_order(mut self, order_index: i64) -> Self {
        self.order_index = Some(order_index);
        self
    }
}

/// Per-script visibility rules plus the script-specific preferred key order
/// used as a secondary sort when no explicit order_index is set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct VisibilityPolicy {
    #[serde(default)]
    rules: BTreeMap<String, Vec<VisibilityRule>>,
    #[serde(default)]
    preferred_order: BTreeMap<String, Vec<String>>,
}

impl VisibilityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_rule(&mut self, script_id: &str, rule: VisibilityRule) {
        self.rules.entry(script_id.to_string()).or_default().push(rule);
    }

    pub fn set_preferred_order<I, S>(&mut self, script_id: &str, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_order.insert(
            script_id.to_string(),
            keys.into_iter().map(Into::into).collect(),
        );
    }

    /// Seed rules merged under existing ones without duplicating a
    /// (script_id, config_key) pair already present.
    pub fn merge_defaults(&mut self, defaults: &[(String, VisibilityRule)]) {
        for (script_id, rule) in defaults {
            let entries = self.rules.entry(script_id.clone()).or_default();
            if entries.iter().any(|r| r.config_key == rule.config_key) {
                continue;
            }
            entries.push(rule.clone());
        }
    }

    fn rule_for(&self, script_id: &str, config_key: &str) -> Option<&VisibilityRule> {
        self.rules
            .get(script_id)?
            .iter()
            .find(|rule| rule.config_key == config_key)
    }

    pub fn step_hidden(&self, script_id: &str) -> bool {
        self.rule_for(script_id, STEP_HIDDEN_KEY)
            .map(|rule| !rule.client_visible)
            .unwrap_or(false)
    }

    pub fn label_for(&self, script_id: &str, config_key: &str) -> Option<&str> {
        self.rule_for(script_id, config_key)?
            .client_label
            .as_deref()
            .filter(|label| !label.trim().is_empty())
    }

    fn field_visible(&self, script_id: &str, config_key: &str) -> bool {
        self.rule_for(script_id, config_key)
            .map(|rule| rule.client_visible)
            .unwrap_or(true)
    }

    /// Sort key for one field: explicit order_index first (absent sorts
    /// after every explicit one), then the preferred-key table position,
    /// then the key itself. The trailing key makes the order strict and
    /// total, so re-renders never jitter for unchanged inputs.
    fn sort_key<'a>(&self, script_id: &str, key: &'a str) -> (i64, usize, &'a str) {
        let explicit = self
            .rule_for(script_id, key)
            .and_then(|rule| rule.order_index)
            .unwrap_or(i64::MAX);
        let preferred = self
            .preferred_order
            .get(script_id)
            .and_then(|keys| keys.iter().position(|k| k == key))
            .unwrap_or(usize::MAX);
        (explicit, preferred, key)
    }

    /// Filtered, deterministically ordered field keys for a script.
    pub fn visible_keys<'a>(&self, script_id: &str, keys: &[&'a str]) -> Vec<&'a str> {
        let mut visible: Vec<&str> = keys
            .iter()
            .copied()
            .filter(|key| *key != STEP_HIDDEN_KEY && self.field_visible(script_id, key))
            .collect();
        visible.sort_by(|a, b| self.sort_key(script_id, a).cmp(&self.sort_key(script_id, b)));
        visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "vikingbot.base.gathervip";

    #[test]
    fn invisible_fields_never_appear() {
        let mut policy = VisibilityPolicy::new();
        policy.insert_rule(SCRIPT, VisibilityRule::hidden("Monster").with_order(0));
        let keys = policy.visible_keys(SCRIPT, &["Farm", "Monster", "Gold"]);
        assert!(!keys.contains(&"Monster"));
    }

    #[test]
    fn explicit_order_wins_over_preferred_and_lexicographic() {
        let mut policy = VisibilityPolicy::new();
        policy.insert_rule(SCRIPT, VisibilityRule::new("Quarry").with_order(1));
        policy.insert_rule(SCRIPT, VisibilityRule::new("Gold").with_order(0));
        policy.set_preferred_order(SCRIPT, ["Farm", "Sawmill"]);
        let keys = policy.visible_keys(SCRIPT, &["Sawmill", "Quarry", "Farm", "Gold", "Anvil"]);
        // Explicit indices first, then preferred table, then lexicographic.
        assert_eq!(keys, vec!["Gold", "Quarry", "Farm", "Sawmill", "Anvil"]);
    }

    #[test]
    fn ordering_is_stable_across_renders() {
        let mut policy = VisibilityPolicy::new();
        policy.set_preferred_order(SCRIPT, ["b"]);
        let input = ["c", "a", "b", "d"];
        let first = policy.visible_keys(SCRIPT, &input);
        let shuffled = ["d", "b", "a", "c"];
        let second = policy.visible_keys(SCRIPT, &shuffled);
        assert_eq!(first, second);
    }

    #[test]
    fn step_hidden_sentinel() {
        let mut policy = VisibilityPolicy::new();
        policy.insert_rule("vikingbot.base.transfer", VisibilityRule::hidden(STEP_HIDDEN_KEY));
        assert!(policy.step_hidden("vikingbot.base.transfer"));
        assert!(!policy.step_hidden(SCRIPT));
        // The sentinel itself never renders as a field.
        let keys = policy.visible_keys("vikingbot.base.transfer", &[STEP_HIDDEN_KEY, "Farm"]);
        assert_eq!(keys, vec!["Farm"]);
    }

    #[test]
    fn merge_defaults_skips_existing_pairs() {
        let mut policy = VisibilityPolicy::new();
        policy.insert_rule(SCRIPT, VisibilityRule::new("Farm").with_label("Map gather"));
        policy.merge_defaults(&[
            (SCRIPT.to_string(), VisibilityRule::new("Farm").with_label("Seed")),
            (SCRIPT.to_string(), VisibilityRule::hidden(STEP_HIDDEN_KEY)),
        ]);
        assert_eq!(policy.label_for(SCRIPT, "Farm"), Some("Map gather"));
        assert!(policy.step_hidden(SCRIPT));
    }
}
