use crate::schedule;
use crate::shared::ids::{EntityId, ScriptId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Read-mostly projection of a managed subject owned by the remote store.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    /// Grouping key, e.g. the server the entity lives on.
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub tariff: Option<String>,
    #[serde(default)]
    pub has_default_template: bool,
}

fn default_true() -> bool {
    true
}

/// One configuration unit of automated behavior, as the wire carries it.
/// `config` and `schedule_rules` keep their raw shapes so that edits can be
/// re-encoded without losing wrapper fields and alias keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub index: usize,
    pub script_id: Option<ScriptId>,
    pub config: Map<String, Value>,
    pub is_active: bool,
    pub schedule_rules: Vec<Value>,
}

impl Step {
    /// Raw steps arrive with inconsistent key casing; sniff leniently and
    /// treat anything non-object as an empty step so a bad row never kills
    /// the whole list.
    pub fn from_raw(index: usize, raw: &Value) -> Self {
        let obj = raw.as_object();
        let config = obj
            .and_then(|o| o.get("Config").or_else(|| o.get("config")))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let script_id = obj
            .and_then(|o| o.get("ScriptId").or_else(|| o.get("script_id")))
            .and_then(Value::as_str)
            .and_then(|raw| ScriptId::parse(raw).ok());
        let is_active = obj
            .and_then(|o| o.get("IsActive").or_else(|| o.get("is_active")))
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let schedule_rules = obj
            .and_then(|o| o.get("ScheduleRules"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Self {
            index,
            script_id,
            config,
            is_active,
            schedule_rules,
        }
    }

    /// Display name chain: config Name/name, then the script-label table,
    /// then the bare script id, then a positional fallback.
    pub fn display_name(&self, script_labels: &BTreeMap<String, String>) -> String {
        let from_config = self
            .config
            .get("Name")
            .or_else(|| self.config.get("name"))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty());
        if let Some(name) = from_config {
            return name.to_string();
        }
        if let Some(script_id) = &self.script_id {
            if let Some(label) = script_labels.get(script_id.as_str()) {
                return label.clone();
            }
            return script_id.as_str().to_string();
        }
        format!("Step {}", self.index + 1)
    }

    pub fn description(&self) -> String {
        self.config
            .get("Description")
            .or_else(|| self.config.get("description"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    pub fn schedule_summary(&self) -> String {
        schedule::rules_summary(&self.schedule_rules)
    }
}

/// Projection handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepView {
    pub index: usize,
    pub name: String,
    pub script_id: Option<ScriptId>,
    pub description: String,
    pub is_active: bool,
    pub schedule_summary: String,
    pub schedule_rules_count: usize,
}

impl StepView {
    pub fn from_step(step: &Step, script_labels: &BTreeMap<String, String>) -> Self {
        Self {
            index: step.index,
            name: step.display_name(script_labels),
            script_id: step.script_id.clone(),
            description: step.description(),
            is_active: step.is_active,
            schedule_summary: step.schedule_summary(),
            schedule_rules_count: step.schedule_rules.len(),
        }
    }
}

/// Canonical, wrapper-free value of one config field.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    Choice {
        value: String,
        options: Vec<String>,
    },
}

impl FieldValue {
    pub fn as_choice(&self) -> Option<(&str, &[String])> {
        match self {
            Self::Choice { value, options } => Some((value.as_str(), options.as_slice())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Template {
    pub name: String,
}
