use crate::model::{Entity, Step};
use crate::shared::ids::EntityId;
use crate::visibility::VisibilityPolicy;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::EntityDetail;

/// Envelope keys whose single child is the actual payload. Some remote
/// versions wrap a payload several layers deep, sometimes as JSON encoded
/// inside a string.
const ENVELOPE_KEYS: [&str; 3] = ["data", "settings", "payload"];

fn decode_json_if_str(value: Value) -> Value {
    if let Value::String(raw) = &value {
        if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
            if parsed.is_object() || parsed.is_array() {
                return parsed;
            }
        }
    }
    value
}

/// Strip single-key `data`/`settings`/`payload` envelopes iteratively,
/// decoding JSON-in-string at each layer.
pub fn unwrap_envelopes(value: Value) -> Value {
    let mut current = decode_json_if_str(value);
    loop {
        let inner = current
            .as_object()
            .filter(|obj| obj.len() == 1)
            .and_then(|obj| obj.iter().next())
            .filter(|(key, _)| ENVELOPE_KEYS.contains(&key.to_ascii_lowercase().as_str()))
            .map(|(_, val)| val.clone());
        match inner {
            Some(val) => current = decode_json_if_str(val),
            None => return current,
        }
    }
}

/// Recursively decode string-embedded JSON throughout a payload.
pub fn deep_decode(value: Value) -> Value {
    let value = decode_json_if_str(value);
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(deep_decode).collect()),
        Value::Object(obj) => Value::Object(
            obj.into_iter()
                .map(|(key, val)| (key, deep_decode(val)))
                .collect(),
        ),
        other => other,
    }
}

fn looks_like_step(obj: &Map<String, Value>) -> bool {
    ["Config", "config", "ScriptId", "script_id"]
        .iter()
        .any(|key| obj.contains_key(*key))
}

fn digit_keyed_list(obj: &Map<String, Value>) -> Option<Vec<Value>> {
    if obj.is_empty() || !obj.keys().all(|k| k.chars().all(|ch| ch.is_ascii_digit())) {
        return None;
    }
    let mut keys: Vec<&String> = obj.keys().collect();
    keys.sort_by_key(|k| k.parse::<u64>().unwrap_or(u64::MAX));
    Some(keys.into_iter().map(|k| obj[k].clone()).collect())
}

/// The historical shapes a step list arrives in. Classification order is
/// part of the contract: direct array, then a list nested under
/// Data/data/steps/Steps (array or digit-keyed map), then a digit-keyed
/// map at the top level, then a bare single step.
#[derive(Debug, Clone, PartialEq)]
pub enum ListShape {
    Direct(Vec<Value>),
    SingleStep(Value),
    Nested(Vec<Value>),
    DigitKeyed(Vec<Value>),
    Unrecognized,
}

impl ListShape {
    pub fn into_steps(self) -> Vec<Value> {
        match self {
            Self::Direct(steps) | Self::Nested(steps) | Self::DigitKeyed(steps) => steps,
            Self::SingleStep(step) => vec![step],
            Self::Unrecognized => Vec::new(),
        }
    }
}

pub fn classify_list(value: &Value) -> ListShape {
    match value {
        Value::Array(items) => ListShape::Direct(items.clone()),
        Value::Object(obj) => {
            let nested = ["Data", "data", "steps", "Steps"]
                .iter()
                .find_map(|key| match obj.get(*key)? {
                    Value::Array(items) => Some(items.clone()),
                    Value::Object(inner) => digit_keyed_list(inner),
                    _ => None,
                });
            if let Some(steps) = nested {
                ListShape::Nested(steps)
            } else if let Some(steps) = digit_keyed_list(obj) {
                ListShape::DigitKeyed(steps)
            } else if looks_like_step(obj) {
                ListShape::SingleStep(value.clone())
            } else {
                ListShape::Unrecognized
            }
        }
        _ => ListShape::Unrecognized,
    }
}

/// Raw step list from any of the historical shapes. Unrecognized input
/// degrades to an empty list, never an error.
pub fn extract_steps(value: &Value) -> Vec<Value> {
    classify_list(value).into_steps()
}

fn decode_entity(value: Option<&Value>, fallback_id: &EntityId) -> Entity {
    value
        .and_then(|v| serde_json::from_value::<Entity>(v.clone()).ok())
        .unwrap_or_else(|| Entity {
            id: fallback_id.clone(),
            name: fallback_id.as_str().to_string(),
            group: None,
            is_active: true,
            tariff: None,
            has_default_template: false,
        })
}

fn decode_labels(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(key, val)| {
                    val.as_str().map(|label| (key.clone(), label.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn decode_policy(value: Option<&Value>) -> VisibilityPolicy {
    value
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

/// Decode a detail payload. Malformed pieces degrade independently: a bad
/// step list yields no steps, a bad policy yields an empty policy, and a
/// missing entity block falls back to the requested id.
pub fn decode_detail(entity_id: &EntityId, payload: Value) -> EntityDetail {
    let unwrapped = deep_decode(unwrap_envelopes(payload));
    let obj = unwrapped.as_object();

    let steps_value = obj
        .and_then(|o| {
            ["raw_steps", "rawSteps", "steps", "Data", "data"]
                .iter()
                .find_map(|key| o.get(*key))
        })
        .unwrap_or(&unwrapped);

    let steps: Vec<Step> = extract_steps(steps_value)
        .iter()
        .enumerate()
        .map(|(idx, raw)| Step::from_raw(idx, raw))
        .collect();

    let entity = decode_entity(
        obj.and_then(|o| o.get("entity").or_else(|| o.get("account"))),
        entity_id,
    );
    let policy = decode_policy(obj.and_then(|o| {
        o.get("visibility_policy")
            .or_else(|| o.get("visibilityPolicy"))
            .or_else(|| o.get("visibility"))
    }));
    let script_labels = decode_labels(obj.and_then(|o| {
        o.get("script_labels")
            .or_else(|| o.get("scriptLabels"))
            .or_else(|| o.get("labels"))
    }));

    EntityDetail {
        entity,
        steps,
        policy,
        script_labels,
    }
}
