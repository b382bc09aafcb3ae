use crate::model::FieldValue;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

/// Legacy payloads nest `{value: {value: ...}}` wrappers arbitrarily deep.
/// The chain is walked iteratively with a visited set; whether cycles occur
/// in real data is unknown, so the guard stays.
const MAX_UNWRAP_DEPTH: usize = 32;

fn unwrap_value(start: &Value) -> &Value {
    let mut current = start;
    let mut visited: HashSet<*const Value> = HashSet::new();
    for _ in 0..MAX_UNWRAP_DEPTH {
        if !visited.insert(current as *const Value) {
            break;
        }
        match current.get("value") {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

fn stringify_scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        // Wrapper chains that bottom out in a container have no home in the
        // options domain.
        Value::Array(_) | Value::Object(_) => String::new(),
    }
}

fn normalize_field(raw: &Value) -> FieldValue {
    if let Some(obj) = raw.as_object() {
        if let Some(options) = obj.get("options").and_then(Value::as_array) {
            let options: Vec<String> = options.iter().map(stringify_scalar).collect();
            let unwrapped = obj.get("value").map(unwrap_value).unwrap_or(&Value::Null);
            let mut value = stringify_scalar(unwrapped);
            if !value.is_empty() && !options.iter().any(|opt| opt == &value) {
                value = String::new();
            }
            return FieldValue::Choice { value, options };
        }
        // Wrapper without options: chase the chain to its scalar.
        if obj.contains_key("value") {
            return scalar_field(unwrap_value(raw));
        }
    }
    scalar_field(raw)
}

fn scalar_field(raw: &Value) -> FieldValue {
    match raw {
        Value::Bool(b) => FieldValue::Bool(*b),
        Value::Number(n) => FieldValue::Number(n.clone()),
        Value::String(s) => FieldValue::Text(s.clone()),
        Value::Null => FieldValue::Text(String::new()),
        other => FieldValue::Text(serde_json::to_string(other).unwrap_or_default()),
    }
}

/// Canonicalize a raw config mapping. Non-object input yields an empty
/// config rather than an error.
pub fn normalize(raw: &Value) -> BTreeMap<String, FieldValue> {
    let Some(obj) = raw.as_object() else {
        return BTreeMap::new();
    };
    obj.iter()
        .map(|(key, value)| (key.clone(), normalize_field(value)))
        .collect()
}

/// Raw rendition of one canonical value, used when a field has no original
/// wire shape to re-wrap into.
pub fn canonical_to_raw(value: &FieldValue) -> Value {
    match value {
        FieldValue::Bool(b) => Value::Bool(*b),
        FieldValue::Number(n) => Value::Number(n.clone()),
        FieldValue::Text(s) => Value::String(s.clone()),
        FieldValue::Choice { value, options } => {
            let mut obj = Map::new();
            obj.insert("value".to_string(), Value::String(value.clone()));
            obj.insert(
                "options".to_string(),
                Value::Array(options.iter().cloned().map(Value::String).collect()),
            );
            Value::Object(obj)
        }
    }
}

/// Re-wrap canonical edits into the wire shape the server expects, keeping
/// any extra wrapper fields the original carried.
pub fn denormalize(
    form: &BTreeMap<String, FieldValue>,
    original: &Map<String, Value>,
) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in form {
        let wire = match value {
            FieldValue::Choice { value: current, .. } => {
                match original.get(key).and_then(Value::as_object) {
                    Some(existing) if existing.contains_key("options") => {
                        let mut merged = existing.clone();
                        merged.insert("value".to_string(), Value::String(current.clone()));
                        Value::Object(merged)
                    }
                    _ => canonical_to_raw(value),
                }
            }
            other => canonical_to_raw(other),
        };
        out.insert(key.clone(), wire);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_unwraps_nested_value_chains() {
        let raw = json!({
            "Farm": {"value": {"value": {"value": "3"}}, "options": ["off", "1", "2", "3"]},
        });
        let canon = normalize(&raw);
        assert_eq!(
            canon.get("Farm").and_then(|v| v.as_choice()),
            Some(("3", ["off", "1", "2", "3"].map(String::from).as_slice()))
        );
    }

    #[test]
    fn normalize_stringifies_numeric_options_and_values() {
        let raw = json!({"LevelStartAt": {"value": 3, "options": [1, 2, 3]}});
        let canon = normalize(&raw);
        let (value, options) = canon.get("LevelStartAt").and_then(|v| v.as_choice()).expect("choice");
        assert_eq!(value, "3");
        assert_eq!(options, ["1", "2", "3"].map(String::from));
    }

    #[test]
    fn normalize_coerces_out_of_domain_values_to_empty() {
        let raw = json!({"worker": {"value": "Mythic", "options": ["Off", "Common", "Rare"]}});
        let canon = normalize(&raw);
        let (value, _) = canon.get("worker").and_then(|v| v.as_choice()).expect("choice");
        assert_eq!(value, "");
    }

    #[test]
    fn normalize_passes_scalars_through() {
        let raw = json!({"skip": true, "marches": 5, "note": "hi"});
        let canon = normalize(&raw);
        assert_eq!(canon.get("skip"), Some(&FieldValue::Bool(true)));
        assert_eq!(canon.get("note"), Some(&FieldValue::Text("hi".into())));
        assert!(matches!(canon.get("marches"), Some(FieldValue::Number(_))));
    }

    #[test]
    fn normalize_of_non_object_is_empty() {
        assert!(normalize(&json!(null)).is_empty());
        assert!(normalize(&json!([1, 2])).is_empty());
        assert!(normalize(&json!("nope")).is_empty());
    }

    #[test]
    fn normalize_is_idempotent() {
        let raw = json!({
            "Farm": {"value": {"value": "3"}, "options": ["off", "3"]},
            "skip": false,
            "marches": "5",
        });
        let once = normalize(&raw);
        let as_raw = Value::Object(
            once.iter()
                .map(|(k, v)| (k.clone(), canonical_to_raw(v)))
                .collect(),
        );
        assert_eq!(normalize(&as_raw), once);
    }

    #[test]
    fn unwrap_survives_deep_chains() {
        let mut value = json!("leaf");
        for _ in 0..100 {
            value = json!({"value": value});
        }
        let raw = json!({"field": {"value": value, "options": ["leaf"]}});
        let canon = normalize(&raw);
        // Past the depth bound the chain is abandoned; the guard just must
        // not loop forever or recurse off the stack.
        assert!(canon.contains_key("field"));
    }

    #[test]
    fn denormalize_preserves_wrapper_shape() {
        let original: Map<String, Value> = json!({
            "Farm": {"value": "off", "options": ["off", "3"], "SomeMeta": 1},
        })
        .as_object()
        .cloned()
        .expect("object");
        let form = BTreeMap::from([(
            "Farm".to_string(),
            FieldValue::Choice {
                value: "3".to_string(),
                options: vec!["off".to_string(), "3".to_string()],
            },
        )]);
        let wire = denormalize(&form, &original);
        assert_eq!(
            wire.get("Farm"),
            Some(&json!({"value": "3", "options": ["off", "3"], "SomeMeta": 1}))
        );
    }

    #[test]
    fn denormalize_without_original_shape_emits_plain_wrapper() {
        let form = BTreeMap::from([
            (
                "mode".to_string(),
                FieldValue::Choice {
                    value: String::new(),
                    options: vec!["a".to_string()],
                },
            ),
            ("skip".to_string(), FieldValue::Bool(true)),
        ]);
        let wire = denormalize(&form, &Map::new());
        assert_eq!(wire.get("mode"), Some(&json!({"value": "", "options": ["a"]})));
        assert_eq!(wire.get("skip"), Some(&json!(true)));
    }
}
