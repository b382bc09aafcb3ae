use super::days::{parse_day_list, Day};
use super::time::{to_12h, to_24h};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

// Historical producers disagreed on key names; every spelling below means
// the same field. Decode takes the first non-empty alias, encode writes all
// of them so any downstream consumer sees a consistent value.
const START_ALIASES: [&str; 4] = ["StartAt", "Start", "From", "TimeFrom"];
const END_ALIASES: [&str; 4] = ["EndAt", "End", "To", "TimeTo"];
const EVERY_ALIASES: [&str; 3] = ["Every", "Interval", "EveryMinutes"];
const DAY_ALIASES: [&str; 3] = ["Days", "WeekDays", "Weekdays"];

/// Structured schedule rule: canonical day set, 24h times, minute interval.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleRule {
    pub days: BTreeSet<Day>,
    pub start: String,
    pub end: String,
    pub every_minutes: Option<u32>,
    pub label: String,
}

impl ScheduleRule {
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
            && self.start.is_empty()
            && self.end.is_empty()
            && self.every_minutes.is_none()
            && self.label.is_empty()
    }

    pub fn days_csv(&self) -> String {
        self.days
            .iter()
            .map(|day| day.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn first_nonempty_str(obj: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|key| match obj.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn first_day_set(obj: &Map<String, Value>) -> Option<BTreeSet<Day>> {
    DAY_ALIASES.iter().find_map(|key| match obj.get(*key) {
        Some(Value::Array(items)) => {
            let days: BTreeSet<Day> = items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(Day::parse)
                .collect();
            if days.is_empty() {
                None
            } else {
                Some(days)
            }
        }
        Some(Value::String(s)) if !s.trim().is_empty() => {
            let days = parse_day_list(s);
            if days.is_empty() {
                None
            } else {
                Some(days)
            }
        }
        _ => None,
    })
}

fn first_interval(obj: &Map<String, Value>) -> Option<u32> {
    EVERY_ALIASES.iter().find_map(|key| match obj.get(*key) {
        Some(Value::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Decode a wire rule. Structured fields win; the packed legacy string
/// `Val1 = "days|start12h|end12h"` fills only the fields they left empty.
pub fn decode_rule(raw: &Value) -> ScheduleRule {
    let Some(obj) = raw.as_object() else {
        return ScheduleRule::default();
    };

    let mut days = first_day_set(obj).unwrap_or_default();
    let mut start = first_nonempty_str(obj, &START_ALIASES).unwrap_or_default();
    let mut end = first_nonempty_str(obj, &END_ALIASES).unwrap_or_default();
    let every_minutes = first_interval(obj);
    let label = first_nonempty_str(obj, &["Label", "Name"]).unwrap_or_default();

    if let Some(Value::String(packed)) = obj.get("Val1") {
        let mut parts = packed.splitn(3, '|');
        let packed_days = parts.next().unwrap_or_default().trim();
        let packed_start = parts.next().unwrap_or_default().trim();
        let packed_end = parts.next().unwrap_or_default().trim();
        if days.is_empty() {
            days = parse_day_list(packed_days);
        }
        if start.is_empty() {
            start = packed_start.to_string();
        }
        if end.is_empty() {
            end = packed_end.to_string();
        }
    }

    ScheduleRule {
        days,
        start: to_24h(&start),
        end: to_24h(&end),
        every_minutes,
        label,
    }
}

fn remove_keys(obj: &mut Map<String, Value>, keys: &[&str]) {
    for key in keys {
        obj.remove(*key);
    }
}

fn set_aliases(obj: &mut Map<String, Value>, keys: &[&str], value: Value) {
    for key in keys {
        obj.insert((*key).to_string(), value.clone());
    }
}

/// Encode a rule for the wire. Starts from the previous raw object so
/// unknown fields survive; cleared fields get their alias keys removed
/// outright so absence stays distinguishable from empty-string. `Val1` is
/// recomputed from the structured fields as the write-path source of truth.
pub fn encode_rule(rule: &ScheduleRule, previous: Option<&Value>) -> Value {
    let mut base = previous
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if rule.days.is_empty() {
        remove_keys(&mut base, &DAY_ALIASES);
    } else {
        let days = Value::Array(
            rule.days
                .iter()
                .map(|day| Value::String(day.as_str().to_string()))
                .collect(),
        );
        remove_keys(&mut base, &DAY_ALIASES);
        base.insert("Days".to_string(), days);
    }

    if rule.start.is_empty() {
        remove_keys(&mut base, &START_ALIASES);
    } else {
        set_aliases(&mut base, &START_ALIASES, Value::String(rule.start.clone()));
    }

    if rule.end.is_empty() {
        remove_keys(&mut base, &END_ALIASES);
    } else {
        set_aliases(&mut base, &END_ALIASES, Value::String(rule.end.clone()));
    }

    match rule.every_minutes {
        Some(every) => set_aliases(&mut base, &EVERY_ALIASES, Value::from(every)),
        None => remove_keys(&mut base, &EVERY_ALIASES),
    }

    if rule.label.is_empty() {
        base.remove("Label");
    } else {
        base.insert("Label".to_string(), Value::String(rule.label.clone()));
        if !base.contains_key("Name") {
            base.insert("Name".to_string(), Value::String(rule.label.clone()));
        }
    }

    let val1 = format!(
        "{}|{}|{}",
        rule.days_csv(),
        to_12h(&rule.start),
        to_12h(&rule.end)
    );
    base.insert("Val1".to_string(), Value::String(val1));

    Value::Object(base)
}

/// One-line rendering of a rule for list rows.
pub fn rule_summary(rule: &ScheduleRule) -> String {
    let mut parts = Vec::new();
    if !rule.days.is_empty() {
        parts.push(format!("days: {}", rule.days_csv()));
    }
    if !rule.start.is_empty() || !rule.end.is_empty() {
        let start = if rule.start.is_empty() { "00:00" } else { &rule.start };
        let end = if rule.end.is_empty() { "24:00" } else { &rule.end };
        parts.push(format!("{start} - {end}"));
    }
    if let Some(every) = rule.every_minutes {
        parts.push(format!("every {every} min"));
    }
    if !rule.label.is_empty() {
        parts.push(rule.label.clone());
    }
    parts.join("; ")
}

/// Summary for a step's raw rule list, falling back to a bare count when
/// nothing in the rules is renderable.
pub fn rules_summary(rules: &[Value]) -> String {
    let summaries: Vec<String> = rules
        .iter()
        .map(decode_rule)
        .filter(|rule| !rule.is_empty())
        .map(|rule| rule_summary(&rule))
        .collect();
    if !summaries.is_empty() {
        return summaries.join("; ");
    }
    if !rules.is_empty() {
        return format!("{} schedule rules", rules.len());
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structured_fields_take_priority_over_packed_string() {
        let raw = json!({
            "StartAt": "09:00",
            "Val1": "mon,tue|8:00 AM|11:00 PM",
        });
        let rule = decode_rule(&raw);
        assert_eq!(rule.start, "09:00");
        assert_eq!(rule.end, "23:00");
        assert_eq!(rule.days_csv(), "mon,tue");
    }

    #[test]
    fn first_nonempty_alias_wins() {
        let raw = json!({"Start": "", "From": "10:15", "TimeFrom": "11:00"});
        assert_eq!(decode_rule(&raw).start, "10:15");
    }

    #[test]
    fn legacy_only_rule_decodes() {
        let rule = decode_rule(&json!({"Val1": "ПН, ВТ|8:00 AM|11:30 PM"}));
        assert_eq!(rule.days_csv(), "mon,tue");
        assert_eq!(rule.start, "08:00");
        assert_eq!(rule.end, "23:30");
    }

    #[test]
    fn interval_accepts_number_or_digit_string() {
        assert_eq!(decode_rule(&json!({"Every": 45})).every_minutes, Some(45));
        assert_eq!(decode_rule(&json!({"Interval": "60"})).every_minutes, Some(60));
        assert_eq!(decode_rule(&json!({"EveryMinutes": "lots"})).every_minutes, None);
    }

    #[test]
    fn encode_writes_every_alias_consistently() {
        let rule = ScheduleRule {
            days: parse_day_list("mon"),
            start: "08:00".to_string(),
            end: "23:00".to_string(),
            every_minutes: Some(30),
            label: "night".to_string(),
        };
        let wire = encode_rule(&rule, None);
        for key in START_ALIASES {
            assert_eq!(wire.get(key), Some(&json!("08:00")));
        }
        for key in EVERY_ALIASES {
            assert_eq!(wire.get(key), Some(&json!(30)));
        }
        assert_eq!(wire.get("Val1"), Some(&json!("mon|8:00 AM|11:00 PM")));
        assert_eq!(wire.get("Label"), Some(&json!("night")));
        assert_eq!(wire.get("Name"), Some(&json!("night")));
    }

    #[test]
    fn encode_removes_alias_keys_for_cleared_fields() {
        let previous = json!({
            "StartAt": "08:00", "Start": "08:00", "From": "08:00", "TimeFrom": "08:00",
            "Days": ["mon"], "Weekdays": "mon", "Every": 10, "Name": "keep me",
        });
        let rule = ScheduleRule::default();
        let wire = encode_rule(&rule, Some(&previous));
        for key in START_ALIASES.iter().chain(&DAY_ALIASES).chain(&EVERY_ALIASES) {
            assert!(wire.get(*key).is_none(), "{key} should be removed");
        }
        // Clearing the label drops Label but keeps an existing Name.
        assert_eq!(wire.get("Name"), Some(&json!("keep me")));
        assert_eq!(wire.get("Val1"), Some(&json!("||")));
    }

    #[test]
    fn encode_preserves_unknown_fields() {
        let previous = json!({"Uid": "rule-7", "StartAt": "01:00"});
        let rule = decode_rule(&previous);
        let wire = encode_rule(&rule, Some(&previous));
        assert_eq!(wire.get("Uid"), Some(&json!("rule-7")));
    }

    #[test]
    fn decode_encode_decode_is_stable() {
        let inputs = [
            json!({"Val1": "mon,wed|8:00 AM|11:00 PM", "Every": "45", "Label": "farm"}),
            json!({"Days": ["SUN", "Сб"], "From": "9:15 pm", "To": "23:59"}),
            json!({"Val1": "|12:00 AM|"}),
            json!({}),
        ];
        for input in inputs {
            let once = decode_rule(&input);
            let twice = decode_rule(&encode_rule(&once, Some(&input)));
            assert_eq!(twice, once, "round-trip diverged for {input}");
        }
    }

    #[test]
    fn summary_renders_all_parts() {
        let rule = decode_rule(&json!({
            "Days": ["mon", "tue"], "StartAt": "08:00", "EndAt": "23:00",
            "Every": 60, "Label": "day shift",
        }));
        assert_eq!(
            rule_summary(&rule),
            "days: mon,tue; 08:00 - 23:00; every 60 min; day shift"
        );
    }

    #[test]
    fn rules_summary_falls_back_to_count() {
        let rules = vec![json!({"Opaque": true}), json!({"AlsoOpaque": 1})];
        assert_eq!(rules_summary(&rules), "2 schedule rules");
        assert_eq!(rules_summary(&[]), "");
    }
}
