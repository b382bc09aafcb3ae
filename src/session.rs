use crate::diff::changed_fields;
use crate::model::FieldValue;
use crate::normalize::{denormalize, normalize};
use crate::schedule::{encode_rule, ScheduleRule};
use crate::shared::errors::SyncError;
use crate::shared::ids::EntityId;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Timing knobs for one edit session, in epoch milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub debounce_ms: i64,
    pub toast_cooldown_ms: i64,
    pub save_timeout_ms: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 600,
            toast_cooldown_ms: 4_000,
            save_timeout_ms: 30_000,
        }
    }
}

/// Outbound write for one step: only the changed config keys, re-wrapped
/// for the wire, plus the full rule list when schedule drafts were touched.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub entity_id: EntityId,
    pub step_index: usize,
    pub config: Map<String, Value>,
    pub schedule_rules: Option<Vec<Value>>,
    pub manual: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Saved,
    SaveFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SaveCompletion {
    pub notice: Option<Notice>,
}

#[derive(Debug, Clone)]
struct InFlight {
    started_at: i64,
    manual: bool,
    sent_config: Map<String, Value>,
    sent_rules: Option<Vec<Value>>,
}

/// Transient per-step editing state: committed snapshot, edited form,
/// debounce deadline, and the in-flight/queued save flags. Owned by exactly
/// one editor; discarded when another step or entity is selected.
///
/// State machine: Clean -> Dirty (edits pending) -> Saving -> Clean |
/// Dirty(queued). At most one save is ever in flight; a save attempt while
/// one is running sets the single queued flag instead of starting a second.
#[derive(Debug, Clone)]
pub struct EditSession {
    entity_id: EntityId,
    step_index: usize,
    config: SessionConfig,
    committed_raw: Map<String, Value>,
    committed_rules: Vec<Value>,
    form: BTreeMap<String, FieldValue>,
    rules_draft: Option<Vec<ScheduleRule>>,
    debounce_deadline: Option<i64>,
    dirty: bool,
    in_flight: Option<InFlight>,
    queued: bool,
    queued_manual: bool,
    last_toast_at: Option<i64>,
}

impl EditSession {
    pub fn open(
        entity_id: EntityId,
        step_index: usize,
        raw_config: &Map<String, Value>,
        raw_rules: &[Value],
        config: SessionConfig,
    ) -> Self {
        let form = normalize(&Value::Object(raw_config.clone()));
        Self {
            entity_id,
            step_index,
            config,
            committed_raw: raw_config.clone(),
            committed_rules: raw_rules.to_vec(),
            form,
            rules_draft: None,
            debounce_deadline: None,
            dirty: false,
            in_flight: None,
            queued: false,
            queued_manual: false,
            last_toast_at: None,
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn form(&self) -> &BTreeMap<String, FieldValue> {
        &self.form
    }

    pub fn committed_config(&self) -> &Map<String, Value> {
        &self.committed_raw
    }

    pub fn committed_rules(&self) -> &[Value] {
        &self.committed_rules
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_saving(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Record one field edit and (re)start the debounce window.
    pub fn edit_field(&mut self, key: &str, value: FieldValue, now: i64) {
        self.form.insert(key.to_string(), value);
        self.mark_dirty(now);
    }

    /// Replace the schedule-rule drafts for this step.
    pub fn edit_rules(&mut self, rules: Vec<ScheduleRule>, now: i64) {
        self.rules_draft = Some(rules);
        self.mark_dirty(now);
    }

    fn mark_dirty(&mut self, now: i64) {
        self.dirty = true;
        self.debounce_deadline = Some(now + self.config.debounce_ms);
    }

    /// Explicit "save now". Queues behind an in-flight save; the replay
    /// stays manual so it still notifies.
    pub fn save_now(&mut self, now: i64) -> Option<SaveRequest> {
        if self.release_if_timed_out(now) {
            self.debounce_deadline = Some(now);
        }
        if self.in_flight.is_some() {
            self.queued = true;
            self.queued_manual = true;
            return None;
        }
        Some(self.build_request(true, now))
    }

    /// Drive the debounce timer. Returns the request to send when the
    /// window has elapsed and nothing is in flight.
    pub fn poll(&mut self, now: i64) -> Option<SaveRequest> {
        if self.release_if_timed_out(now) {
            self.debounce_deadline = Some(now);
            return None;
        }
        let deadline = self.debounce_deadline?;
        if now < deadline {
            return None;
        }
        if self.in_flight.is_some() {
            // Never two concurrent writes per session; replay after the
            // in-flight save resolves.
            self.queued = true;
            self.debounce_deadline = None;
            return None;
        }
        let manual = std::mem::take(&mut self.queued_manual);
        Some(self.build_request(manual, now))
    }

    /// A save in flight beyond the configured limit is written off as
    /// failed so the session cannot wedge in Saving forever.
    fn release_if_timed_out(&mut self, now: i64) -> bool {
        let timed_out = self
            .in_flight
            .as_ref()
            .is_some_and(|save| now - save.started_at >= self.config.save_timeout_ms);
        if timed_out {
            self.in_flight = None;
            self.dirty = true;
        }
        timed_out
    }

    fn build_request(&mut self, manual: bool, now: i64) -> SaveRequest {
        let committed_canonical = normalize(&Value::Object(self.committed_raw.clone()));
        let diff = changed_fields(&self.form, &committed_canonical);
        let config = denormalize(&diff, &self.committed_raw);
        let schedule_rules = self.rules_draft.as_ref().map(|rules| {
            rules
                .iter()
                .enumerate()
                .map(|(idx, rule)| encode_rule(rule, self.committed_rules.get(idx)))
                .collect()
        });
        self.debounce_deadline = None;
        self.in_flight = Some(InFlight {
            started_at: now,
            manual,
            sent_config: config.clone(),
            sent_rules: schedule_rules.clone(),
        });
        SaveRequest {
            entity_id: self.entity_id.clone(),
            step_index: self.step_index,
            config,
            schedule_rules,
            manual,
        }
    }

    /// Apply the outcome of the in-flight save. On success the sent fields
    /// are merged into the committed snapshot, preserving wrapper shape; on
    /// failure local edits stay intact and the next cycle retries. Either
    /// way a queued attempt immediately re-enters the debounce cycle.
    pub fn complete(&mut self, outcome: Result<(), SyncError>, now: i64) -> SaveCompletion {
        let Some(save) = self.in_flight.take() else {
            return SaveCompletion::default();
        };
        let notice = match outcome {
            Ok(()) => {
                merge_acknowledged(&mut self.committed_raw, &save.sent_config);
                if let Some(rules) = save.sent_rules {
                    self.committed_rules = rules;
                    self.rules_draft = None;
                }
                self.dirty = self.queued || self.debounce_deadline.is_some();
                if save.manual || self.toast_window_open(now) {
                    self.last_toast_at = Some(now);
                    Some(Notice::Saved)
                } else {
                    None
                }
            }
            Err(err) => {
                self.dirty = true;
                Some(Notice::SaveFailed(err.to_string()))
            }
        };
        if std::mem::take(&mut self.queued) {
            self.debounce_deadline = Some(now);
        }
        SaveCompletion { notice }
    }

    fn toast_window_open(&self, now: i64) -> bool {
        match self.last_toast_at {
            Some(last) => now - last >= self.config.toast_cooldown_ms,
            None => true,
        }
    }
}

/// Merge server-acknowledged fields into the committed raw config. A field
/// that was enumerated keeps its wrapper: wrapper payloads merge over the
/// existing object, scalar payloads replace outright.
fn merge_acknowledged(committed: &mut Map<String, Value>, sent: &Map<String, Value>) {
    for (key, value) in sent {
        let payload_is_wrapper = value
            .as_object()
            .is_some_and(|obj| obj.contains_key("options"));
        match committed.get_mut(key) {
            Some(Value::Object(existing)) if payload_is_wrapper => {
                if let Some(incoming) = value.as_object() {
                    for (k, v) in incoming {
                        existing.insert(k.clone(), v.clone());
                    }
                }
            }
            Some(Value::Object(existing))
                if existing.contains_key("options") && !payload_is_wrapper =>
            {
                existing.insert("value".to_string(), value.clone());
            }
            _ => {
                committed.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> EditSession {
        let raw = json!({
            "Farm": {"value": "off", "options": ["off", "1", "2", "3"]},
            "skip": false,
            "marches": 5,
        });
        EditSession::open(
            EntityId::parse("acc-1").expect("id"),
            0,
            raw.as_object().expect("object"),
            &[],
            SessionConfig::default(),
        )
    }

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    #[test]
    fn edits_within_the_window_coalesce_into_one_request() {
        let mut s = session();
        s.edit_field("skip", FieldValue::Bool(true), 1_000);
        s.edit_field("marches", FieldValue::Number(7.into()), 1_100);
        s.edit_field("note", text("new"), 1_200);

        assert!(s.poll(1_300).is_none(), "window still open");
        let request = s.poll(1_200 + 600).expect("debounce fired");
        assert_eq!(request.config.len(), 3);
        assert_eq!(request.config.get("skip"), Some(&json!(true)));
        assert_eq!(request.config.get("marches"), Some(&json!(7)));
        assert_eq!(request.config.get("note"), Some(&json!("new")));
        assert!(!request.manual);
        assert!(s.poll(5_000).is_none(), "nothing further to send");
    }

    #[test]
    fn unchanged_fields_are_not_sent() {
        let mut s = session();
        s.edit_field("skip", FieldValue::Bool(false), 1_000);
        let request = s.save_now(1_000).expect("manual save");
        assert!(request.config.is_empty());
    }

    #[test]
    fn at_most_one_save_in_flight() {
        let mut s = session();
        s.edit_field("skip", FieldValue::Bool(true), 0);
        let first = s.poll(600).expect("first save");
        assert_eq!(first.config.len(), 1);

        // Manual save while the autosave is in flight queues, not sends.
        s.edit_field("marches", FieldValue::Number(9.into()), 700);
        assert!(s.save_now(700).is_none());
        assert!(s.poll(1_400).is_none(), "still in flight");

        let completion = s.complete(Ok(()), 1_500);
        assert_eq!(completion.notice, Some(Notice::Saved));

        // Exactly one replay, carrying the queued edit, still manual.
        let second = s.poll(1_500).expect("queued save replays");
        assert!(second.manual);
        assert_eq!(second.config.len(), 1);
        assert_eq!(second.config.get("marches"), Some(&json!(9)));
        s.complete(Ok(()), 1_600);
        assert!(s.poll(10_000).is_none(), "no third request");
    }

    #[test]
    fn success_merges_ack_preserving_wrapper_shape() {
        let mut s = session();
        s.edit_field(
            "Farm",
            FieldValue::Choice {
                value: "3".to_string(),
                options: vec!["off".into(), "1".into(), "2".into(), "3".into()],
            },
            0,
        );
        let request = s.save_now(0).expect("save");
        assert!(request.config.get("Farm").and_then(Value::as_object).is_some());
        s.complete(Ok(()), 10);

        let committed = s.committed_config().get("Farm").expect("Farm");
        assert_eq!(committed.get("value"), Some(&json!("3")));
        assert!(committed.get("options").is_some());
        assert!(!s.is_dirty());
    }

    #[test]
    fn edit_during_flight_stays_dirty_after_ack() {
        let mut s = session();
        s.edit_field("skip", FieldValue::Bool(true), 0);
        s.poll(600).expect("save");

        // The edit lands mid-flight without a poll, so nothing is queued;
        // its debounce window is still pending when the ack arrives.
        s.edit_field("marches", FieldValue::Number(9.into()), 700);
        s.complete(Ok(()), 800);
        assert!(s.is_dirty(), "pending edit survives the ack");

        let request = s.poll(1_300).expect("second diff goes out");
        assert_eq!(request.config.len(), 1);
        assert_eq!(request.config.get("marches"), Some(&json!(9)));
    }

    #[test]
    fn failure_keeps_edits_and_retries_on_next_cycle() {
        let mut s = session();
        s.edit_field("skip", FieldValue::Bool(true), 0);
        s.poll(600).expect("save");
        let completion = s.complete(Err(SyncError::Network("boom".into())), 700);
        assert!(matches!(completion.notice, Some(Notice::SaveFailed(_))));
        assert!(s.is_dirty());
        assert_eq!(s.committed_config().get("skip"), Some(&json!(false)));

        // A later manual save resends the same diff.
        let retry = s.save_now(1_000).expect("retry");
        assert_eq!(retry.config.get("skip"), Some(&json!(true)));
    }

    #[test]
    fn autosave_toasts_are_throttled_manual_always_notifies() {
        let mut s = session();
        s.edit_field("skip", FieldValue::Bool(true), 0);
        s.poll(600).expect("save");
        assert_eq!(s.complete(Ok(()), 700).notice, Some(Notice::Saved));

        // Second autosave inside the cool-down window stays quiet.
        s.edit_field("marches", FieldValue::Number(9.into()), 800);
        s.poll(1_400).expect("save");
        assert_eq!(s.complete(Ok(()), 1_500).notice, None);

        // Manual save notifies regardless of the window.
        s.edit_field("marches", FieldValue::Number(10.into()), 1_600);
        s.save_now(1_600).expect("save");
        assert_eq!(s.complete(Ok(()), 1_700).notice, Some(Notice::Saved));
    }

    #[test]
    fn hung_save_is_released_after_timeout() {
        let mut s = session();
        s.edit_field("skip", FieldValue::Bool(true), 0);
        s.poll(600).expect("save");
        assert!(s.is_saving());

        // The response never arrives; past the limit the flag drops and the
        // pending diff goes out again.
        assert!(s.poll(600 + 30_000).is_none(), "release tick");
        assert!(!s.is_saving());
        let retry = s.poll(600 + 30_000).expect("retry after release");
        assert_eq!(retry.config.get("skip"), Some(&json!(true)));
    }

    #[test]
    fn schedule_drafts_ride_along_and_commit() {
        let raw = json!({"skip": false});
        let previous_rule = json!({"Uid": "r-1", "Val1": "mon|8:00 AM|11:00 PM"});
        let mut s = EditSession::open(
            EntityId::parse("acc-1").expect("id"),
            2,
            raw.as_object().expect("object"),
            std::slice::from_ref(&previous_rule),
            SessionConfig::default(),
        );
        let mut rule = crate::schedule::decode_rule(&previous_rule);
        rule.every_minutes = Some(45);
        s.edit_rules(vec![rule], 0);

        let request = s.poll(600).expect("save");
        let rules = request.schedule_rules.expect("rules in payload");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].get("Uid"), Some(&json!("r-1")));
        assert_eq!(rules[0].get("Every"), Some(&json!(45)));

        s.complete(Ok(()), 700);
        assert_eq!(s.committed_rules().len(), 1);
        assert_eq!(s.committed_rules()[0].get("Every"), Some(&json!(45)));
    }
}
