use crate::config::Settings;
use crate::gateway::{CopySettingsRequest, EntityDetail, Gateway, StepUpdate};
use crate::model::{FieldValue, StepView, Template};
use crate::schedule::ScheduleRule;
use crate::selection::{Pane, SelectionState};
use crate::session::{EditSession, Notice, SaveRequest, SessionConfig};
use crate::shared::errors::SyncError;
use crate::shared::ids::EntityId;
use crate::shared::logging::append_sync_log_line;
use serde_json::{Map, Value};

/// Everything the config pane can show. An empty pane is always one of
/// these explicit states, never a silently blank view.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigPanel {
    NoEntity,
    NoSteps,
    NoStepSelected,
    HiddenStep { name: String },
    NoParams { name: String },
    Fields { name: String, rows: Vec<FieldRow> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRow {
    pub key: String,
    pub label: String,
    pub value: FieldValue,
}

/// Single-threaded coordinator: owns the gateway, the selection state, the
/// fetched entity detail and the active edit session, and drives saves
/// cooperatively through `tick`.
pub struct Engine<G: Gateway> {
    gateway: G,
    settings: Settings,
    selection: SelectionState,
    detail: Option<EntityDetail>,
    session: Option<EditSession>,
}

impl<G: Gateway> Engine<G> {
    pub fn new(gateway: G, settings: Settings, narrow: bool) -> Self {
        Self {
            gateway,
            settings,
            selection: SelectionState::new(narrow),
            detail: None,
            session: None,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn detail(&self) -> Option<&EntityDetail> {
        self.detail.as_ref()
    }

    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            debounce_ms: self.settings.autosave_debounce_ms,
            toast_cooldown_ms: self.settings.toast_cooldown_ms,
            save_timeout_ms: self.settings.save_timeout_ms,
        }
    }

    /// Step indices eligible for default focus: visible under the active
    /// policy, or all of them for a privileged session.
    fn eligible_steps(&self, detail: &EntityDetail) -> Vec<usize> {
        detail
            .steps
            .iter()
            .filter(|step| {
                self.settings.privileged
                    || step
                        .script_id
                        .as_ref()
                        .map(|id| !detail.policy.step_hidden(id.as_str()))
                        .unwrap_or(true)
            })
            .map(|step| step.index)
            .collect()
    }

    /// Fetch and focus an entity. A repeat request while a load is running
    /// is ignored; a failed fetch leaves the previous focus in place.
    pub fn select_entity(&mut self, entity_id: &EntityId) -> Result<(), SyncError> {
        if !self.selection.begin_load(entity_id) {
            return Ok(());
        }
        match self.gateway.fetch_detail(entity_id) {
            Ok(detail) => {
                let eligible = self.eligible_steps(&detail);
                self.session = None;
                self.selection.finish_load(entity_id.clone(), &eligible);
                self.detail = Some(detail);
                if let Some(index) = self.selection.step() {
                    self.open_session(index);
                }
                Ok(())
            }
            Err(err) => {
                self.selection.fail_load();
                self.log_event("detail.fetch.failed", entity_id, &[("error", err.to_string())]);
                Err(err)
            }
        }
    }

    /// Focus a step and start a fresh edit session for it. Any previous
    /// session (including pending edits) is discarded.
    pub fn select_step(&mut self, index: usize) -> bool {
        let exists = self
            .detail
            .as_ref()
            .is_some_and(|detail| index < detail.steps.len());
        if !exists || !self.selection.select_step(index) {
            return false;
        }
        self.open_session(index);
        true
    }

    fn open_session(&mut self, index: usize) {
        let config = self.session_config();
        let (Some(detail), Some(entity_id)) = (&self.detail, self.selection.entity()) else {
            return;
        };
        let Some(step) = detail.steps.get(index) else {
            return;
        };
        self.session = Some(EditSession::open(
            entity_id.clone(),
            index,
            &step.config,
            &step.schedule_rules,
            config,
        ));
    }

    pub fn edit_field(&mut self, key: &str, value: FieldValue, now: i64) {
        if let Some(session) = &mut self.session {
            session.edit_field(key, value, now);
        }
    }

    pub fn edit_rules(&mut self, rules: Vec<ScheduleRule>, now: i64) {
        if let Some(session) = &mut self.session {
            session.edit_rules(rules, now);
        }
    }

    /// Explicit save. Sends immediately unless a save is already in
    /// flight, in which case it queues behind it.
    pub fn save_now(&mut self, now: i64) -> Option<Notice> {
        let request = self.session.as_mut()?.save_now(now)?;
        self.dispatch(request, now)
    }

    /// Drive the autosave cycle: fire the debounce timer, send the diff,
    /// apply the completion. Call on every clock tick.
    pub fn tick(&mut self, now: i64) -> Option<Notice> {
        let request = self.session.as_mut()?.poll(now)?;
        self.dispatch(request, now)
    }

    fn dispatch(&mut self, request: SaveRequest, now: i64) -> Option<Notice> {
        let outcome = if request.config.is_empty() && request.schedule_rules.is_none() {
            // Nothing actually changed; resolve locally without a write.
            Ok(())
        } else {
            let update = StepUpdate {
                config: (!request.config.is_empty()).then(|| request.config.clone()),
                schedule_rules: request.schedule_rules.clone(),
                is_active: None,
            };
            self.gateway
                .save_step_config(&request.entity_id, request.step_index, &update)
        };
        if let Err(err) = &outcome {
            self.log_event(
                "step.save.failed",
                &request.entity_id,
                &[
                    ("step", request.step_index.to_string()),
                    ("error", err.to_string()),
                    ("retryable", err.is_retryable().to_string()),
                ],
            );
        }
        // Selection may have moved while the request was on the wire; a
        // stale completion must not touch the new session.
        let session = self.session.as_mut()?;
        if session.entity_id() != &request.entity_id
            || session.step_index() != request.step_index
        {
            return None;
        }
        let completion = session.complete(outcome, now);
        self.sync_committed_step();
        completion.notice
    }

    /// Mirror the session's committed snapshot back into the step list so
    /// re-opening the step starts from what the server acknowledged.
    fn sync_committed_step(&mut self) {
        let (Some(session), Some(detail)) = (&self.session, &mut self.detail) else {
            return;
        };
        if let Some(step) = detail.steps.get_mut(session.step_index()) {
            step.config = session.committed_config().clone();
            step.schedule_rules = session.committed_rules().to_vec();
        }
    }

    /// Optimistic step toggle: flip locally, revert on any failure.
    pub fn toggle_step(&mut self, index: usize, is_active: bool) -> Result<(), SyncError> {
        let entity_id = self.require_entity()?;
        {
            let detail = self.detail.as_mut().ok_or_else(no_entity)?;
            let step = detail
                .steps
                .get_mut(index)
                .ok_or_else(|| SyncError::Rejected(format!("no step {index}")))?;
            step.is_active = is_active;
        }
        let result = self.gateway.toggle_step(&entity_id, index, is_active);
        if let Err(err) = &result {
            if let Some(step) = self
                .detail
                .as_mut()
                .and_then(|detail| detail.steps.get_mut(index))
            {
                step.is_active = !is_active;
            }
            self.log_event(
                "step.toggle.failed",
                &entity_id,
                &[("step", index.to_string()), ("error", err.to_string())],
            );
        }
        result
    }

    /// Optimistic entity toggle. `PolicyBlocked` (and any other failure)
    /// reverts the local flag.
    pub fn toggle_entity(&mut self, is_active: bool) -> Result<(), SyncError> {
        let entity_id = self.require_entity()?;
        if let Some(detail) = &mut self.detail {
            detail.entity.is_active = is_active;
        }
        let result = self.gateway.toggle_entity(&entity_id, is_active);
        if let Err(err) = &result {
            if let Some(detail) = &mut self.detail {
                detail.entity.is_active = !is_active;
            }
            self.log_event("entity.toggle.failed", &entity_id, &[("error", err.to_string())]);
        }
        result
    }

    /// Seed the entity with its tariff defaults, then refetch so the step
    /// list reflects what the server actually wrote.
    pub fn apply_defaults(&mut self) -> Result<(), SyncError> {
        let entity_id = self.require_entity()?;
        self.gateway.apply_defaults(&entity_id)?;
        self.refetch(&entity_id)
    }

    pub fn apply_template(&mut self, name: &str) -> Result<(), SyncError> {
        let entity_id = self.require_entity()?;
        self.gateway.apply_template(&entity_id, name)?;
        self.log_event("template.applied", &entity_id, &[("template", name.to_string())]);
        self.refetch(&entity_id)
    }

    pub fn templates(&self) -> Result<Vec<Template>, SyncError> {
        let entity_id = self.require_entity()?;
        self.gateway.list_templates(&entity_id)
    }

    pub fn copy_settings(&self, request: &CopySettingsRequest) -> Result<u32, SyncError> {
        self.gateway.copy_settings(request)
    }

    fn refetch(&mut self, entity_id: &EntityId) -> Result<(), SyncError> {
        let detail = self.gateway.fetch_detail(entity_id)?;
        let selected = self.selection.step();
        self.detail = Some(detail);
        self.session = None;
        if let Some(index) = selected {
            self.open_session(index);
        }
        Ok(())
    }

    fn require_entity(&self) -> Result<EntityId, SyncError> {
        self.selection.entity().cloned().ok_or_else(no_entity)
    }

    pub fn set_narrow(&mut self, narrow: bool) {
        self.selection.set_narrow(narrow);
    }

    pub fn back(&mut self) {
        self.selection.back();
    }

    pub fn pane(&self) -> Option<Pane> {
        self.selection.pane()
    }

    /// Step rows for the list view, with display names resolved through
    /// the script-label table.
    pub fn step_views(&self) -> Vec<StepView> {
        self.detail
            .as_ref()
            .map(|detail| {
                detail
                    .steps
                    .iter()
                    .map(|step| StepView::from_step(step, &detail.script_labels))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolve what the config pane should currently display.
    pub fn config_panel(&self) -> ConfigPanel {
        let Some(detail) = &self.detail else {
            return ConfigPanel::NoEntity;
        };
        if self.selection.entity().is_none() {
            return ConfigPanel::NoEntity;
        }
        if detail.steps.is_empty() {
            return ConfigPanel::NoSteps;
        }
        let Some(index) = self.selection.step() else {
            return ConfigPanel::NoStepSelected;
        };
        let Some(step) = detail.steps.get(index) else {
            return ConfigPanel::NoStepSelected;
        };
        let name = step.display_name(&detail.script_labels);
        let script_id = step.script_id.as_ref().map(|id| id.as_str()).unwrap_or("");
        if !self.settings.privileged && detail.policy.step_hidden(script_id) {
            return ConfigPanel::HiddenStep { name };
        }
        let Some(session) = &self.session else {
            return ConfigPanel::NoParams { name };
        };
        let form = session.form();
        let keys: Vec<&str> = form.keys().map(String::as_str).collect();
        let ordered = detail.policy.visible_keys(script_id, &keys);
        if ordered.is_empty() {
            return ConfigPanel::NoParams { name };
        }
        let rows = ordered
            .into_iter()
            .filter_map(|key| {
                form.get(key).map(|value| FieldRow {
                    key: key.to_string(),
                    label: detail
                        .policy
                        .label_for(script_id, key)
                        .unwrap_or(key)
                        .to_string(),
                    value: value.clone(),
                })
            })
            .collect();
        ConfigPanel::Fields { name, rows }
    }

    /// Best-effort JSON event line, only when a log path is configured.
    fn log_event(&self, event: &str, entity_id: &EntityId, fields: &[(&str, String)]) {
        let Some(path) = &self.settings.log_path else {
            return;
        };
        let mut payload = Map::new();
        payload.insert("event".to_string(), Value::String(event.to_string()));
        payload.insert(
            "entity".to_string(),
            Value::String(entity_id.as_str().to_string()),
        );
        for (key, value) in fields {
            payload.insert((*key).to_string(), Value::String(value.clone()));
        }
        if let Ok(line) = serde_json::to_string(&Value::Object(payload)) {
            let _ = append_sync_log_line(path, &line);
        }
    }
}

fn no_entity() -> SyncError {
    SyncError::Rejected("no entity selected".to_string())
}
