pub mod decode;
pub mod http;

pub use http::HttpGateway;

use crate::model::{Entity, Step, Template};
use crate::shared::errors::SyncError;
use crate::shared::ids::EntityId;
use crate::visibility::VisibilityPolicy;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Everything the detail fetch yields for one entity.
#[derive(Debug, Clone)]
pub struct EntityDetail {
    pub entity: Entity,
    pub steps: Vec<Step>,
    pub policy: VisibilityPolicy,
    pub script_labels: BTreeMap<String, String>,
}

/// Partial step write. Only present fields are sent, so a config-only save
/// cannot clobber schedule rules and vice versa.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepUpdate {
    #[serde(rename = "Config", skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
    #[serde(rename = "ScheduleRules", skip_serializing_if = "Option::is_none")]
    pub schedule_rules: Option<Vec<Value>>,
    #[serde(rename = "IsActive", skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopySettingsRequest {
    pub source_id: EntityId,
    pub target_ids: Vec<EntityId>,
    pub allow_cross_group: bool,
}

/// The remote store boundary. Blocking request/response; the engine is the
/// only caller and drives it cooperatively.
pub trait Gateway {
    fn fetch_detail(&self, entity_id: &EntityId) -> Result<EntityDetail, SyncError>;

    fn save_step_config(
        &self,
        entity_id: &EntityId,
        step_index: usize,
        update: &StepUpdate,
    ) -> Result<(), SyncError>;

    fn toggle_step(
        &self,
        entity_id: &EntityId,
        step_index: usize,
        is_active: bool,
    ) -> Result<(), SyncError>;

    /// May fail with `SyncError::PolicyBlocked` when the remote store
    /// refuses the flip (e.g. a billing hold).
    fn toggle_entity(&self, entity_id: &EntityId, is_active: bool) -> Result<(), SyncError>;

    fn apply_defaults(&self, entity_id: &EntityId) -> Result<(), SyncError>;

    fn apply_template(&self, entity_id: &EntityId, name: &str) -> Result<(), SyncError>;

    fn list_templates(&self, entity_id: &EntityId) -> Result<Vec<Template>, SyncError>;

    /// Bulk copy; returns how many targets were written. Per-item errors
    /// for unknown targets are dropped (best effort).
    fn copy_settings(&self, request: &CopySettingsRequest) -> Result<u32, SyncError>;
}
