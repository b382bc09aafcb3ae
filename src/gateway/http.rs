use super::{decode, CopySettingsRequest, EntityDetail, Gateway, StepUpdate};
use crate::config::Settings;
use crate::model::Template;
use crate::shared::errors::SyncError;
use crate::shared::ids::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Error string the remote store uses when an operation is refused by an
/// account-level hold rather than a transient fault.
const POLICY_BLOCKED_MARKER: &str = "blocked_by_policy";

#[derive(Debug, Clone, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    data: T,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct EmptyData {}

#[derive(Debug, Clone, Deserialize)]
struct TemplatesData {
    #[serde(default)]
    templates: Vec<Template>,
}

#[derive(Debug, Clone, Deserialize)]
struct CopyData {
    #[serde(default)]
    copied: u32,
}

/// Blocking client for the step-management API.
#[derive(Clone)]
pub struct HttpGateway {
    agent: ureq::Agent,
    api_base: String,
    api_token: Option<String>,
}

impl HttpGateway {
    pub fn new(settings: &Settings) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build();
        Self {
            agent,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_token: settings.api_token.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn entity_path(&self, entity_id: &EntityId, suffix: &str) -> String {
        let encoded = urlencoding::encode(entity_id.as_str());
        if suffix.is_empty() {
            self.endpoint(&format!("manage/account/{encoded}"))
        } else {
            self.endpoint(&format!("manage/account/{encoded}/{suffix}"))
        }
    }

    fn prepare(&self, request: ureq::Request, skip_loader: bool) -> ureq::Request {
        let mut request = request;
        if let Some(token) = &self.api_token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        if skip_loader {
            // Background saves must not trip the remote UI's busy overlay.
            request = request.set("x-skip-loader", "1");
        }
        request
    }

    fn map_call_error(err: ureq::Error) -> SyncError {
        match err {
            ureq::Error::Status(code, response) => {
                let body = response.into_string().unwrap_or_default();
                if body.contains(POLICY_BLOCKED_MARKER) {
                    SyncError::PolicyBlocked(body)
                } else {
                    SyncError::Rejected(format!("HTTP {code}: {body}"))
                }
            }
            ureq::Error::Transport(transport) => SyncError::Network(transport.to_string()),
        }
    }

    fn check_envelope<T>(envelope: Envelope<T>, context: &str) -> Result<T, SyncError> {
        if envelope.ok {
            return Ok(envelope.data);
        }
        let message = envelope
            .error
            .unwrap_or_else(|| format!("{context} failed"));
        if message.contains(POLICY_BLOCKED_MARKER) {
            Err(SyncError::PolicyBlocked(message))
        } else {
            Err(SyncError::Rejected(message))
        }
    }

    fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        skip_loader: bool,
    ) -> Result<T, SyncError> {
        let response = self
            .prepare(self.agent.get(url), skip_loader)
            .call()
            .map_err(Self::map_call_error)?;
        response
            .into_json::<T>()
            .map_err(|e| SyncError::Malformed(e.to_string()))
    }

    fn send_json<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        url: &str,
        body: &B,
        skip_loader: bool,
    ) -> Result<T, SyncError> {
        let payload =
            serde_json::to_value(body).map_err(|e| SyncError::Malformed(e.to_string()))?;
        let response = self
            .prepare(self.agent.request(method, url), skip_loader)
            .send_json(payload)
            .map_err(Self::map_call_error)?;
        response
            .into_json::<T>()
            .map_err(|e| SyncError::Malformed(e.to_string()))
    }
}

impl Gateway for HttpGateway {
    fn fetch_detail(&self, entity_id: &EntityId) -> Result<EntityDetail, SyncError> {
        let url = self.entity_path(entity_id, "settings");
        // The settings payload comes in one of several historical shapes;
        // the decoder sorts that out and degrades malformed input to an
        // empty step list rather than failing the session.
        let payload: serde_json::Value = self.get_json(&url, false)?;
        Ok(decode::decode_detail(entity_id, payload))
    }

    fn save_step_config(
        &self,
        entity_id: &EntityId,
        step_index: usize,
        update: &StepUpdate,
    ) -> Result<(), SyncError> {
        let url = self.entity_path(entity_id, &format!("settings/{step_index}"));
        let envelope: Envelope<EmptyData> = self.send_json("PUT", &url, update, true)?;
        Self::check_envelope(envelope, "step save").map(|_| ())
    }

    fn toggle_step(
        &self,
        entity_id: &EntityId,
        step_index: usize,
        is_active: bool,
    ) -> Result<(), SyncError> {
        let update = StepUpdate {
            is_active: Some(is_active),
            ..StepUpdate::default()
        };
        self.save_step_config(entity_id, step_index, &update)
    }

    fn toggle_entity(&self, entity_id: &EntityId, is_active: bool) -> Result<(), SyncError> {
        let url = self.entity_path(entity_id, "");
        // Older store versions read `Active`, newer ones `IsActive`.
        let body = json!({ "Active": is_active, "IsActive": is_active });
        let envelope: Envelope<EmptyData> = self.send_json("PUT", &url, &body, true)?;
        Self::check_envelope(envelope, "entity toggle").map(|_| ())
    }

    fn apply_defaults(&self, entity_id: &EntityId) -> Result<(), SyncError> {
        let url = self.entity_path(entity_id, "apply_defaults");
        let envelope: Envelope<EmptyData> = self.send_json("POST", &url, &json!({}), false)?;
        Self::check_envelope(envelope, "apply defaults").map(|_| ())
    }

    fn apply_template(&self, entity_id: &EntityId, name: &str) -> Result<(), SyncError> {
        let url = self.entity_path(entity_id, "apply_template");
        let body = json!({ "template": name });
        let envelope: Envelope<EmptyData> = self.send_json("POST", &url, &body, false)?;
        Self::check_envelope(envelope, "apply template").map(|_| ())
    }

    fn list_templates(&self, _entity_id: &EntityId) -> Result<Vec<Template>, SyncError> {
        let url = self.endpoint("templates");
        let envelope: Envelope<TemplatesData> = self.get_json(&url, true)?;
        Self::check_envelope(envelope, "template list").map(|data| data.templates)
    }

    fn copy_settings(&self, request: &CopySettingsRequest) -> Result<u32, SyncError> {
        let url = self.endpoint("manage/copy_settings");
        let envelope: Envelope<CopyData> = self.send_json("POST", &url, request, false)?;
        Self::check_envelope(envelope, "copy settings").map(|data| data.copied)
    }
}
