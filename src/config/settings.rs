use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_debounce_ms() -> i64 {
    600
}

fn default_toast_cooldown_ms() -> i64 {
    4_000
}

fn default_save_timeout_ms() -> i64 {
    30_000
}

fn default_request_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub api_base: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_debounce_ms")]
    pub autosave_debounce_ms: i64,
    #[serde(default = "default_toast_cooldown_ms")]
    pub toast_cooldown_ms: i64,
    /// A save in flight longer than this is treated as failed and retried.
    #[serde(default = "default_save_timeout_ms")]
    pub save_timeout_ms: i64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// Privileged sessions see policy-hidden steps and the schedule editor.
    #[serde(default)]
    pub privileged: bool,
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base.trim().is_empty() {
            return Err(ConfigError::Settings("api_base must be non-empty".into()));
        }
        if self.autosave_debounce_ms < 0 {
            return Err(ConfigError::Settings(
                "autosave_debounce_ms must not be negative".into(),
            ));
        }
        if self.save_timeout_ms <= 0 {
            return Err(ConfigError::Settings(
                "save_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_token: None,
            autosave_debounce_ms: default_debounce_ms(),
            toast_cooldown_ms: default_toast_cooldown_ms(),
            save_timeout_ms: default_save_timeout_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            log_path: None,
            privileged: false,
        }
    }
}
