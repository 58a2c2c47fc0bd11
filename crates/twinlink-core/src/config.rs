//! Connector settings and configuration constants.
//!
//! Settings are layered: built-in defaults, then an optional JSON settings
//! file, then `TWINLINK_*` environment variables. The CLI applies its flags
//! on top of the result.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Default values.
pub mod defaults {
    pub const MESSAGE_MAPPER_CONFIG: &str = "message-mapper-config.json";
    pub const LOG_LEVEL: &str = "info";
}

/// Environment variable names.
pub mod env_vars {
    pub const MESSAGE_MAPPER_CONFIG: &str = "TWINLINK_MESSAGE_MAPPER_CONFIG";
    pub const PASSTHROUGH_DEVICE_TOPICS: &str = "TWINLINK_PASSTHROUGH_DEVICE_TOPICS";
    pub const PASSTHROUGH_COMMAND_NAMES: &str = "TWINLINK_PASSTHROUGH_COMMAND_NAMES";
    pub const DEVICE_ID: &str = "TWINLINK_DEVICE_ID";
    pub const HUB_NAME: &str = "TWINLINK_HUB_NAME";
    pub const LOG_LEVEL: &str = "TWINLINK_LOG_LEVEL";
    /// `true` switches log output to JSON lines.
    pub const LOG_JSON: &str = "TWINLINK_LOG_JSON";
}

/// Settings of one connector instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectorSettings {
    /// Path of the message mapper config.
    pub message_mapper_config: String,

    /// Local topic filters forwarded to the cloud unchanged.
    #[serde(deserialize_with = "string_or_list")]
    pub passthrough_device_topics: Vec<String>,

    /// Cloud command names forwarded to the device unchanged.
    #[serde(deserialize_with = "string_or_list")]
    pub passthrough_command_names: Vec<String>,

    pub device_id: String,

    pub hub_name: String,

    pub log_level: String,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            message_mapper_config: defaults::MESSAGE_MAPPER_CONFIG.to_string(),
            passthrough_device_topics: Vec::new(),
            passthrough_command_names: Vec::new(),
            device_id: String::new(),
            hub_name: String::new(),
            log_level: defaults::LOG_LEVEL.to_string(),
        }
    }
}

impl ConnectorSettings {
    /// Defaults, overlaid with the settings file when given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env(|name| std::env::var(name).ok());
        Ok(settings)
    }

    /// Read a JSON settings file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            Error::Configuration(format!("cannot parse settings {}: {}", path.display(), e))
        })
    }

    /// Override fields from environment variables resolved by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(env_vars::MESSAGE_MAPPER_CONFIG) {
            self.message_mapper_config = v;
        }
        if let Some(v) = lookup(env_vars::PASSTHROUGH_DEVICE_TOPICS) {
            self.passthrough_device_topics = split_list(&v);
        }
        if let Some(v) = lookup(env_vars::PASSTHROUGH_COMMAND_NAMES) {
            self.passthrough_command_names = split_list(&v);
        }
        if let Some(v) = lookup(env_vars::DEVICE_ID) {
            self.device_id = v;
        }
        if let Some(v) = lookup(env_vars::HUB_NAME) {
            self.hub_name = v;
        }
        if let Some(v) = lookup(env_vars::LOG_LEVEL) {
            self.log_level = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.device_id.trim().is_empty() {
            return Err(Error::Configuration("device id is required".to_string()));
        }
        if self.message_mapper_config.trim().is_empty() {
            return Err(Error::Configuration(
                "message mapper config path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        String(String),
        List(Vec<String>),
    }

    Ok(match StringOrList::deserialize(deserializer)? {
        StringOrList::String(s) => split_list(&s),
        StringOrList::List(list) => list
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    })
}
