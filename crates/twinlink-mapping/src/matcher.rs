//! Rule selection for both directions.

use std::sync::Arc;

use tracing::debug;
use twinlink_core::catalog::{MappingCatalog, MappingProperties, MappingRule, TelemetryRuleRef};
use twinlink_core::error::{Error, Result};

/// Selects mapping rules from a shared catalog.
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    catalog: Arc<MappingCatalog>,
}

impl RuleMatcher {
    pub fn new(catalog: Arc<MappingCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<MappingCatalog> {
        &self.catalog
    }

    /// First telemetry rule, in catalog order, matching `topic` and `path`.
    pub fn match_telemetry(&self, topic: Option<&str>, path: &str) -> Result<TelemetryRuleRef<'_>> {
        let Some(topic) = topic else {
            return Err(Error::NoMappingFound(format!(
                "missing Ditto topic in message with path '{}'",
                path
            )));
        };

        let found = self
            .catalog
            .telemetry_rules()
            .find(|entry| matches(&entry.rule.mapping_properties, topic, path));

        match found {
            Some(entry) => {
                debug!(
                    topic,
                    path,
                    message_type = entry.message_type,
                    message_sub_type = entry.message_sub_type,
                    "Matched telemetry rule"
                );
                Ok(entry)
            }
            None => Err(Error::NoMappingFound(format!(
                "cannot map Ditto topic '{}' & Ditto path '{}' to D2C message sub type",
                topic, path
            ))),
        }
    }

    /// Command rule by exact command name.
    pub fn match_command(&self, command_name: &str) -> Result<&MappingRule> {
        self.catalog.command_mapping(command_name)
    }
}

/// Substring match of a rule's patterns. A rule without patterns never matches.
fn matches(properties: &MappingProperties, topic: &str, path: &str) -> bool {
    match (properties.topic_pattern(), properties.path_pattern()) {
        (Some(t), Some(p)) => topic.contains(t) && path.contains(p),
        (Some(t), None) => topic.contains(t),
        (None, Some(p)) => path.contains(p),
        (None, None) => false,
    }
}
