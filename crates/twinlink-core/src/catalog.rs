//! Mapping catalog: the declarative rules that drive both pipelines.
//!
//! The catalog is loaded once from a JSON document and never mutated
//! afterwards, so it is shared as `Arc<MappingCatalog>` without locking.
//!
//! ```json
//! {
//!   "telemetry": {
//!     "1": {
//!       "container.created": {
//!         "mappingProperties": { "topic": "messages/created" },
//!         "protoFile": "container.created"
//!       }
//!     }
//!   },
//!   "commands": {
//!     "container.manifest": {
//!       "mappingProperties": { "thing": "edge:containers", "action": "apply" }
//!     }
//!   },
//!   "descriptors": {
//!     "container.created": ["name", "imageRef", "config", "createdAt"]
//!   }
//! }
//! ```
//!
//! Telemetry rules are kept in document order. That order is the
//! first-match-wins order of the rule matcher.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{Error, Result};

/// Prefix of a reference directive in a value template.
pub const REFERENCE_PREFIX: char = '$';

/// Reserved key of a field mapping table used when nothing else matches.
pub const FIELD_MAPPING_DEFAULT_KEY: &str = "default";

/// A field mapping table: raw value -> replacement, plus an optional `default`.
pub type FieldMappingTable = Map<String, Value>;

/// Selection and addressing properties of a rule.
///
/// Telemetry rules use `topic`/`path` as substring patterns. Command rules
/// use `thing`, `action` and `value`, and `path` is copied verbatim into the
/// produced Ditto envelope. Empty strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingProperties {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub topic: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thing: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action: String,

    /// Key the raw command payload is wrapped under.
    #[serde(rename = "value", default, skip_serializing_if = "String::is_empty")]
    pub value_key: String,
}

impl MappingProperties {
    pub fn topic_pattern(&self) -> Option<&str> {
        non_empty(&self.topic)
    }

    pub fn path_pattern(&self) -> Option<&str> {
        non_empty(&self.path)
    }

    pub fn value_key(&self) -> Option<&str> {
        non_empty(&self.value_key)
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Output serialization of a telemetry rule without a codec descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Serialization {
    /// Carry the JSON output as a string payload.
    #[serde(rename = "jsonString")]
    JsonString,
}

/// A single mapping rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRule {
    #[serde(default)]
    pub mapping_properties: MappingProperties,

    #[serde(rename = "retainCorrelationID", default)]
    pub retain_correlation_id: bool,

    /// Value template evaluated by the interpreter.
    #[serde(rename = "valueMapping", default, skip_serializing_if = "Option::is_none")]
    pub value_template: Option<Map<String, Value>>,

    /// Reference directive -> remap table.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub field_mappings: HashMap<String, FieldMappingTable>,

    /// Codec descriptor id.
    #[serde(rename = "protoFile", default, skip_serializing_if = "Option::is_none")]
    pub proto_descriptor: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialization: Option<Serialization>,
}

impl MappingRule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec descriptor id, if the rule is binary encoded.
    pub fn descriptor(&self) -> Option<&str> {
        self.proto_descriptor.as_deref().and_then(non_empty)
    }

    /// Remap table for a reference directive.
    pub fn field_mapping(&self, reference: &str) -> Option<&FieldMappingTable> {
        self.field_mappings.get(reference)
    }

    pub fn with_topic_pattern(mut self, topic: impl Into<String>) -> Self {
        self.mapping_properties.topic = topic.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.mapping_properties.path = path.into();
        self
    }

    pub fn with_thing(mut self, thing: impl Into<String>) -> Self {
        self.mapping_properties.thing = thing.into();
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.mapping_properties.action = action.into();
        self
    }

    pub fn with_value_key(mut self, key: impl Into<String>) -> Self {
        self.mapping_properties.value_key = key.into();
        self
    }

    pub fn with_retain_correlation_id(mut self, retain: bool) -> Self {
        self.retain_correlation_id = retain;
        self
    }

    /// Set the value template. Non-object values clear the template.
    pub fn with_template(mut self, template: Value) -> Self {
        self.value_template = match template {
            Value::Object(map) => Some(map),
            _ => None,
        };
        self
    }

    pub fn with_field_mapping(mut self, reference: impl Into<String>, table: Value) -> Self {
        if let Value::Object(map) = table {
            self.field_mappings.insert(reference.into(), map);
        }
        self
    }

    pub fn with_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.proto_descriptor = Some(descriptor.into());
        self
    }

    pub fn with_serialization(mut self, serialization: Serialization) -> Self {
        self.serialization = Some(serialization);
        self
    }

    /// Check that every field mapping key is a reference used by the template.
    fn validate(&self, rule_id: &str) -> Result<()> {
        if self.field_mappings.is_empty() {
            return Ok(());
        }

        let mut references = HashSet::new();
        if let Some(template) = &self.value_template {
            collect_references(template, &mut references);
        }

        for key in self.field_mappings.keys() {
            if !key.starts_with(REFERENCE_PREFIX) {
                return Err(Error::Configuration(format!(
                    "rule '{}': field mapping key '{}' is not a reference directive",
                    rule_id, key
                )));
            }
            if !references.contains(key.as_str()) {
                return Err(Error::Configuration(format!(
                    "rule '{}': field mapping key '{}' is not referenced by the value mapping",
                    rule_id, key
                )));
            }
        }
        Ok(())
    }
}

fn collect_references<'a>(template: &'a Map<String, Value>, out: &mut HashSet<&'a str>) {
    for value in template.values() {
        match value {
            Value::String(s) if s.starts_with(REFERENCE_PREFIX) => {
                out.insert(s.as_str());
            }
            Value::Object(nested) => collect_references(nested, out),
            _ => {}
        }
    }
}

/// Telemetry rules of one message type, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryTypeMappings {
    pub message_type: i64,
    pub sub_types: Vec<(String, MappingRule)>,
}

/// A telemetry rule together with its message type and sub type.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryRuleRef<'a> {
    pub message_type: i64,
    pub message_sub_type: &'a str,
    pub rule: &'a MappingRule,
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    telemetry: Map<String, Value>,
    #[serde(default)]
    commands: HashMap<String, MappingRule>,
    #[serde(default)]
    descriptors: HashMap<String, Vec<String>>,
}

/// Immutable lookup of mapping rules.
#[derive(Debug, Clone, Default)]
pub struct MappingCatalog {
    telemetry: Vec<TelemetryTypeMappings>,
    commands: HashMap<String, MappingRule>,
    descriptors: HashMap<String, Vec<String>>,
}

impl MappingCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a catalog from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_json_str(&content).map_err(|e| match e {
            Error::Configuration(msg) => {
                Error::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;

        info!(
            path = %path.display(),
            telemetry_rules = catalog.telemetry_rules().count(),
            command_rules = catalog.commands.len(),
            descriptors = catalog.descriptors.len(),
            "Loaded message mapper config"
        );
        Ok(catalog)
    }

    /// Parse and validate a catalog from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let document: CatalogDocument = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid message mapper config: {}", e)))?;

        let mut telemetry = Vec::with_capacity(document.telemetry.len());
        for (type_key, sub_types) in document.telemetry {
            let message_type: i64 = type_key.trim().parse().map_err(|_| {
                Error::Configuration(format!(
                    "telemetry message type '{}' is not an integer",
                    type_key
                ))
            })?;

            let Value::Object(sub_types) = sub_types else {
                return Err(Error::Configuration(format!(
                    "telemetry message type '{}' must map sub types to rules",
                    type_key
                )));
            };

            let mut rules = Vec::with_capacity(sub_types.len());
            for (sub_type, rule) in sub_types {
                let rule: MappingRule = serde_json::from_value(rule).map_err(|e| {
                    Error::Configuration(format!(
                        "invalid telemetry rule '{}/{}': {}",
                        type_key, sub_type, e
                    ))
                })?;
                rules.push((sub_type, rule));
            }

            telemetry.push(TelemetryTypeMappings {
                message_type,
                sub_types: rules,
            });
        }

        let catalog = Self {
            telemetry,
            commands: document.commands,
            descriptors: document.descriptors,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<()> {
        for entry in self.telemetry_rules() {
            entry.rule.validate(&format!(
                "{}/{}",
                entry.message_type, entry.message_sub_type
            ))?;
        }
        for (name, rule) in &self.commands {
            rule.validate(name)?;
        }
        Ok(())
    }

    /// Add a telemetry rule after the existing ones.
    pub fn with_telemetry_rule(
        mut self,
        message_type: i64,
        message_sub_type: impl Into<String>,
        rule: MappingRule,
    ) -> Self {
        let sub_type = message_sub_type.into();
        match self
            .telemetry
            .iter_mut()
            .find(|t| t.message_type == message_type)
        {
            Some(existing) => existing.sub_types.push((sub_type, rule)),
            None => self.telemetry.push(TelemetryTypeMappings {
                message_type,
                sub_types: vec![(sub_type, rule)],
            }),
        }
        self
    }

    pub fn with_command_rule(mut self, command_name: impl Into<String>, rule: MappingRule) -> Self {
        self.commands.insert(command_name.into(), rule);
        self
    }

    pub fn with_descriptor(mut self, id: impl Into<String>, fields: Vec<String>) -> Self {
        self.descriptors.insert(id.into(), fields);
        self
    }

    /// Telemetry table: message type -> sub type -> rule, in document order.
    pub fn telemetry_mappings(&self) -> &[TelemetryTypeMappings] {
        &self.telemetry
    }

    /// All telemetry rules flattened, in matching order.
    pub fn telemetry_rules(&self) -> impl Iterator<Item = TelemetryRuleRef<'_>> {
        self.telemetry.iter().flat_map(|t| {
            t.sub_types.iter().map(move |(sub_type, rule)| TelemetryRuleRef {
                message_type: t.message_type,
                message_sub_type: sub_type.as_str(),
                rule,
            })
        })
    }

    /// Telemetry rule by message type and sub type.
    pub fn telemetry_mapping(&self, message_type: i64, message_sub_type: &str) -> Option<&MappingRule> {
        self.telemetry_rules()
            .find(|r| r.message_type == message_type && r.message_sub_type == message_sub_type)
            .map(|r| r.rule)
    }

    /// Command rule by exact command name.
    pub fn command_mapping(&self, command_name: &str) -> Result<&MappingRule> {
        self.commands.get(command_name).ok_or_else(|| {
            Error::NoMappingFound(format!(
                "cloud command name '{}' is not supported",
                command_name
            ))
        })
    }

    /// Names of all mapped commands, sorted.
    pub fn command_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Field list of a codec descriptor.
    pub fn descriptor(&self, id: &str) -> Option<&[String]> {
        self.descriptors.get(id).map(Vec::as_slice)
    }
}
