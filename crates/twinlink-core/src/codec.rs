//! Binary codec boundary.
//!
//! The pipelines only see the [`Codec`] trait. [`SchemaCodec`] is the
//! built-in implementation: a descriptor is an ordered list of field names
//! and values travel positionally, without field names on the wire.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::trace;

use crate::catalog::MappingCatalog;
use crate::error::{Error, Result};

/// Converts between mapped JSON and a compact binary form.
pub trait Codec: Send + Sync {
    /// Encode the JSON output of a telemetry rule.
    fn marshal(&self, message_type: i64, message_sub_type: &str, json: &[u8]) -> Result<Vec<u8>>;

    /// Decode the encoded payload of a cloud command into JSON bytes.
    fn unmarshal(&self, command_name: &str, encoded: &str) -> Result<Vec<u8>>;
}

/// Self-describing positional value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum WireValue {
    Absent,
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    /// Arrays and objects, as compact JSON text.
    Json(String),
}

impl WireValue {
    fn from_json(value: &Value) -> Result<Self> {
        Ok(match value {
            Value::Null => WireValue::Null,
            Value::Bool(b) => WireValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    WireValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    WireValue::UInt(u)
                } else {
                    WireValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => WireValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => WireValue::Json(
                serde_json::to_string(value).map_err(|e| Error::Codec(e.to_string()))?,
            ),
        })
    }

    fn into_json(self) -> Result<Option<Value>> {
        Ok(Some(match self {
            WireValue::Absent => return Ok(None),
            WireValue::Null => Value::Null,
            WireValue::Bool(b) => Value::Bool(b),
            WireValue::Int(i) => Value::from(i),
            WireValue::UInt(u) => Value::from(u),
            WireValue::Float(f) => Number::from_f64(f).map(Value::Number).ok_or_else(|| {
                Error::Codec(format!("non-finite number {} on the wire", f))
            })?,
            WireValue::Text(s) => Value::String(s),
            WireValue::Json(text) => serde_json::from_str(&text)
                .map_err(|e| Error::Codec(format!("invalid nested value: {}", e)))?,
        }))
    }
}

/// Positional codec driven by the catalog's descriptors.
pub struct SchemaCodec {
    catalog: Arc<MappingCatalog>,
}

impl SchemaCodec {
    pub fn new(catalog: Arc<MappingCatalog>) -> Self {
        Self { catalog }
    }

    fn fields(&self, descriptor: Option<&str>, subject: &str) -> Result<&[String]> {
        let id = descriptor
            .ok_or_else(|| Error::Codec(format!("{} has no codec descriptor", subject)))?;
        self.catalog
            .descriptor(id)
            .ok_or_else(|| Error::Codec(format!("unknown codec descriptor '{}'", id)))
    }

    /// Encode a JSON object against a field list.
    pub fn encode(fields: &[String], json: &[u8]) -> Result<Vec<u8>> {
        let value: Value = serde_json::from_slice(json)
            .map_err(|e| Error::Codec(format!("invalid JSON input: {}", e)))?;
        let Value::Object(object) = value else {
            return Err(Error::Codec("codec input must be a JSON object".to_string()));
        };

        if let Some(unknown) = object.keys().find(|k| !fields.contains(*k)) {
            return Err(Error::Codec(format!(
                "field '{}' is not part of the descriptor",
                unknown
            )));
        }

        let values = fields
            .iter()
            .map(|field| match object.get(field) {
                Some(v) => WireValue::from_json(v),
                None => Ok(WireValue::Absent),
            })
            .collect::<Result<Vec<_>>>()?;

        bincode::serialize(&values).map_err(|e| Error::Codec(e.to_string()))
    }

    /// Decode positional bytes back into a named JSON object.
    pub fn decode(fields: &[String], bytes: &[u8]) -> Result<Map<String, Value>> {
        let values: Vec<WireValue> =
            bincode::deserialize(bytes).map_err(|e| Error::Codec(e.to_string()))?;
        if values.len() != fields.len() {
            return Err(Error::Codec(format!(
                "expected {} values, found {}",
                fields.len(),
                values.len()
            )));
        }

        let mut object = Map::new();
        for (field, value) in fields.iter().zip(values) {
            if let Some(v) = value.into_json()? {
                object.insert(field.clone(), v);
            }
        }
        Ok(object)
    }
}

impl Codec for SchemaCodec {
    fn marshal(&self, message_type: i64, message_sub_type: &str, json: &[u8]) -> Result<Vec<u8>> {
        let rule = self
            .catalog
            .telemetry_mapping(message_type, message_sub_type)
            .ok_or_else(|| {
                Error::Codec(format!(
                    "no telemetry rule for {}/{}",
                    message_type, message_sub_type
                ))
            })?;
        let subject = format!("telemetry rule {}/{}", message_type, message_sub_type);
        let fields = self.fields(rule.descriptor(), &subject)?;

        trace!(message_type, message_sub_type, "Marshalling telemetry value");
        Self::encode(fields, json)
    }

    fn unmarshal(&self, command_name: &str, encoded: &str) -> Result<Vec<u8>> {
        let rule = self
            .catalog
            .command_mapping(command_name)
            .map_err(|_| Error::Codec(format!("no command rule for '{}'", command_name)))?;
        let subject = format!("command '{}'", command_name);
        let fields = self.fields(rule.descriptor(), &subject)?;

        let object = if encoded.is_empty() {
            Map::new()
        } else {
            let bytes = BASE64
                .decode(encoded.trim())
                .map_err(|e| Error::Codec(format!("invalid base64 payload: {}", e)))?;
            Self::decode(fields, &bytes)?
        };

        trace!(command_name, fields = object.len(), "Unmarshalled command payload");
        serde_json::to_vec(&Value::Object(object)).map_err(|e| Error::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MappingRule;
    use serde_json::json;

    fn codec() -> SchemaCodec {
        let fields = |names: &[&str]| -> Vec<String> { names.iter().map(|s| s.to_string()).collect() };
        let catalog = MappingCatalog::new()
            .with_telemetry_rule(
                1,
                "container.created",
                MappingRule::new()
                    .with_topic_pattern("created")
                    .with_descriptor("container.created"),
            )
            .with_telemetry_rule(1, "plain", MappingRule::new().with_topic_pattern("plain"))
            .with_command_rule(
                "container.create",
                MappingRule::new().with_descriptor("container.create"),
            )
            .with_command_rule("container.missing", MappingRule::new().with_descriptor("nope"))
            .with_descriptor("container.created", fields(&["name", "imageRef", "config", "createdAt"]))
            .with_descriptor("container.create", fields(&["name", "imageRef", "config", "createdAt"]));
        SchemaCodec::new(Arc::new(catalog))
    }

    #[test]
    fn test_marshal_then_unmarshal_restores_object() {
        let codec = codec();
        let input = json!({
            "name": "influxdb",
            "imageRef": "docker.io/library/influxdb:1.8.4",
            "config": {"restart": "always", "ports": [8086]},
            "createdAt": 1622630393123i64
        });

        let bytes = codec
            .marshal(1, "container.created", input.to_string().as_bytes())
            .unwrap();
        assert!(!bytes.is_empty());

        let decoded = codec
            .unmarshal("container.create", &BASE64.encode(&bytes))
            .unwrap();
        let decoded: Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn test_absent_fields_stay_absent() {
        let codec = codec();
        let bytes = codec
            .marshal(1, "container.created", br#"{"name":"x","config":null}"#)
            .unwrap();
        let decoded = codec
            .unmarshal("container.create", &BASE64.encode(&bytes))
            .unwrap();
        let decoded: Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(decoded, json!({"name": "x", "config": null}));
    }

    #[test]
    fn test_empty_payload_decodes_to_empty_object() {
        let decoded = codec().unmarshal("container.create", "").unwrap();
        assert_eq!(decoded, b"{}");
    }

    #[test]
    fn test_marshal_rejects_unknown_field() {
        let err = codec()
            .marshal(1, "container.created", br#"{"name":"x","unknown":1}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Codec(ref m) if m.contains("unknown")));
    }

    #[test]
    fn test_marshal_rejects_non_object() {
        let err = codec().marshal(1, "container.created", b"[1,2]").unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }

    #[test]
    fn test_missing_descriptors_are_codec_errors() {
        let codec = codec();
        assert!(matches!(codec.marshal(1, "plain", b"{}"), Err(Error::Codec(_))));
        assert!(matches!(codec.marshal(9, "none", b"{}"), Err(Error::Codec(_))));
        assert!(matches!(
            codec.unmarshal("container.missing", "AAAA"),
            Err(Error::Codec(_))
        ));
        assert!(matches!(codec.unmarshal("unknown", ""), Err(Error::Codec(_))));
    }

    #[test]
    fn test_unmarshal_rejects_garbage() {
        let codec = codec();
        assert!(matches!(
            codec.unmarshal("container.create", "not base64!"),
            Err(Error::Codec(_))
        ));
        assert!(matches!(
            codec.unmarshal("container.create", &BASE64.encode(b"\x01")),
            Err(Error::Codec(_))
        ));
    }
}
