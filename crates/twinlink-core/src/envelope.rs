//! Wire envelopes on both sides of the connector.
//!
//! - [`DittoEnvelope`]: the local digital twin protocol message
//! - [`CloudMessage`]: cloud-to-device command envelope
//! - [`TelemetryMessage`]: device-to-cloud telemetry envelope
//!
//! Field names on the wire are short and stable; see the serde renames.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Version of the cloud envelope layout.
pub const ENVELOPE_VERSION: &str = "2.0";

/// Version of the payload carried inside the cloud envelope.
pub const PAYLOAD_VERSION: &str = "1.0";

/// Content type of every Ditto message produced by the connector.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Current wall-clock time as Unix milliseconds.
pub fn unix_timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Ditto protocol headers.
///
/// Header values are mostly strings, but Ditto also sends booleans
/// (`response-required`), so the raw JSON object is kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Map<String, Value>);

impl Headers {
    pub const CONTENT_TYPE: &'static str = "content-type";
    pub const CORRELATION_ID: &'static str = "correlation-id";
    pub const RESPONSE_REQUIRED: &'static str = "response-required";

    /// Create empty headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.0
            .insert(Self::CONTENT_TYPE.to_string(), Value::String(content_type.into()));
        self
    }

    /// Set the correlation id.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.0.insert(
            Self::CORRELATION_ID.to_string(),
            Value::String(correlation_id.into()),
        );
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get_str(Self::CONTENT_TYPE)
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.get_str(Self::CORRELATION_ID)
    }

    pub fn response_required(&self) -> bool {
        self.0
            .get(Self::RESPONSE_REQUIRED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

/// A Ditto protocol envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DittoEnvelope {
    /// Ditto topic, e.g. `tenant/device:thing/things/live/messages/created`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    #[serde(default)]
    pub headers: Headers,

    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub value: Value,
}

impl DittoEnvelope {
    /// Parse an envelope from a raw transport payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| Error::Deserialization(format!("cannot deserialize Ditto message: {}", e)))
    }

    /// Serialize the envelope for the transport.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::Serialization(format!("cannot serialize Ditto message: {}", e)))
    }

    /// Topic or an empty string, for diagnostics.
    pub fn topic_str(&self) -> &str {
        self.topic.as_deref().unwrap_or_default()
    }
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Cloud-to-device command envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudMessage {
    #[serde(rename = "cmdName", default, skip_serializing_if = "String::is_empty")]
    pub command_name: String,

    #[serde(rename = "appId", default, skip_serializing_if = "String::is_empty")]
    pub application_id: String,

    #[serde(rename = "cId", default, skip_serializing_if = "String::is_empty")]
    pub correlation_id: String,

    #[serde(rename = "ts", default, skip_serializing_if = "is_zero")]
    pub timestamp: i64,

    #[serde(rename = "eVer", default, skip_serializing_if = "String::is_empty")]
    pub envelope_version: String,

    #[serde(rename = "p", default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,

    #[serde(rename = "pVer", default, skip_serializing_if = "String::is_empty")]
    pub payload_version: String,
}

impl CloudMessage {
    /// Parse a command envelope from a raw transport payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| Error::Deserialization(format!("cannot deserialize cloud message: {}", e)))
    }
}

/// Payload of an outgoing telemetry message.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Structured JSON value.
    Json(Value),
    /// JSON text or any other string payload.
    Text(String),
    /// Codec output; carried as base64 text on the wire.
    Binary(Vec<u8>),
}

impl Payload {
    /// The payload as text, if it is a string on the wire.
    ///
    /// Binary payloads are returned base64 encoded.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Payload::Text(s) => Some(s.clone()),
            Payload::Binary(bytes) => Some(BASE64.encode(bytes)),
            Payload::Json(Value::String(s)) => Some(s.clone()),
            Payload::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Payload::Json(value) => value.serialize(serializer),
            Payload::Text(text) => serializer.serialize_str(text),
            Payload::Binary(bytes) => serializer.serialize_str(&BASE64.encode(bytes)),
        }
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // Binary payloads cannot be told apart from text once on the wire
        Ok(match Value::deserialize(deserializer)? {
            Value::String(text) => Payload::Text(text),
            other => Payload::Json(other),
        })
    }
}

/// Device-to-cloud telemetry envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    #[serde(rename = "mt")]
    pub message_type: i64,

    #[serde(rename = "mst")]
    pub message_sub_type: String,

    #[serde(rename = "appId", default)]
    pub application_id: String,

    #[serde(rename = "cId", default)]
    pub correlation_id: String,

    #[serde(rename = "ts")]
    pub timestamp: i64,

    #[serde(rename = "eVer")]
    pub envelope_version: String,

    #[serde(rename = "p")]
    pub payload: Payload,

    #[serde(rename = "pVer")]
    pub payload_version: String,
}

impl TelemetryMessage {
    /// Create a telemetry message stamped with the current time and the
    /// fixed protocol versions.
    pub fn new(message_type: i64, message_sub_type: impl Into<String>, payload: Payload) -> Self {
        Self {
            message_type,
            message_sub_type: message_sub_type.into(),
            application_id: String::new(),
            correlation_id: String::new(),
            timestamp: unix_timestamp_ms(),
            envelope_version: ENVELOPE_VERSION.to_string(),
            payload,
            payload_version: PAYLOAD_VERSION.to_string(),
        }
    }

    /// Set the correlation id.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Serialize the message for the transport.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::Serialization(format!("cannot serialize D2C message: {}", e)))
    }

    /// Parse a telemetry message from a raw payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| Error::Deserialization(format!("cannot deserialize D2C message: {}", e)))
    }
}
