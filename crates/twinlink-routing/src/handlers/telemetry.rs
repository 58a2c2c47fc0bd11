//! Mapped telemetry: Ditto event to cloud telemetry message.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};
use twinlink_core::catalog::{MappingCatalog, MappingRule, Serialization};
use twinlink_core::codec::Codec;
use twinlink_core::envelope::{DittoEnvelope, Payload, TelemetryMessage};
use twinlink_core::error::{Error, Result};
use twinlink_mapping::{CounterStore, Interpretation, RuleMatcher, TemplateInterpreter};

use crate::message::{RemoteConnectionInfo, Routed, TransportMessage};
use crate::topic::{telemetry_topic, TELEMETRY_LOCAL_TOPICS};

pub const THINGS_TELEMETRY_HANDLER_NAME: &str = "things_telemetry_handler";

const KEY_CORRELATION_ID: &str = "correlationId";

/// Maps Ditto events through the catalog's telemetry rules.
pub struct ThingsTelemetryHandler {
    connection: RemoteConnectionInfo,
    matcher: RuleMatcher,
    interpreter: TemplateInterpreter,
    codec: Arc<dyn Codec>,
}

impl ThingsTelemetryHandler {
    pub fn new(
        connection: RemoteConnectionInfo,
        catalog: Arc<MappingCatalog>,
        codec: Arc<dyn Codec>,
        counters: Arc<CounterStore>,
    ) -> Self {
        Self {
            connection,
            matcher: RuleMatcher::new(catalog),
            interpreter: TemplateInterpreter::new(counters),
            codec,
        }
    }

    pub fn name(&self) -> &'static str {
        THINGS_TELEMETRY_HANDLER_NAME
    }

    pub fn topics(&self) -> &'static str {
        TELEMETRY_LOCAL_TOPICS
    }

    pub fn handle(&self, msg: &TransportMessage) -> Result<Routed> {
        let envelope = DittoEnvelope::from_slice(&msg.payload)?;
        let Some(topic) = envelope.topic.as_deref() else {
            return Err(Error::Deserialization(
                "missing Ditto topic in message".to_string(),
            ));
        };

        let entry = self.matcher.match_telemetry(Some(topic), &envelope.path)?;
        let rule = entry.rule;

        let (output, mapped_correlation_id) = match self.map_value(rule, &envelope)? {
            Some(mapped) => mapped,
            None => {
                info!(
                    topic,
                    path = %envelope.path,
                    message_sub_type = entry.message_sub_type,
                    "Message dropped by field mapping"
                );
                return Ok(Routed::Dropped);
            }
        };

        let payload = self.encode_payload(entry.message_type, entry.message_sub_type, rule, output)?;

        let correlation_id = mapped_correlation_id
            .or_else(|| envelope.headers.correlation_id().map(String::from))
            .unwrap_or_default();

        let telemetry = TelemetryMessage::new(entry.message_type, entry.message_sub_type, payload)
            .with_correlation_id(correlation_id);

        let outgoing = TransportMessage::new(telemetry.to_vec()?);
        let outgoing_topic = telemetry_topic(&self.connection.device_id, &outgoing.id);
        debug!(
            topic,
            message_type = entry.message_type,
            message_sub_type = entry.message_sub_type,
            outgoing_topic = %outgoing_topic,
            "Mapped telemetry message"
        );
        Ok(Routed::Forward(outgoing.with_outgoing_topic(outgoing_topic)))
    }

    /// Apply the rule's template. `None` means the message is dropped.
    ///
    /// Also returns the correlation id carried by the value, mapped output
    /// first, then the source.
    fn map_value(&self, rule: &MappingRule, envelope: &DittoEnvelope) -> Result<Option<(Value, Option<String>)>> {
        if rule.value_template.is_none() {
            return Ok(Some((envelope.value.clone(), None)));
        }

        let Value::Object(source) = &envelope.value else {
            return Err(Error::Deserialization(format!(
                "cannot deserialize Ditto value '{}' on topic '{}'",
                envelope.value,
                envelope.topic_str()
            )));
        };

        let mapped = match self.interpreter.interpret(rule, source) {
            Interpretation::Mapped(mapped) => mapped,
            Interpretation::Dropped => return Ok(None),
        };

        let correlation_id = correlation_id_of(&mapped).or_else(|| correlation_id_of(source));
        Ok(Some((Value::Object(mapped), correlation_id)))
    }

    fn encode_payload(&self, message_type: i64, message_sub_type: &str, rule: &MappingRule, output: Value) -> Result<Payload> {
        if rule.descriptor().is_some() {
            let json = serde_json::to_vec(&output)
                .map_err(|e| Error::Serialization(format!("cannot serialize telemetry value: {}", e)))?;
            let bytes = self.codec.marshal(message_type, message_sub_type, &json)?;
            return Ok(Payload::Binary(bytes));
        }

        match rule.serialization {
            Some(Serialization::JsonString) => serde_json::to_string(&output)
                .map(Payload::Text)
                .map_err(|e| Error::Serialization(format!("cannot serialize telemetry value: {}", e))),
            None => Ok(Payload::Json(output)),
        }
    }
}

fn correlation_id_of(value: &Map<String, Value>) -> Option<String> {
    value
        .get(KEY_CORRELATION_ID)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use twinlink_core::codec::SchemaCodec;

    fn handler(catalog: MappingCatalog) -> ThingsTelemetryHandler {
        let catalog = Arc::new(catalog);
        ThingsTelemetryHandler::new(
            RemoteConnectionInfo::new("dummy-device", "dummy-hub"),
            catalog.clone(),
            Arc::new(SchemaCodec::new(catalog)),
            Arc::new(CounterStore::new()),
        )
    }

    fn ditto(value: Value) -> TransportMessage {
        TransportMessage::new(
            json!({
                "topic": "azure.edge/dummy-hub:dummy-device:edge:vehicle/things/twin/events/modified",
                "headers": {"correlation-id": "header-cid"},
                "path": "/features/Vehicle/properties",
                "value": value
            })
            .to_string(),
        )
    }

    fn telemetry(routed: Routed) -> (TelemetryMessage, String) {
        let msg = routed.into_message().unwrap();
        let topic = msg.outgoing_topic().unwrap().to_string();
        (TelemetryMessage::from_slice(&msg.payload).unwrap(), topic)
    }

    #[test]
    fn test_name_and_topics() {
        let h = handler(MappingCatalog::new());
        assert_eq!(h.name(), "things_telemetry_handler");
        assert_eq!(h.topics(), "event/#,e/#,telemetry/#,t/#");
    }

    #[test]
    fn test_raw_value_without_template() {
        let h = handler(MappingCatalog::new().with_telemetry_rule(
            3,
            "vehicle",
            MappingRule::new().with_path("/features/Vehicle"),
        ));

        let (msg, topic) = telemetry(h.handle(&ditto(json!({"speed": 42}))).unwrap());
        assert_eq!(msg.message_type, 3);
        assert_eq!(msg.message_sub_type, "vehicle");
        assert_eq!(msg.payload, Payload::Json(json!({"speed": 42})));
        assert_eq!(msg.correlation_id, "header-cid");
        assert!(topic.starts_with("devices/dummy-device/messages/events/$.mid="));
    }

    #[test]
    fn test_mapped_correlation_id_takes_precedence() {
        let h = handler(MappingCatalog::new().with_telemetry_rule(
            3,
            "vehicle",
            MappingRule::new()
                .with_path("/features/Vehicle")
                .with_template(json!({"correlationId": "$meta.id", "speed": "$speed"})),
        ));

        let (msg, _) = telemetry(h.handle(&ditto(json!({"speed": 1, "meta": {"id": "mapped-cid"}}))).unwrap());
        assert_eq!(msg.correlation_id, "mapped-cid");
    }

    #[test]
    fn test_source_correlation_id_before_header() {
        let h = handler(MappingCatalog::new().with_telemetry_rule(
            3,
            "vehicle",
            MappingRule::new()
                .with_path("/features/Vehicle")
                .with_template(json!({"speed": "$speed"})),
        ));

        let (msg, _) = telemetry(h.handle(&ditto(json!({"speed": 1, "correlationId": "value-cid"}))).unwrap());
        assert_eq!(msg.correlation_id, "value-cid");
        assert_eq!(msg.payload, Payload::Json(json!({"speed": 1})));
    }

    #[test]
    fn test_json_string_serialization() {
        let h = handler(MappingCatalog::new().with_telemetry_rule(
            3,
            "vehicle",
            MappingRule::new()
                .with_path("/features/Vehicle")
                .with_serialization(Serialization::JsonString),
        ));

        let (msg, _) = telemetry(h.handle(&ditto(json!({"speed": 42}))).unwrap());
        assert_eq!(msg.payload, Payload::Text(r#"{"speed":42}"#.to_string()));
    }

    #[test]
    fn test_drop_returns_dropped() {
        let h = handler(MappingCatalog::new().with_telemetry_rule(
            3,
            "vehicle",
            MappingRule::new()
                .with_path("/features/Vehicle")
                .with_template(json!({"gear": "$gear"}))
                .with_field_mapping("$gear", json!({"P": "_"})),
        ));

        assert_eq!(h.handle(&ditto(json!({"gear": "P"}))).unwrap(), Routed::Dropped);
        assert!(!h.handle(&ditto(json!({"gear": "D"}))).unwrap().is_dropped());
    }

    #[test]
    fn test_non_object_value_with_template() {
        let h = handler(MappingCatalog::new().with_telemetry_rule(
            3,
            "vehicle",
            MappingRule::new()
                .with_path("/features/Vehicle")
                .with_template(json!({"speed": "$speed"})),
        ));

        let err = h.handle(&ditto(json!(42))).unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }

    #[test]
    fn test_missing_topic_is_deserialization_error() {
        let h = handler(MappingCatalog::new());
        let msg = TransportMessage::new(br#"{"path": "/features/x", "value": {}}"#.to_vec());
        assert!(matches!(h.handle(&msg), Err(Error::Deserialization(_))));
    }

    #[test]
    fn test_unmatched_is_no_mapping_found() {
        let h = handler(MappingCatalog::new());
        assert!(h.handle(&ditto(json!({}))).unwrap_err().is_unsupported());
    }
}
