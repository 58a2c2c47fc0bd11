//! Mapped commands: cloud command to Ditto live message.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;
use twinlink_core::catalog::{MappingCatalog, MappingRule};
use twinlink_core::codec::Codec;
use twinlink_core::envelope::{DittoEnvelope, Headers, CONTENT_TYPE_JSON};
use twinlink_core::error::{Error, Result};
use twinlink_mapping::RuleMatcher;

use crate::message::{CommandRequest, RemoteConnectionInfo, Routed, TransportMessage};
use crate::topic::{command_topic, live_message_topic};

pub const THINGS_COMMAND_HANDLER_NAME: &str = "command_things_handler";

const KEY_CORRELATION_ID: &str = "correlationId";
const KEY_PAYLOAD: &str = "payload";

/// Maps cloud commands through the catalog's command rules.
pub struct ThingsCommandHandler {
    connection: RemoteConnectionInfo,
    matcher: RuleMatcher,
    codec: Arc<dyn Codec>,
}

impl ThingsCommandHandler {
    pub fn new(connection: RemoteConnectionInfo, catalog: Arc<MappingCatalog>, codec: Arc<dyn Codec>) -> Self {
        Self {
            connection,
            matcher: RuleMatcher::new(catalog),
            codec,
        }
    }

    pub fn name(&self) -> &'static str {
        THINGS_COMMAND_HANDLER_NAME
    }

    pub fn handle(&self, request: &CommandRequest) -> Result<Routed> {
        let command = &request.command;
        let rule = self.matcher.match_command(&command.command_name)?;
        let props = &rule.mapping_properties;
        let RemoteConnectionInfo { device_id, hub_name } = &self.connection;

        let value = self.build_value(request, rule)?;

        let envelope = DittoEnvelope {
            topic: Some(live_message_topic(hub_name, device_id, &props.thing, &props.action)),
            headers: Headers::new()
                .with_content_type(CONTENT_TYPE_JSON)
                .with_correlation_id(command.correlation_id.clone()),
            path: props.path.clone(),
            value,
        };

        let payload = envelope.to_vec()?;

        let outgoing_topic = command_topic(
            hub_name,
            device_id,
            &props.thing,
            &command.correlation_id,
            &props.action,
        );
        debug!(
            command = %command.command_name,
            outgoing_topic = %outgoing_topic,
            "Mapped cloud command"
        );
        Ok(Routed::Forward(
            TransportMessage::new(payload).with_outgoing_topic(outgoing_topic),
        ))
    }

    fn build_value(&self, request: &CommandRequest, rule: &MappingRule) -> Result<Value> {
        let command = &request.command;

        if rule.descriptor().is_none() {
            let wrapped = wrap_payload(rule.mapping_properties.value_key(), &command.payload);
            if rule.retain_correlation_id {
                let mut retained = Map::new();
                retained.insert(
                    KEY_CORRELATION_ID.to_string(),
                    Value::String(command.correlation_id.clone()),
                );
                retained.insert(KEY_PAYLOAD.to_string(), wrapped);
                return Ok(Value::Object(retained));
            }
            return Ok(wrapped);
        }

        let encoded = match &command.payload {
            Value::String(s) => s.as_str(),
            Value::Null => "",
            other => {
                return Err(Error::Codec(format!(
                    "command '{}' expects an encoded string payload, got {}",
                    command.command_name, other
                )))
            }
        };

        let bytes = self.codec.unmarshal(&command.command_name, encoded)?;
        let object: Map<String, Value> = serde_json::from_slice(&bytes).map_err(|e| {
            Error::Codec(format!(
                "decoded payload of command '{}' is not an object: {}",
                command.command_name, e
            ))
        })?;
        Ok(Value::Object(object))
    }
}

/// Wrap a raw payload under `value_key`, if set.
///
/// A string payload holding a JSON object is wrapped as that object.
fn wrap_payload(value_key: Option<&str>, payload: &Value) -> Value {
    let Some(key) = value_key else {
        return payload.clone();
    };

    let inner = match payload {
        Value::String(s) => match serde_json::from_str::<Map<String, Value>>(s) {
            Ok(object) => Value::Object(object),
            Err(_) => payload.clone(),
        },
        other => other.clone(),
    };

    let mut wrapped = Map::new();
    wrapped.insert(key.to_string(), inner);
    Value::Object(wrapped)
}
