//! Allow-list handlers that forward messages without mapping them.

use tracing::debug;
use twinlink_core::error::{Error, Result};

use crate::message::{CommandRequest, RemoteConnectionInfo, Routed, TransportMessage};
use crate::topic::{matches_filter, telemetry_topic};

pub const TELEMETRY_PASSTHROUGH_HANDLER_NAME: &str = "telemetry_passthrough_handler";
pub const COMMAND_PASSTHROUGH_HANDLER_NAME: &str = "command_passthrough_handler";

/// Forwards local messages whose topic matches one of the configured filters.
#[derive(Debug, Clone)]
pub struct PassthroughTelemetryHandler {
    connection: RemoteConnectionInfo,
    topics: Vec<String>,
}

impl PassthroughTelemetryHandler {
    pub fn new(connection: RemoteConnectionInfo, topics: Vec<String>) -> Self {
        Self { connection, topics }
    }

    pub fn name(&self) -> &'static str {
        TELEMETRY_PASSTHROUGH_HANDLER_NAME
    }

    /// Subscription filters, comma separated.
    pub fn topics(&self) -> String {
        self.topics.join(",")
    }

    pub fn handle(&self, msg: &TransportMessage) -> Result<Routed> {
        let source = msg.source_topic().unwrap_or_default();
        if !self.topics.iter().any(|filter| matches_filter(filter, source)) {
            return Err(Error::NoMappingFound(format!(
                "device topic '{}' is not a passthrough topic",
                source
            )));
        }

        let outgoing_topic = telemetry_topic(&self.connection.device_id, &msg.id);
        debug!(source, outgoing_topic = %outgoing_topic, "Passing telemetry through");
        Ok(Routed::Forward(msg.clone().with_outgoing_topic(outgoing_topic)))
    }
}

/// Forwards cloud commands whose name is on the allow-list.
#[derive(Debug, Clone)]
pub struct PassthroughCommandHandler {
    command_names: Vec<String>,
}

impl PassthroughCommandHandler {
    pub fn new(command_names: Vec<String>) -> Self {
        Self { command_names }
    }

    pub fn name(&self) -> &'static str {
        COMMAND_PASSTHROUGH_HANDLER_NAME
    }

    pub fn handle(&self, request: &CommandRequest) -> Result<Routed> {
        let command = &request.command;
        if !self.command_names.iter().any(|n| *n == command.command_name) {
            return Err(Error::NoMappingFound(format!(
                "cloud command name '{}' is not supported",
                command.command_name
            )));
        }

        let outgoing_topic = format!("{}/{}", command.application_id, command.command_name);
        debug!(command = %command.command_name, outgoing_topic = %outgoing_topic, "Passing command through");
        Ok(Routed::Forward(
            request.message.clone().with_outgoing_topic(outgoing_topic),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(name: &str) -> CommandRequest {
        let payload = format!(r#"{{"appId":"datapoints","cmdName":"{}","cId":"c-1","p":{{"x":1}}}}"#, name);
        CommandRequest::parse(TransportMessage::new(payload)).unwrap()
    }

    #[test]
    fn test_command_on_allow_list() {
        let h = PassthroughCommandHandler::new(vec!["testVal".into(), "testCommand".into()]);
        let req = command("testCommand");

        let msg = h.handle(&req).unwrap().into_message().unwrap();
        assert_eq!(msg.outgoing_topic(), Some("datapoints/testCommand"));
        assert_eq!(msg.payload, req.message.payload);
        assert_eq!(msg.id, req.message.id);
    }

    #[test]
    fn test_command_not_on_allow_list() {
        let h = PassthroughCommandHandler::new(vec!["testVal".into()]);
        let err = h.handle(&command("testCommand")).unwrap_err();
        assert!(err.is_unsupported());
        assert!(err.to_string().contains("cloud command name 'testCommand' is not supported"));
    }

    #[test]
    fn test_empty_allow_list_rejects_everything() {
        let h = PassthroughCommandHandler::new(Vec::new());
        assert!(h.handle(&command("")).is_err());
    }

    #[test]
    fn test_telemetry_matching_topic() {
        let h = PassthroughTelemetryHandler::new(
            RemoteConnectionInfo::new("dummy-device", "dummy-hub"),
            vec!["vehicle/+/speed".into(), "raw/#".into()],
        );
        assert_eq!(h.topics(), "vehicle/+/speed,raw/#");

        let msg = TransportMessage::with_id("m-1", b"opaque".to_vec()).with_source_topic("raw/a/b");
        let out = h.handle(&msg).unwrap().into_message().unwrap();
        assert_eq!(out.payload, b"opaque");
        assert_eq!(
            out.outgoing_topic(),
            Some("devices/dummy-device/messages/events/$.mid=m-1")
        );
    }

    #[test]
    fn test_telemetry_non_matching_topic() {
        let h = PassthroughTelemetryHandler::new(
            RemoteConnectionInfo::new("dummy-device", "dummy-hub"),
            vec!["vehicle/+/speed".into()],
        );

        let msg = TransportMessage::new(b"{}".to_vec()).with_source_topic("vehicle/speed");
        assert!(h.handle(&msg).unwrap_err().is_unsupported());

        let msg = TransportMessage::new(b"{}".to_vec());
        assert!(h.handle(&msg).unwrap_err().is_unsupported());
    }
}
