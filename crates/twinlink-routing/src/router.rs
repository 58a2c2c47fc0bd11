//! Ordered, first-match-wins dispatch over the handlers.

use std::sync::Arc;

use tracing::{debug, warn};
use twinlink_core::catalog::MappingCatalog;
use twinlink_core::codec::{Codec, SchemaCodec};
use twinlink_core::config::ConnectorSettings;
use twinlink_core::error::{Error, Result};
use twinlink_mapping::CounterStore;

use crate::handlers::{
    CommandHandler, PassthroughCommandHandler, PassthroughTelemetryHandler, TelemetryHandler,
    ThingsCommandHandler, ThingsTelemetryHandler,
};
use crate::message::{CommandRequest, RemoteConnectionInfo, Routed, TransportMessage};

/// Routes messages through ordered handler lists.
///
/// Handlers are tried in order. A `NoMappingFound` error moves on to the
/// next handler, any other error aborts the message.
pub struct Router {
    telemetry: Vec<TelemetryHandler>,
    commands: Vec<CommandHandler>,
}

impl Router {
    pub fn new(telemetry: Vec<TelemetryHandler>, commands: Vec<CommandHandler>) -> Self {
        Self { telemetry, commands }
    }

    /// Passthrough handlers first, then the mapped handlers when a catalog is loaded.
    pub fn from_settings(settings: &ConnectorSettings, catalog: Option<Arc<MappingCatalog>>) -> Self {
        let connection = RemoteConnectionInfo::from_settings(settings);

        let mut telemetry: Vec<TelemetryHandler> = vec![PassthroughTelemetryHandler::new(
            connection.clone(),
            settings.passthrough_device_topics.clone(),
        )
        .into()];
        let mut commands: Vec<CommandHandler> =
            vec![PassthroughCommandHandler::new(settings.passthrough_command_names.clone()).into()];

        if let Some(catalog) = catalog {
            let codec: Arc<dyn Codec> = Arc::new(SchemaCodec::new(catalog.clone()));
            let counters = Arc::new(CounterStore::new());

            telemetry.push(
                ThingsTelemetryHandler::new(connection.clone(), catalog.clone(), codec.clone(), counters)
                    .into(),
            );
            commands.push(ThingsCommandHandler::new(connection, catalog, codec).into());
        }

        Self::new(telemetry, commands)
    }

    pub fn telemetry_handlers(&self) -> &[TelemetryHandler] {
        &self.telemetry
    }

    pub fn command_handlers(&self) -> &[CommandHandler] {
        &self.commands
    }

    /// Route a local message towards the cloud.
    pub fn route_telemetry(&self, msg: TransportMessage) -> Result<Routed> {
        let mut last_error = None;

        for handler in &self.telemetry {
            match handler.handle(&msg) {
                Ok(routed) => {
                    debug!(handler = handler.name(), message_id = %msg.id, "Telemetry routed");
                    return Ok(routed);
                }
                Err(e) if e.is_unsupported() => {
                    debug!(handler = handler.name(), error = %e, "Telemetry handler declined");
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(handler = handler.name(), kind = e.kind(), error = %e, "Telemetry message aborted");
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::NoMappingFound("no telemetry handler configured".to_string())
        }))
    }

    /// Route a cloud command towards the device.
    pub fn route_command(&self, msg: TransportMessage) -> Result<Routed> {
        let request = CommandRequest::parse(msg).inspect_err(|e| {
            warn!(kind = e.kind(), error = %e, "Cloud command aborted");
        })?;
        let mut last_error = None;

        for handler in &self.commands {
            match handler.handle(&request) {
                Ok(routed) => {
                    debug!(handler = handler.name(), command = request.command_name(), "Command routed");
                    return Ok(routed);
                }
                Err(e) if e.is_unsupported() => {
                    debug!(handler = handler.name(), error = %e, "Command handler declined");
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(
                        handler = handler.name(),
                        command = request.command_name(),
                        kind = e.kind(),
                        error = %e,
                        "Cloud command aborted"
                    );
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::NoMappingFound("no command handler configured".to_string())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twinlink_core::catalog::MappingRule;

    fn settings() -> ConnectorSettings {
        ConnectorSettings {
            device_id: "dummy-device".into(),
            hub_name: "dummy-hub".into(),
            passthrough_command_names: vec!["testCommand".into()],
            ..ConnectorSettings::default()
        }
    }

    #[test]
    fn test_from_settings_without_catalog() {
        let router = Router::from_settings(&settings(), None);
        let names: Vec<&str> = router.command_handlers().iter().map(|h| h.name()).collect();
        assert_eq!(names, vec!["command_passthrough_handler"]);
        assert_eq!(router.telemetry_handlers().len(), 1);
    }

    #[test]
    fn test_from_settings_order() {
        let catalog = MappingCatalog::new().with_command_rule("testCommand", MappingRule::new().with_action("x"));
        let router = Router::from_settings(&settings(), Some(Arc::new(catalog)));

        let names: Vec<&str> = router.telemetry_handlers().iter().map(|h| h.name()).collect();
        assert_eq!(names, vec!["telemetry_passthrough_handler", "things_telemetry_handler"]);
        let names: Vec<&str> = router.command_handlers().iter().map(|h| h.name()).collect();
        assert_eq!(names, vec!["command_passthrough_handler", "command_things_handler"]);

        // passthrough wins when both could handle the command
        let msg = TransportMessage::new(br#"{"appId":"app1","cmdName":"testCommand"}"#.to_vec());
        let out = router.route_command(msg).unwrap().into_message().unwrap();
        assert_eq!(out.outgoing_topic(), Some("app1/testCommand"));
    }

    #[test]
    fn test_empty_router() {
        let router = Router::new(Vec::new(), Vec::new());
        let err = router.route_telemetry(TransportMessage::new(b"{}".to_vec())).unwrap_err();
        assert!(err.is_unsupported());
        let err = router
            .route_command(TransportMessage::new(br#"{"cmdName":"x"}"#.to_vec()))
            .unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_malformed_command_aborts() {
        let router = Router::from_settings(&settings(), None);
        let err = router.route_command(TransportMessage::new(b"not json".to_vec())).unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }
}
