//! Message handlers.
//!
//! Handlers are closed enums rather than trait objects: the set of
//! strategies is fixed and the router tries them in order.

pub mod command;
pub mod passthrough;
pub mod telemetry;

use std::borrow::Cow;

use twinlink_core::error::Result;

use crate::message::{CommandRequest, Routed, TransportMessage};

pub use command::ThingsCommandHandler;
pub use passthrough::{PassthroughCommandHandler, PassthroughTelemetryHandler};
pub use telemetry::ThingsTelemetryHandler;

/// Handlers for local (device to cloud) messages.
pub enum TelemetryHandler {
    Passthrough(PassthroughTelemetryHandler),
    Things(ThingsTelemetryHandler),
}

impl TelemetryHandler {
    pub fn name(&self) -> &'static str {
        match self {
            TelemetryHandler::Passthrough(h) => h.name(),
            TelemetryHandler::Things(h) => h.name(),
        }
    }

    /// Local subscription filters, comma separated.
    pub fn topics(&self) -> Cow<'static, str> {
        match self {
            TelemetryHandler::Passthrough(h) => Cow::Owned(h.topics()),
            TelemetryHandler::Things(h) => Cow::Borrowed(h.topics()),
        }
    }

    pub fn handle(&self, msg: &TransportMessage) -> Result<Routed> {
        match self {
            TelemetryHandler::Passthrough(h) => h.handle(msg),
            TelemetryHandler::Things(h) => h.handle(msg),
        }
    }
}

impl From<PassthroughTelemetryHandler> for TelemetryHandler {
    fn from(h: PassthroughTelemetryHandler) -> Self {
        TelemetryHandler::Passthrough(h)
    }
}

impl From<ThingsTelemetryHandler> for TelemetryHandler {
    fn from(h: ThingsTelemetryHandler) -> Self {
        TelemetryHandler::Things(h)
    }
}

/// Handlers for cloud commands.
pub enum CommandHandler {
    Passthrough(PassthroughCommandHandler),
    Things(ThingsCommandHandler),
}

impl CommandHandler {
    pub fn name(&self) -> &'static str {
        match self {
            CommandHandler::Passthrough(h) => h.name(),
            CommandHandler::Things(h) => h.name(),
        }
    }

    pub fn handle(&self, request: &CommandRequest) -> Result<Routed> {
        match self {
            CommandHandler::Passthrough(h) => h.handle(request),
            CommandHandler::Things(h) => h.handle(request),
        }
    }
}

impl From<PassthroughCommandHandler> for CommandHandler {
    fn from(h: PassthroughCommandHandler) -> Self {
        CommandHandler::Passthrough(h)
    }
}

impl From<ThingsCommandHandler> for CommandHandler {
    fn from(h: ThingsCommandHandler) -> Self {
        CommandHandler::Things(h)
    }
}
