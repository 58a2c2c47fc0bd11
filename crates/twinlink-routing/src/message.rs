//! Transport-facing message types.

use twinlink_core::config::ConnectorSettings;
use twinlink_core::envelope::CloudMessage;
use twinlink_core::error::Result;
use uuid::Uuid;

/// Per-message routing state shared with the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingContext {
    /// Topic the message was received on, if the transport knows it.
    pub source_topic: Option<String>,
    /// Topic the transport publishes the routed message to.
    pub outgoing_topic: Option<String>,
}

/// A message as delivered by, or handed back to, the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    pub id: String,
    pub payload: Vec<u8>,
    pub context: RoutingContext,
}

impl TransportMessage {
    /// Create a message with a fresh id.
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), payload)
    }

    pub fn with_id(id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            context: RoutingContext::default(),
        }
    }

    pub fn with_source_topic(mut self, topic: impl Into<String>) -> Self {
        self.context.source_topic = Some(topic.into());
        self
    }

    pub fn with_outgoing_topic(mut self, topic: impl Into<String>) -> Self {
        self.context.outgoing_topic = Some(topic.into());
        self
    }

    pub fn source_topic(&self) -> Option<&str> {
        self.context.source_topic.as_deref()
    }

    pub fn outgoing_topic(&self) -> Option<&str> {
        self.context.outgoing_topic.as_deref()
    }
}

/// Outcome of routing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Publish this message on its outgoing topic.
    Forward(TransportMessage),
    /// Suppressed by a field mapping. Not an error.
    Dropped,
}

impl Routed {
    pub fn is_dropped(&self) -> bool {
        matches!(self, Routed::Dropped)
    }

    pub fn into_message(self) -> Option<TransportMessage> {
        match self {
            Routed::Forward(msg) => Some(msg),
            Routed::Dropped => None,
        }
    }
}

/// Identity of the device connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteConnectionInfo {
    pub device_id: String,
    pub hub_name: String,
}

impl RemoteConnectionInfo {
    pub fn new(device_id: impl Into<String>, hub_name: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            hub_name: hub_name.into(),
        }
    }

    pub fn from_settings(settings: &ConnectorSettings) -> Self {
        Self::new(settings.device_id.clone(), settings.hub_name.clone())
    }
}

/// An inbound cloud command, parsed once and shared by all command handlers.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub message: TransportMessage,
    pub command: CloudMessage,
}

impl CommandRequest {
    pub fn parse(message: TransportMessage) -> Result<Self> {
        let command = CloudMessage::from_slice(&message.payload)?;
        Ok(Self { message, command })
    }

    pub fn command_name(&self) -> &str {
        &self.command.command_name
    }
}
