//! Telemetry and command pipelines.
//!
//! A [`Router`] owns two ordered handler lists. Telemetry handlers turn
//! local Ditto messages into cloud telemetry, command handlers turn cloud
//! commands into Ditto live messages. Passthrough handlers forward
//! allow-listed messages unchanged.
//!
//! ```ignore
//! let router = Router::from_settings(&settings, Some(catalog));
//! match router.route_telemetry(TransportMessage::new(payload))? {
//!     Routed::Forward(msg) => publish(msg.outgoing_topic(), msg.payload),
//!     Routed::Dropped => {}
//! }
//! ```

pub mod handlers;
pub mod message;
pub mod router;
pub mod topic;

pub use handlers::{
    CommandHandler, PassthroughCommandHandler, PassthroughTelemetryHandler, TelemetryHandler,
    ThingsCommandHandler, ThingsTelemetryHandler,
};
pub use message::{CommandRequest, RemoteConnectionInfo, Routed, RoutingContext, TransportMessage};
pub use router::Router;
