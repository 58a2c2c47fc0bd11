//! Core types for twinlink.
//!
//! Wire envelopes of both protocols, the mapping catalog, the binary codec
//! boundary and connector settings. Everything else in the workspace builds
//! on these.

pub mod catalog;
pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;

pub use catalog::{
    FieldMappingTable, MappingCatalog, MappingProperties, MappingRule, Serialization,
    TelemetryRuleRef, TelemetryTypeMappings,
};
pub use codec::{Codec, SchemaCodec};
pub use config::{split_list, ConnectorSettings};
pub use envelope::{CloudMessage, DittoEnvelope, Headers, Payload, TelemetryMessage};
pub use error::{Error, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
