//! Error types shared by the mapping engine and the routing pipelines.

use thiserror::Error;

/// Result type for connector operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort the processing of a single message.
///
/// None of these are retried by the engine. A message suppressed by a
/// field mapping is not an error and never shows up here.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed JSON in an envelope, a value or a payload.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// No rule, allow-list entry or command mapping matched the message.
    #[error("No mapping found: {0}")]
    NoMappingFound(String),

    /// The binary codec rejected the message.
    #[error("Codec error: {0}")]
    Codec(String),

    /// The outbound message could not be produced.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid mapper configuration or settings.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("Other: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether the error only means "this handler does not handle the message".
    ///
    /// The router moves on to the next handler for these.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::NoMappingFound(_))
    }

    /// Short, stable name of the error kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Deserialization(_) => "deserialization",
            Error::NoMappingFound(_) => "no_mapping_found",
            Error::Codec(_) => "codec",
            Error::Serialization(_) => "serialization",
            Error::Configuration(_) => "configuration",
            Error::Io(_) => "io",
            Error::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_no_mapping_is_unsupported() {
        assert!(Error::NoMappingFound("x".into()).is_unsupported());
        assert!(!Error::Codec("x".into()).is_unsupported());
        assert!(!Error::Deserialization("x".into()).is_unsupported());
    }

    #[test]
    fn test_error_display() {
        let err = Error::NoMappingFound("cloud command name 'reboot' is not supported".into());
        assert_eq!(
            err.to_string(),
            "No mapping found: cloud command name 'reboot' is not supported"
        );
        assert_eq!(err.kind(), "no_mapping_found");
    }
}
