//! Error types for the CAN / Modbus bridge.
//!
//! A single error enum covers the whole pipeline: schema parsing, mapping
//! resolution, per-frame translation and transport I/O. Variants carry
//! human-readable detail strings; callers that need to distinguish outcomes
//! match on the variant, not the message.

use thiserror::Error;

/// Unified error type for the bridge.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// A schema document was structurally unusable (unreadable JSON, missing
    /// top-level array, or no usable entries at all).
    #[error("Schema error: {0}")]
    Schema(String),

    /// The mapping document could not be resolved against the loaded schemas.
    /// Mapping resolution is all-or-nothing: any bad rule fails the document.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// A single translation call failed. The configuration stays valid;
    /// only this frame or register block is affected.
    #[error("Translation error: {0}")]
    Translation(String),

    /// Configuration file problem (missing file, bad path, unreadable).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level failure on the CAN or serial link.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation requires an open link.
    #[error("Not connected")]
    NotConnected,

    /// Operation not supported by this build or link.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Invariant violation inside the bridge itself.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Create a schema error.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Create a mapping error.
    pub fn mapping(msg: impl Into<String>) -> Self {
        Self::Mapping(msg.into())
    }

    /// Create a translation error.
    pub fn translation(msg: impl Into<String>) -> Self {
        Self::Translation(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Check whether the error came from a configuration document rather
    /// than runtime I/O.
    pub const fn is_config_stage(&self) -> bool {
        matches!(self, Self::Schema(_) | Self::Mapping(_) | Self::Config(_))
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::schema("messages is not an array");
        assert_eq!(err.to_string(), "Schema error: messages is not an array");

        assert_eq!(BridgeError::NotConnected.to_string(), "Not connected");
    }

    #[test]
    fn test_config_stage_classification() {
        assert!(BridgeError::schema("x").is_config_stage());
        assert!(BridgeError::mapping("x").is_config_stage());
        assert!(!BridgeError::translation("x").is_config_stage());
        assert!(!BridgeError::NotConnected.is_config_stage());
    }
}
