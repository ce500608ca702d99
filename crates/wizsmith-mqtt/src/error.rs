//! Error types for the MQTT crate.

use thiserror::Error;

/// Result type for MQTT operations.
pub type Result<T> = std::result::Result<T, MqttError>;

/// MQTT error types.
#[derive(Debug, Error)]
pub enum MqttError {
    /// The client rejected the request (queue full, disconnected).
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// The in-process backend has no receiver anymore.
    #[error("publish channel closed")]
    ChannelClosed,
}
