// Typed errors with thiserror. Persistence and forwarding failures are recovered
// inside the engine; only config and browser setup errors reach JS.

use thiserror::Error;

/// Telemetry error types.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Persistence failed for key {key}: {message}")]
    Persistence { key: String, message: String },

    #[error("Forwarding of {event} failed: {message}")]
    Forwarding { event: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Browser environment unavailable: {0}")]
    Environment(String),
}

impl From<serde_json::Error> for TelemetryError {
    fn from(err: serde_json::Error) -> Self {
        TelemetryError::Serialization(err.to_string())
    }
}
