//! # Error Types
//!
//! Custom error types for Groundlink using `thiserror`.

use thiserror::Error;

/// Main error type for Groundlink
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Link framing / codec errors
    #[error("Codec error: {0}")]
    Codec(String),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// Serial port could not be opened
    #[error("Serial port not available: {0}")]
    SerialPortNotFound(String),

    /// A pipeline stage rejected an event
    #[error("Stage error: {0}")]
    Stage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Legacy line received before its schema handshake
    #[error("No schema received yet, dropping line: {0}")]
    SchemaMissing(String),

    /// Legacy schema names a field we do not know
    #[error("Unknown schema entry: {0}")]
    UnknownSchemaEntry(String),

    /// Replay input does not exist
    #[error("Input file not found: {0}")]
    FileNotFound(String),

    /// No uplink sender is configured
    #[error("Serial sender not available")]
    SenderUnavailable,

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Groundlink
pub type Result<T> = std::result::Result<T, TelemetryError>;
