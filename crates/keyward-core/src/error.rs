//! Error types for the access-control node

use thiserror::Error;

/// Core Keyward errors
///
/// Nothing here is fatal to the control loop. Network errors are counted
/// toward offline fallback; everything else aborts only the current step.
#[derive(Error, Debug)]
pub enum KeywardError {
    // Wire errors
    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Frame checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    FrameChecksum { expected: u8, actual: u8 },

    // Network errors
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Server failure: HTTP {status}")]
    ServerFailure { status: u16 },

    #[error("Malformed response: {0}")]
    ParseFailure(String),

    // Storage errors
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    // Operator errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

impl KeywardError {
    /// The authority could not be reached or answered with a failure status
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            KeywardError::TransportFailure(_) | KeywardError::ServerFailure { .. }
        )
    }
}

impl From<serde_json::Error> for KeywardError {
    fn from(e: serde_json::Error) -> Self {
        KeywardError::ParseFailure(e.to_string())
    }
}

/// Result type for Keyward operations
pub type KeywardResult<T> = Result<T, KeywardError>;
