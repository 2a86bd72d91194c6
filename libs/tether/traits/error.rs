use thiserror::Error;

/// Main error type for tether
///
/// None of these cross the public surface of the supervisor: transport and
/// protocol failures are recovered inside the driver task and surface only
/// through `ConnectionHealth::last_error`, client events and logs.
#[derive(Error, Debug)]
pub enum TetherError {
    /// Open/connect-level failure of the underlying transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// Server rejected the credential (`auth_error`)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Malformed or unparseable envelope
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// `error` envelope reported by the server
    #[error("Server error: {0}")]
    Application(String),

    /// Reconnection budget spent
    #[error("Reconnection failed after {attempts} attempts")]
    RetryExhausted { attempts: u32 },

    /// Transport is not open
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<serde_json::Error> for TetherError {
    fn from(err: serde_json::Error) -> Self {
        TetherError::Protocol(err.to_string())
    }
}

/// Result type for tether operations
pub type Result<T> = std::result::Result<T, TetherError>;
