//! Error types for resock
//!
//! The channel reports transport failures, malformed inbound payloads and
//! exhausted reconnect budgets as *events* (`error`, `reconnect_failed`) or as
//! diagnostics, never as `Err` values. The `Error` enum below is what crosses
//! the public API boundary: local failures such as serializing outgoing data,
//! talking to a channel that has been shut down, or bootstrapping telemetry.
//!
//! # Error Categories
//!
//! - **Payload errors**: Serialization, Decode
//! - **Transport errors**: WebSocket, ConnectionClosed
//! - **Setup errors**: InvalidConfig, Internal
//!
//! # Examples
//!
//! ```rust
//! use resock_core::Error;
//!
//! let error = Error::Decode("expected value at line 1 column 1".into());
//! assert!(error.is_decode());
//! ```

use thiserror::Error;

/// Result type for resock operations
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error type for resock operations
///
/// Cloneable so a single failure can be fanned out to several waiters.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Outgoing data could not be turned into JSON, or a reply could not be
    /// turned into the type the caller asked for
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Inbound wire data is not a valid payload
    ///
    /// Inside the channel this never escapes: the message is dropped and the
    /// failure is logged. The codec returns it to whoever calls it directly.
    #[error("Decode error: {0}")]
    Decode(String),

    /// WebSocket transport layer error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The channel has been closed and no longer accepts commands
    #[error("Connection closed")]
    ConnectionClosed,

    /// A configuration value cannot be used
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error came from decoding inbound data
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode(_))
    }

    /// Short, stable label for metrics attributes
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Serialization(_) => "serialization",
            Error::Decode(_) => "decode",
            Error::WebSocket(_) => "websocket",
            Error::ConnectionClosed => "connection_closed",
            Error::InvalidConfig(_) => "invalid_config",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
