//! Error types for the vMix TCP client
//!
//! Construction, subscription and send failures are programmer errors and are
//! returned synchronously. Transport failures never show up here: they are
//! reported through `error`/`close` events and absorbed by the reconnect cycle.

use crate::transport::tcp::state::ConnectionState;
use thiserror::Error;

/// Main error type for client operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid host provided '{host}'")]
    InvalidHost { host: String },

    #[error("Invalid port provided '{port}'")]
    InvalidPort { port: u32 },

    #[error("Invalid connection options: {message}")]
    InvalidOptions { message: String },

    #[error("Invalid type of listener: '{kind}'")]
    InvalidEventKind { kind: String },

    #[error("Tried to send data without connection - current state: {state}")]
    NotConnected { state: ConnectionState },

    #[error("Client supervisor is no longer running")]
    ChannelClosed,

    #[error("TcpClient must be created inside a Tokio runtime")]
    NoRuntime,
}

impl ClientError {
    /// Create invalid host error
    pub fn invalid_host<S: Into<String>>(host: S) -> Self {
        Self::InvalidHost { host: host.into() }
    }

    /// Create invalid options error
    pub fn invalid_options<S: Into<String>>(message: S) -> Self {
        Self::InvalidOptions {
            message: message.into(),
        }
    }

    /// Create invalid event kind error
    pub fn invalid_event_kind<S: Into<String>>(kind: S) -> Self {
        Self::InvalidEventKind { kind: kind.into() }
    }

    /// Whether this error was caused by the caller rather than the environment
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidHost { .. }
                | Self::InvalidPort { .. }
                | Self::InvalidOptions { .. }
                | Self::InvalidEventKind { .. }
                | Self::NotConnected { .. }
        )
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ClientError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        ClientError::ChannelClosed
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
