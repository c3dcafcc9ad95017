//! Pure connection state and option handling for the TCP client
//!
//! This module holds the connection state enumeration, client options with
//! their defaults, and the validation applied at construction time.

use super::dispatch::Listener;
use crate::error::ClientError;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Port vMix listens on for the TCP API
pub const DEFAULT_PORT: u32 = 8099;

/// Lowest accepted port
pub const MIN_PORT: u32 = 80;

/// Highest accepted port
pub const MAX_PORT: u32 = 99999;

/// Shortest accepted host name
pub const MIN_HOST_LEN: usize = 3;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(10000);

/// Connection state owned by the lifecycle controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport and no retry cycle
    #[default]
    Disconnected,
    /// A transport exists and its handshake has not completed
    Connecting,
    /// Transport is connected
    Connected,
    /// No transport; the reconnect interval will start the next attempt
    Retrying,
    /// Shut down by the caller; absorbing
    Shutdown,
}

impl ConnectionState {
    /// Whether a transport handle currently exists
    pub fn has_transport(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Retrying => "retrying",
            Self::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Addresses of the live transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketInfo {
    pub local_addr: SocketAddr,
    pub peer_addr: SocketAddr,
}

/// Options accepted by [`TcpClient::new`](super::TcpClient::new)
#[derive(Clone)]
pub struct ConnectionOptions {
    /// Reconnect on a fixed interval after the transport closes
    pub auto_reconnect: bool,
    /// Start the first connect attempt right after construction
    pub connect_on_startup: bool,
    /// Log lifecycle details
    pub debug: bool,
    /// Log raw buffer contents while framing
    pub debug_buffers: bool,
    /// Registered as the first `data` listener
    pub on_data: Option<Listener>,
    pub port: u32,
    /// Upper bound for a single connect attempt
    pub connect_timeout: Duration,
    /// Period of the reconnect interval
    pub reconnect_interval: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            connect_on_startup: true,
            debug: false,
            debug_buffers: false,
            on_data: None,
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("auto_reconnect", &self.auto_reconnect)
            .field("connect_on_startup", &self.connect_on_startup)
            .field("debug", &self.debug)
            .field("debug_buffers", &self.debug_buffers)
            .field("on_data", &self.on_data.is_some())
            .field("port", &self.port)
            .field("connect_timeout", &self.connect_timeout)
            .field("reconnect_interval", &self.reconnect_interval)
            .finish()
    }
}

impl ConnectionOptions {
    pub fn with_port(mut self, port: u32) -> Self {
        self.port = port;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_connect_on_startup(mut self, enabled: bool) -> Self {
        self.connect_on_startup = enabled;
        self
    }

    pub fn with_debug(mut self, debug: bool, debug_buffers: bool) -> Self {
        self.debug = debug;
        self.debug_buffers = debug_buffers;
        self
    }

    pub fn with_on_data(mut self, listener: Listener) -> Self {
        self.on_data = Some(listener);
        self
    }

    pub fn with_timing(mut self, connect_timeout: Duration, reconnect_interval: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.reconnect_interval = reconnect_interval;
        self
    }

    /// Validate host, port and timer settings
    pub fn validate(&self, host: &str) -> Result<(), ClientError> {
        validate_host(host)?;
        validate_port(self.port)?;

        if self.connect_timeout.is_zero() || self.reconnect_interval.is_zero() {
            return Err(ClientError::invalid_options(
                "connect timeout and reconnect interval must be greater than zero",
            ));
        }
        if self.connect_timeout >= self.reconnect_interval {
            return Err(ClientError::invalid_options(format!(
                "connect timeout ({:?}) must be shorter than the reconnect interval ({:?})",
                self.connect_timeout, self.reconnect_interval
            )));
        }
        Ok(())
    }
}

pub fn validate_host(host: &str) -> Result<(), ClientError> {
    if host.len() < MIN_HOST_LEN {
        return Err(ClientError::invalid_host(host));
    }
    Ok(())
}

pub fn validate_port(port: u32) -> Result<(), ClientError> {
    if !(MIN_PORT..=MAX_PORT).contains(&port) {
        return Err(ClientError::InvalidPort { port });
    }
    Ok(())
}

/// `host:port` string handed to the resolver
pub fn endpoint(host: &str, port: u32) -> String {
    format!("{host}:{port}")
}
