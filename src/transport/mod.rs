//! Transport layer for the vMix control connection

pub mod tcp;

pub use tcp::{
    listener, ConnectionOptions, ConnectionState, Event, EventKind, Listener, SocketInfo,
    TcpClient,
};
