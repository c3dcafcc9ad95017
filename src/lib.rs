//! vMix TCP - persistent client for the vMix TCP control API
//!
//! # Overview
//!
//! This crate talks to vMix over its line-oriented TCP API (port 8099):
//! - Stream framing, including the length-prefixed `XML` responses
//! - Command serialization for raw commands and `FUNCTION` calls
//! - Tally summaries and activator routing with fallback to `data`
//! - A connection lifecycle that reconnects on a fixed interval until shut down
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use vmix_tcp::{listener, ConnectionOptions, Event, FunctionCommand, TcpClient};
//!
//! # tokio_test::block_on(async {
//! let client = TcpClient::new("192.168.1.50", ConnectionOptions::default())?;
//!
//! client.on("data", listener(|event| {
//!     if let Event::Data(line) = event {
//!         println!("{line}");
//!     }
//! }))?;
//!
//! // Once connected
//! client.send(
//!     FunctionCommand::new("SetText")
//!         .param("Input", "MyTitle")
//!         .param("SelectedName", "TitleField")
//!         .param("Value", "Updated text!"),
//! )?;
//!
//! client.shutdown().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, ClientResult};
pub use protocol::{Command, FunctionCommand, IntoCommands, TallyState, TallySummary};
pub use transport::tcp::{
    listener, ConnectionOptions, ConnectionState, Event, EventKind, Listener, SocketInfo,
    TcpClient,
};
