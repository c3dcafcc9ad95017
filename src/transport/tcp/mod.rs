//! Persistent, auto-reconnecting TCP client for the vMix API
//!
//! The module separates pure logic from I/O so each part can be tested on its
//! own:
//!
//! - [`state`] - Connection state, options and validation
//! - [`lifecycle`] - Pure connect/retry/shutdown state machine
//! - [`dispatch`] - Event kinds, listener registry and frame routing
//! - [`client`] - Impure supervisor task and the public facade
//!
//! # Usage
//!
//! ```rust,no_run
//! use vmix_tcp::transport::tcp::{listener, ConnectionOptions, Event, TcpClient};
//!
//! # tokio_test::block_on(async {
//! let client = TcpClient::new("localhost", ConnectionOptions::default())?;
//!
//! client.on("tally", listener(|event| {
//!     if let Event::Tally(summary) = event {
//!         println!("on air: {:?}", summary.program);
//!     }
//! }))?;
//!
//! client.on("connect", listener(|_| println!("connected")))?;
//!
//! // Later, once connected
//! client.send("SUBSCRIBE TALLY")?;
//! client.shutdown().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod dispatch;
pub mod lifecycle;
pub mod state;

pub use client::TcpClient;
pub use dispatch::{listener, route, Event, EventKind, Listener, ListenerRegistry};
pub use lifecycle::{Lifecycle, LifecycleAction};
pub use state::{ConnectionOptions, ConnectionState, SocketInfo, DEFAULT_PORT};
