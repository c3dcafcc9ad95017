//! Pure connection lifecycle state machine
//!
//! ```text
//!  Disconnected ──► Connecting ──► Connected
//!                      ▲  │            │ close
//!                      │  │ close      ▼
//!                 tick └──┴──────► Retrying
//!
//!  any state ── shutdown ──► Shutdown
//! ```
//!
//! Every handler returns the timer and transport actions the client must
//! execute, in order. The machine tracks which timers are armed, so at most
//! one connect timeout and one reconnect interval exist at any time and a
//! second close during a retry cycle never arms a duplicate interval.

use super::state::ConnectionState;
use tracing::{debug, info, warn};

/// Side effect requested by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Emit `connecting` and start a fresh transport handle
    OpenTransport,
    /// Drop the transport handle and report `close`
    DestroyTransport,
    ArmConnectTimeout,
    CancelConnectTimeout,
    /// Start the repeating reconnect interval
    ArmReconnectInterval,
    CancelReconnectInterval,
    /// Best-effort `QUIT` before the transport is destroyed
    SendQuit,
}

#[derive(Debug)]
pub struct Lifecycle {
    state: ConnectionState,
    auto_reconnect: bool,
    connect_timeout_armed: bool,
    reconnect_armed: bool,
}

impl Lifecycle {
    pub fn new(auto_reconnect: bool) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            auto_reconnect,
            connect_timeout_armed: false,
            reconnect_armed: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// A retry cycle is in progress while the reconnect interval is armed
    pub fn is_retrying(&self) -> bool {
        self.reconnect_armed
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }

    pub fn connect_timeout_armed(&self) -> bool {
        self.connect_timeout_armed
    }

    /// Start a connect attempt (startup, manual connect or interval tick)
    pub fn request_attempt(&mut self) -> Vec<LifecycleAction> {
        match self.state {
            ConnectionState::Shutdown => {
                warn!("Ignoring connect attempt after shutdown");
                Vec::new()
            }
            ConnectionState::Connecting | ConnectionState::Connected => {
                debug!(state = %self.state, "Connect attempt already in progress or connected");
                Vec::new()
            }
            ConnectionState::Disconnected | ConnectionState::Retrying => {
                self.connect_timeout_armed = true;
                self.transition(ConnectionState::Connecting);
                vec![
                    LifecycleAction::OpenTransport,
                    LifecycleAction::ArmConnectTimeout,
                ]
            }
        }
    }

    /// Transport finished its handshake
    pub fn on_connected(&mut self) -> Vec<LifecycleAction> {
        if self.state != ConnectionState::Connecting {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if self.connect_timeout_armed {
            self.connect_timeout_armed = false;
            actions.push(LifecycleAction::CancelConnectTimeout);
        }
        if self.reconnect_armed {
            self.reconnect_armed = false;
            actions.push(LifecycleAction::CancelReconnectInterval);
        }
        self.transition(ConnectionState::Connected);
        actions
    }

    /// Connect timeout elapsed before the handshake completed
    pub fn on_connect_timeout(&mut self) -> Vec<LifecycleAction> {
        if self.state != ConnectionState::Connecting {
            return Vec::new();
        }

        info!("Connect timeout reached");
        self.connect_timeout_armed = false;

        // Destroying the handle is followed by a synthesized close
        let mut actions = vec![LifecycleAction::DestroyTransport];
        actions.extend(self.on_closed());
        actions
    }

    /// Transport closed, either on error or by the peer
    pub fn on_closed(&mut self) -> Vec<LifecycleAction> {
        if !self.state.has_transport() {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if self.connect_timeout_armed {
            self.connect_timeout_armed = false;
            actions.push(LifecycleAction::CancelConnectTimeout);
        }

        if !self.auto_reconnect {
            self.transition(ConnectionState::Disconnected);
            return actions;
        }

        if !self.reconnect_armed {
            info!("Initialising reconnecting procedure");
            self.reconnect_armed = true;
            actions.push(LifecycleAction::ArmReconnectInterval);
        }
        self.transition(ConnectionState::Retrying);
        actions
    }

    /// Caller asked for shutdown; reconnection stops for good
    pub fn request_shutdown(&mut self) -> Vec<LifecycleAction> {
        if self.state == ConnectionState::Shutdown {
            return Vec::new();
        }

        self.auto_reconnect = false;

        let mut actions = Vec::new();
        if self.reconnect_armed {
            self.reconnect_armed = false;
            actions.push(LifecycleAction::CancelReconnectInterval);
        }
        if self.connect_timeout_armed {
            self.connect_timeout_armed = false;
            actions.push(LifecycleAction::CancelConnectTimeout);
        }
        if self.state.has_transport() {
            actions.push(LifecycleAction::SendQuit);
            actions.push(LifecycleAction::DestroyTransport);
        }
        self.transition(ConnectionState::Shutdown);
        actions
    }

    fn transition(&mut self, to: ConnectionState) {
        if self.state != to {
            debug!(from = %self.state, to = %to, "Connection state transition");
            self.state = to;
        }
    }
}
