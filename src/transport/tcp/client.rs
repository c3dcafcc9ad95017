//! Impure I/O for the vMix TCP client
//!
//! [`TcpClient`] is a thin facade. All socket I/O, framing, timers and
//! lifecycle transitions happen on one supervisor task, which is the only
//! place the transport and the timers are touched. The facade talks to it
//! over an unbounded channel and observes state through `watch` channels.

use super::dispatch::{route, Event, EventKind, Listener, ListenerRegistry};
use super::lifecycle::{Lifecycle, LifecycleAction};
use super::state::{endpoint, ConnectionOptions, ConnectionState, SocketInfo};
use crate::{connection_span, framing_span};
use crate::error::{ClientError, ClientResult};
use crate::protocol::command::IntoCommands;
use crate::protocol::framing::{Frame, VmixCodec};
use crate::protocol::QUIT_COMMAND;
use futures::{FutureExt, SinkExt, StreamExt};
use std::future::{self, Future};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior, Sleep};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn, Instrument};

type ConnectAttempt = Pin<Box<dyn Future<Output = io::Result<TcpStream>> + Send>>;

/// Requests from the facade to the supervisor
#[derive(Debug)]
enum ClientCommand {
    Connect,
    Send(Vec<String>),
    Shutdown,
}

/// Persistent, auto-reconnecting client for the vMix TCP API
pub struct TcpClient {
    host: String,
    port: u32,
    listeners: Arc<ListenerRegistry>,
    command_tx: mpsc::UnboundedSender<ClientCommand>,
    state_rx: watch::Receiver<ConnectionState>,
    socket_rx: watch::Receiver<Option<SocketInfo>>,
    supervisor_handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TcpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpClient")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("state", &self.state())
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl TcpClient {
    /// Validate the options and start the supervisor task
    ///
    /// Must be called from within a Tokio runtime. With
    /// `connect_on_startup` the first attempt is deferred by one scheduler
    /// yield, so listeners registered right after construction see
    /// `connecting`.
    pub fn new<S: Into<String>>(host: S, options: ConnectionOptions) -> ClientResult<Self> {
        let host = host.into();
        options.validate(&host)?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        let listeners = Arc::new(ListenerRegistry::new());
        if let Some(on_data) = options.on_data.clone() {
            listeners.add(EventKind::Data, on_data);
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (socket_tx, socket_rx) = watch::channel(None);

        let endpoint = endpoint(&host, options.port);
        let span = connection_span!(endpoint = %endpoint);
        let supervisor = Supervisor {
            endpoint,
            debug: options.debug,
            debug_buffers: options.debug_buffers,
            connect_timeout: options.connect_timeout,
            reconnect_interval: options.reconnect_interval,
            lifecycle: Lifecycle::new(options.auto_reconnect),
            listeners: listeners.clone(),
            state_tx,
            socket_tx,
            command_rx,
            transport: Transport::Idle,
            connect_deadline: None,
            reconnect: None,
            pending: Vec::new(),
        };

        let handle = runtime.spawn(
            supervisor
                .run(options.connect_on_startup)
                .instrument(span),
        );

        Ok(Self {
            host,
            port: options.port,
            listeners,
            command_tx,
            state_rx,
            socket_rx,
            supervisor_handle: Mutex::new(Some(handle)),
        })
    }

    /// Serialize and transmit one command or an ordered batch
    ///
    /// Fails immediately when no transport exists. Commands issued while a
    /// connect attempt is in flight are queued and written once connected.
    pub fn send<C: IntoCommands>(&self, commands: C) -> ClientResult<()> {
        let state = self.state();
        if !state.has_transport() {
            return Err(ClientError::NotConnected { state });
        }

        let lines: Vec<String> = commands
            .into_commands()
            .iter()
            .map(|command| command.to_line())
            .collect();
        if lines.is_empty() {
            return Ok(());
        }

        self.command_tx.send(ClientCommand::Send(lines))?;
        Ok(())
    }

    /// Subscribe to an event kind given by name (case-insensitive)
    pub fn on(&self, kind: &str, listener: Listener) -> ClientResult<()> {
        let kind: EventKind = kind.parse()?;
        self.add_listener(kind, listener);
        Ok(())
    }

    /// Unsubscribe by identity; unknown listeners are ignored
    pub fn off(&self, kind: &str, listener: &Listener) -> ClientResult<()> {
        let kind: EventKind = kind.parse()?;
        self.listeners.remove(kind, listener);
        Ok(())
    }

    pub fn add_listener(&self, kind: EventKind, listener: Listener) {
        self.listeners.add(kind, listener);
    }

    pub fn remove_listener(&self, kind: EventKind, listener: &Listener) -> bool {
        self.listeners.remove(kind, listener)
    }

    /// Start a connect attempt now
    ///
    /// Ignored while connecting or connected.
    pub fn connect(&self) -> ClientResult<()> {
        let state = self.state();
        if state == ConnectionState::Shutdown {
            return Err(ClientError::NotConnected { state });
        }
        self.command_tx.send(ClientCommand::Connect)?;
        Ok(())
    }

    /// Stop reconnecting, send `QUIT` and close the transport
    ///
    /// Idempotent: later calls return `Ok(())` without side effects.
    pub async fn shutdown(&self) -> ClientResult<()> {
        // The supervisor may already be gone; that is the desired end state
        let _ = self.command_tx.send(ClientCommand::Shutdown);

        let handle = self
            .supervisor_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            if let Err(join_error) = handle.await {
                error!(error = %join_error, "Client supervisor task failed");
            }
        }
        Ok(())
    }

    /// Addresses of the live transport, if any
    pub fn socket(&self) -> Option<SocketInfo> {
        *self.socket_rx.borrow()
    }

    pub fn connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// True only while a transport exists and its handshake is pending
    pub fn connecting(&self) -> bool {
        self.state() == ConnectionState::Connecting
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u32 {
        self.port
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        // Async shutdown is impossible here; the supervisor finishes on its own
        let _ = self.command_tx.send(ClientCommand::Shutdown);
    }
}

enum Transport {
    Idle,
    Connecting(ConnectAttempt),
    Connected(Framed<TcpStream, VmixCodec>),
}

enum TransportEvent {
    Opened(io::Result<TcpStream>),
    Read(Option<io::Result<Frame>>),
}

struct Supervisor {
    endpoint: String,
    debug: bool,
    debug_buffers: bool,
    connect_timeout: Duration,
    reconnect_interval: Duration,
    lifecycle: Lifecycle,
    listeners: Arc<ListenerRegistry>,
    state_tx: watch::Sender<ConnectionState>,
    socket_tx: watch::Sender<Option<SocketInfo>>,
    command_rx: mpsc::UnboundedReceiver<ClientCommand>,
    transport: Transport,
    connect_deadline: Option<Pin<Box<Sleep>>>,
    reconnect: Option<Interval>,
    /// Lines written while the handshake was pending
    pending: Vec<String>,
}

impl Supervisor {
    async fn run(mut self, connect_on_startup: bool) {
        if connect_on_startup {
            tokio::task::yield_now().await;
            self.attempt().await;
        }

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(ClientCommand::Send(lines)) => self.write_lines(lines).await,
                    Some(ClientCommand::Connect) => self.attempt().await,
                    Some(ClientCommand::Shutdown) | None => {
                        self.shutdown().await;
                        break;
                    }
                },
                event = next_transport_event(&mut self.transport) => match event {
                    TransportEvent::Opened(result) => self.on_opened(result).await,
                    TransportEvent::Read(item) => {
                        let span = framing_span!(debug_buffers = self.debug_buffers);
                        async {
                            self.on_read(item).await;
                            self.drain_buffered().await;
                        }
                        .instrument(span)
                        .await;
                    }
                },
                _ = wait_deadline(&mut self.connect_deadline) => self.on_connect_timeout().await,
                _ = wait_tick(&mut self.reconnect) => {
                    if self.debug {
                        info!("Reconnect interval elapsed");
                    }
                    self.attempt().await;
                }
            }
        }

        debug!("Client supervisor stopped");
    }

    async fn attempt(&mut self) {
        let actions = self.lifecycle.request_attempt();
        self.apply(actions).await;
    }

    async fn apply(&mut self, actions: Vec<LifecycleAction>) {
        self.state_tx.send_replace(self.lifecycle.state());

        for action in actions {
            match action {
                LifecycleAction::OpenTransport => self.open_transport(),
                LifecycleAction::DestroyTransport => self.destroy_transport(),
                LifecycleAction::ArmConnectTimeout => {
                    self.connect_deadline = Some(Box::pin(tokio::time::sleep(self.connect_timeout)));
                }
                LifecycleAction::CancelConnectTimeout => self.connect_deadline = None,
                LifecycleAction::ArmReconnectInterval => {
                    let period = self.reconnect_interval;
                    let mut interval = interval_at(Instant::now() + period, period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.reconnect = Some(interval);
                }
                LifecycleAction::CancelReconnectInterval => self.reconnect = None,
                LifecycleAction::SendQuit => self.send_quit().await,
            }
        }
    }

    fn open_transport(&mut self) {
        if self.debug {
            info!(endpoint = %self.endpoint, "Connecting");
        }
        self.emit(Event::Connecting);
        self.transport =
            Transport::Connecting(open_stream(self.endpoint.clone(), self.listeners.clone()));
    }

    fn destroy_transport(&mut self) {
        let previous = std::mem::replace(&mut self.transport, Transport::Idle);
        self.socket_tx.send_replace(None);
        self.discard_pending();

        if !matches!(previous, Transport::Idle) {
            drop(previous);
            self.emit(Event::Close { had_error: false });
        }
    }

    async fn on_opened(&mut self, result: io::Result<TcpStream>) {
        match result {
            Ok(stream) => {
                let socket = match (stream.local_addr(), stream.peer_addr()) {
                    (Ok(local_addr), Ok(peer_addr)) => Some(SocketInfo {
                        local_addr,
                        peer_addr,
                    }),
                    _ => None,
                };
                self.transport = Transport::Connected(Framed::new(
                    stream,
                    VmixCodec::new(self.debug_buffers),
                ));
                self.socket_tx.send_replace(socket);

                let actions = self.lifecycle.on_connected();
                self.apply(actions).await;

                if self.debug {
                    info!(endpoint = %self.endpoint, "Connected");
                }
                self.emit(Event::Connect);
                self.emit(Event::Ready);

                let queued = std::mem::take(&mut self.pending);
                if !queued.is_empty() {
                    self.write_lines(queued).await;
                }
            }
            Err(error) => {
                warn!(endpoint = %self.endpoint, error = %error, "Connect attempt failed");
                self.emit(Event::Error(error.to_string()));
                self.transport_closed(true).await;
            }
        }
    }

    async fn on_connect_timeout(&mut self) {
        self.connect_deadline = None;
        if self.lifecycle.state() != ConnectionState::Connecting {
            return;
        }

        self.emit(Event::Timeout);
        let actions = self.lifecycle.on_connect_timeout();
        self.apply(actions).await;
    }

    async fn on_read(&mut self, item: Option<io::Result<Frame>>) {
        match item {
            Some(Ok(frame)) => self.dispatch(frame),
            Some(Err(error)) => {
                error!(error = %error, "Transport read failed");
                self.emit(Event::Error(error.to_string()));
                self.transport_closed(true).await;
            }
            None => {
                if self.debug {
                    info!("Connection ended by peer");
                }
                self.emit(Event::End);
                self.transport_closed(false).await;
            }
        }
    }

    /// Dispatch every frame already decodable from the current read burst
    async fn drain_buffered(&mut self) {
        loop {
            let Transport::Connected(framed) = &mut self.transport else {
                break;
            };
            let Some(item) = framed.next().now_or_never() else {
                break;
            };
            self.on_read(item).await;
        }
    }

    fn dispatch(&self, frame: Frame) {
        match route(frame, &self.listeners) {
            Ok(event) => self.emit(event),
            Err(tally_error) => {
                warn!(error = %tally_error, "Failed to summarize tally message");
                self.emit(Event::Error(tally_error.to_string()));
            }
        }
    }

    /// Transport went away without a destroy request
    async fn transport_closed(&mut self, had_error: bool) {
        self.transport = Transport::Idle;
        self.socket_tx.send_replace(None);
        self.discard_pending();

        let actions = self.lifecycle.on_closed();
        self.apply(actions).await;

        if self.debug {
            info!(had_error, retrying = self.lifecycle.is_retrying(), "Connection closed");
        }
        self.emit(Event::Close { had_error });
    }

    async fn write_lines(&mut self, lines: Vec<String>) {
        let framed = match &mut self.transport {
            Transport::Connected(framed) => framed,
            Transport::Connecting(_) => {
                debug!(count = lines.len(), "Queueing commands until connected");
                self.pending.extend(lines);
                return;
            }
            Transport::Idle => {
                warn!(count = lines.len(), "Dropping commands, no connection");
                self.emit(Event::Error(format!(
                    "Dropped {} command(s): no connection",
                    lines.len()
                )));
                return;
            }
        };

        if self.debug {
            debug!(commands = ?lines, "Sending commands");
        }

        match write_batch(framed, lines).await {
            Ok(()) => self.emit(Event::Drain),
            Err(error) => {
                error!(error = %error, "Transport write failed");
                self.emit(Event::Error(error.to_string()));
                self.transport_closed(true).await;
            }
        }
    }

    async fn send_quit(&mut self) {
        let Transport::Connected(framed) = &mut self.transport else {
            return;
        };

        let quit = framed.send(QUIT_COMMAND.to_string());
        match tokio::time::timeout(self.connect_timeout, quit).await {
            Ok(Ok(())) => debug!("Sent QUIT"),
            Ok(Err(error)) => debug!(error = %error, "Failed to send QUIT"),
            Err(_) => debug!("Timed out sending QUIT"),
        }
    }

    async fn shutdown(&mut self) {
        info!(endpoint = %self.endpoint, "Shutting down client");
        let actions = self.lifecycle.request_shutdown();
        self.apply(actions).await;
        self.discard_pending();
        self.emit(Event::Disconnect);
    }

    fn discard_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let count = self.pending.len();
        self.pending.clear();
        warn!(count, "Discarding queued commands, transport closed");
        self.emit(Event::Error(format!(
            "Dropped {count} queued command(s): transport closed"
        )));
    }

    fn emit(&self, event: Event) {
        if self.debug {
            debug!(kind = %event.kind(), "Emitting event");
        }
        self.listeners.emit(&event);
    }
}

/// Resolve the endpoint, report `lookup` and dial the first address
fn open_stream(endpoint: String, listeners: Arc<ListenerRegistry>) -> ConnectAttempt {
    Box::pin(async move {
        let address = lookup_host(endpoint.as_str()).await?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("No address found for {endpoint}"),
            )
        })?;

        listeners.emit(&Event::Lookup {
            address: address.ip().to_string(),
        });
        TcpStream::connect(address).await
    })
}

async fn write_batch(
    framed: &mut Framed<TcpStream, VmixCodec>,
    lines: Vec<String>,
) -> io::Result<()> {
    for line in lines {
        framed.feed(line).await?;
    }
    framed.flush().await
}

async fn next_transport_event(transport: &mut Transport) -> TransportEvent {
    match transport {
        Transport::Idle => future::pending().await,
        Transport::Connecting(attempt) => TransportEvent::Opened(attempt.await),
        Transport::Connected(framed) => TransportEvent::Read(framed.next().await),
    }
}

async fn wait_deadline(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}

async fn wait_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tcp::dispatch::listener;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn offline_options() -> ConnectionOptions {
        ConnectionOptions::default().with_connect_on_startup(false)
    }

    /// Supervisor that is driven by hand, recording every event it emits
    fn manual_supervisor() -> (Supervisor, Arc<Mutex<Vec<Event>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let listeners = Arc::new(ListenerRegistry::new());
        let record = {
            let events = events.clone();
            listener(move |event| events.lock().unwrap().push(event.clone()))
        };
        for kind in EventKind::ALL {
            listeners.add(kind, record.clone());
        }

        let options = ConnectionOptions::default();
        let (_command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (socket_tx, _) = watch::channel(None);
        let supervisor = Supervisor {
            endpoint: endpoint("localhost", options.port),
            debug: false,
            debug_buffers: false,
            connect_timeout: options.connect_timeout,
            reconnect_interval: options.reconnect_interval,
            lifecycle: Lifecycle::new(options.auto_reconnect),
            listeners,
            state_tx,
            socket_tx,
            command_rx,
            transport: Transport::Idle,
            connect_deadline: None,
            reconnect: None,
            pending: Vec::new(),
        };
        (supervisor, events)
    }

    fn recorded_kinds(events: &Mutex<Vec<Event>>) -> Vec<EventKind> {
        events.lock().unwrap().iter().map(Event::kind).collect()
    }

    #[test]
    fn test_new_requires_runtime() {
        let result = TcpClient::new("localhost", offline_options());
        assert!(matches!(result, Err(ClientError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_host() {
        let result = TcpClient::new("ab", offline_options());
        assert!(matches!(result, Err(ClientError::InvalidHost { .. })));
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_port() {
        let result = TcpClient::new("localhost", offline_options().with_port(79));
        assert!(matches!(result, Err(ClientError::InvalidPort { port: 79 })));
    }

    #[tokio::test]
    async fn test_initial_state_without_startup_connect() {
        let client = TcpClient::new("localhost", offline_options()).unwrap();

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.connected());
        assert!(!client.connecting());
        assert!(client.socket().is_none());
        assert_eq!(client.host(), "localhost");
        assert_eq!(client.port(), 8099);
    }

    #[tokio::test]
    async fn test_send_without_connection_fails() {
        let client = TcpClient::new("localhost", offline_options()).unwrap();

        let result = client.send("tally");

        assert!(matches!(
            result,
            Err(ClientError::NotConnected {
                state: ConnectionState::Disconnected
            })
        ));
    }

    #[tokio::test]
    async fn test_on_rejects_unknown_kind() {
        let client = TcpClient::new("localhost", offline_options()).unwrap();

        let result = client.on("bogus", listener(|_| {}));

        assert!(matches!(result, Err(ClientError::InvalidEventKind { .. })));
        assert!(client.off("bogus", &listener(|_| {})).is_err());
    }

    #[tokio::test]
    async fn test_on_data_option_is_registered_first() {
        let options = offline_options().with_on_data(listener(|_| {}));
        let client = TcpClient::new("localhost", options).unwrap();

        assert_eq!(client.listeners.listener_count(EventKind::Data), 1);
    }

    #[tokio::test]
    async fn test_off_unregistered_listener_is_noop() {
        let client = TcpClient::new("localhost", offline_options()).unwrap();
        assert!(client.off("DATA", &listener(|_| {})).is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let client = TcpClient::new("localhost", offline_options()).unwrap();
        let disconnects = Arc::new(AtomicUsize::new(0));
        let counter = disconnects.clone();
        client
            .on(
                "disconnect",
                listener(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        client.shutdown().await.unwrap();
        client.shutdown().await.unwrap();

        assert_eq!(client.state(), ConnectionState::Shutdown);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert!(client.connect().is_err());
        assert!(client.send("tally").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_connect_times_out_then_retries() {
        let (mut supervisor, events) = manual_supervisor();
        let mut state = supervisor.state_tx.subscribe();

        supervisor.attempt().await;
        supervisor.transport =
            Transport::Connecting(Box::pin(future::pending::<io::Result<TcpStream>>()));
        let started = Instant::now();

        wait_deadline(&mut supervisor.connect_deadline).await;
        supervisor.on_connect_timeout().await;

        assert!(started.elapsed() >= supervisor.connect_timeout);
        assert_eq!(
            recorded_kinds(&events),
            vec![EventKind::Connecting, EventKind::Timeout, EventKind::Close]
        );
        assert_eq!(
            events.lock().unwrap()[2],
            Event::Close { had_error: false }
        );
        assert!(matches!(supervisor.transport, Transport::Idle));
        assert!(supervisor.connect_deadline.is_none());
        assert_eq!(*state.borrow_and_update(), ConnectionState::Retrying);

        wait_tick(&mut supervisor.reconnect).await;
        supervisor.attempt().await;

        assert!(started.elapsed() >= supervisor.reconnect_interval);
        assert_eq!(recorded_kinds(&events).last(), Some(&EventKind::Connecting));
        assert_eq!(*state.borrow(), ConnectionState::Connecting);
        assert!(supervisor.connect_deadline.is_some());
    }

    #[tokio::test]
    async fn test_wait_deadline_without_timer_stays_pending() {
        let mut deadline: Option<Pin<Box<Sleep>>> = None;
        let result = tokio::time::timeout(Duration::from_millis(20), wait_deadline(&mut deadline)).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_tick_first_tick_after_full_period() {
        let period = Duration::from_secs(10);
        let mut interval = Some(interval_at(Instant::now() + period, period));
        let start = Instant::now();

        wait_tick(&mut interval).await;

        assert!(start.elapsed() >= period);
    }
}
