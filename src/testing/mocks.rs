//! Mock vMix endpoint and event recording for tests
//!
//! [`MockEndpoint`] listens on an ephemeral loopback port and hands out one
//! [`MockPeer`] per accepted connection, so tests can script exactly what the
//! client receives and inspect what it writes.

use crate::protocol::LINE_TERMINATOR;
use crate::transport::tcp::{listener, Event, EventKind, Listener, TcpClient};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Upper bound for every wait performed by the helpers
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

fn timed_out(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("Timed out waiting for {what}"))
}

/// In-process stand-in for a vMix instance
#[derive(Debug)]
pub struct MockEndpoint {
    listener: TcpListener,
    address: SocketAddr,
}

impl MockEndpoint {
    pub async fn bind() -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;
        Ok(Self { listener, address })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn port(&self) -> u32 {
        u32::from(self.address.port())
    }

    /// Wait for the client to connect
    pub async fn accept(&self) -> io::Result<MockPeer> {
        let (stream, _) = tokio::time::timeout(DEFAULT_WAIT, self.listener.accept())
            .await
            .map_err(|_| timed_out("a connection"))??;
        let (reader, writer) = stream.into_split();
        Ok(MockPeer {
            reader: BufReader::new(reader),
            writer,
        })
    }
}

/// Server side of one accepted connection
#[derive(Debug)]
pub struct MockPeer {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl MockPeer {
    /// Write raw bytes exactly as given
    pub async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }

    /// Write one line followed by the protocol terminator
    pub async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.write(format!("{line}{LINE_TERMINATOR}").as_bytes()).await
    }

    /// Write an `XML <length>` message whose length counts the trailing terminator
    pub async fn write_xml(&mut self, body: &str) -> io::Result<()> {
        let payload = format!("{body}{LINE_TERMINATOR}");
        let message = format!("XML {}{LINE_TERMINATOR}{payload}", payload.len());
        self.write(message.as_bytes()).await
    }

    /// Next line written by the client without its terminator, `None` on EOF
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let read = tokio::time::timeout(DEFAULT_WAIT, self.reader.read_line(&mut line))
            .await
            .map_err(|_| timed_out("a line from the client"))??;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(LINE_TERMINATOR).to_string()))
    }

    /// Half-close the connection from the endpoint side
    pub async fn shutdown_write(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}

/// Records every event of the chosen kinds in arrival order
pub struct EventRecorder {
    events: Arc<Mutex<Vec<Event>>>,
    rx: mpsc::UnboundedReceiver<Event>,
    handle: Listener,
    kinds: Vec<EventKind>,
}

impl EventRecorder {
    /// Subscribe to `kinds` on `client`
    pub fn attach(client: &TcpClient, kinds: &[EventKind]) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = {
            let events = events.clone();
            listener(move |event| {
                events
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(event.clone());
                let _ = tx.send(event.clone());
            })
        };

        for kind in kinds {
            client.add_listener(*kind, handle.clone());
        }

        Self {
            events,
            rx,
            handle,
            kinds: kinds.to_vec(),
        }
    }

    /// Subscribe to every event kind
    pub fn attach_all(client: &TcpClient) -> Self {
        Self::attach(client, &EventKind::ALL)
    }

    /// Next recorded event
    pub async fn next(&mut self) -> io::Result<Event> {
        tokio::time::timeout(DEFAULT_WAIT, self.rx.recv())
            .await
            .map_err(|_| timed_out("an event"))?
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "Recorder detached"))
    }

    /// Skip events until one of `kind` arrives
    pub async fn wait_for(&mut self, kind: EventKind) -> io::Result<Event> {
        loop {
            let event = self.next().await?;
            if event.kind() == kind {
                return Ok(event);
            }
        }
    }

    /// Everything recorded so far
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Kinds recorded so far, in order
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(Event::kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events().iter().filter(|event| event.kind() == kind).count()
    }

    /// Unsubscribe from every kind
    pub fn detach(&self, client: &TcpClient) {
        for kind in &self.kinds {
            client.remove_listener(*kind, &self.handle);
        }
    }
}
