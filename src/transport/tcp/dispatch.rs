//! Event kinds, listener registry and pure frame routing
//!
//! Routing decides which event a decoded [`Frame`] becomes. Specialized
//! kinds (`tally`, `activators`, `xml`) fall back to `data` when nobody
//! subscribed to them, so a message is never lost because the caller did not
//! opt into parsing.

use crate::error::ClientError;
use crate::protocol::framing::Frame;
use crate::protocol::tally::{summarize, TallyError, TallySummary};
use crate::protocol::{STATUS_ERROR, TALLY_PREFIX};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

/// Subscriber callback
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Wrap a closure as a [`Listener`]
///
/// Keep the returned handle to unsubscribe later; identity is the `Arc`.
pub fn listener<F>(callback: F) -> Listener
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    Arc::new(callback)
}

/// Every event kind a caller may subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Close,
    Connect,
    Drain,
    End,
    Error,
    Lookup,
    Ready,
    Timeout,
    Connecting,
    Data,
    Disconnect,
    Xml,
    Tally,
    Activators,
}

impl EventKind {
    pub const ALL: [EventKind; 14] = [
        EventKind::Close,
        EventKind::Connect,
        EventKind::Drain,
        EventKind::End,
        EventKind::Error,
        EventKind::Lookup,
        EventKind::Ready,
        EventKind::Timeout,
        EventKind::Connecting,
        EventKind::Data,
        EventKind::Disconnect,
        EventKind::Xml,
        EventKind::Tally,
        EventKind::Activators,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Close => "close",
            EventKind::Connect => "connect",
            EventKind::Drain => "drain",
            EventKind::End => "end",
            EventKind::Error => "error",
            EventKind::Lookup => "lookup",
            EventKind::Ready => "ready",
            EventKind::Timeout => "timeout",
            EventKind::Connecting => "connecting",
            EventKind::Data => "data",
            EventKind::Disconnect => "disconnect",
            EventKind::Xml => "xml",
            EventKind::Tally => "tally",
            EventKind::Activators => "activators",
        }
    }

    /// Kinds re-exposed from the transport itself
    pub fn is_transport_kind(&self) -> bool {
        matches!(
            self,
            EventKind::Close
                | EventKind::Connect
                | EventKind::Drain
                | EventKind::End
                | EventKind::Error
                | EventKind::Lookup
                | EventKind::Ready
                | EventKind::Timeout
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ClientError;

    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        let lowered = kind.to_lowercase();
        EventKind::ALL
            .iter()
            .copied()
            .find(|candidate| candidate.as_str() == lowered)
            .ok_or_else(|| ClientError::invalid_event_kind(kind))
    }
}

/// Event delivered to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connecting,
    /// Host name resolved; `address` is the one being dialled
    Lookup { address: String },
    Connect,
    Ready,
    /// Raw line or unclaimed XML body
    Data(String),
    Xml(String),
    Tally(TallySummary),
    Activators(String),
    /// Queued writes were flushed
    Drain,
    /// Peer closed its writing side
    End,
    Timeout,
    Error(String),
    Close { had_error: bool },
    Disconnect,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Connecting => EventKind::Connecting,
            Event::Lookup { .. } => EventKind::Lookup,
            Event::Connect => EventKind::Connect,
            Event::Ready => EventKind::Ready,
            Event::Data(_) => EventKind::Data,
            Event::Xml(_) => EventKind::Xml,
            Event::Tally(_) => EventKind::Tally,
            Event::Activators(_) => EventKind::Activators,
            Event::Drain => EventKind::Drain,
            Event::End => EventKind::End,
            Event::Timeout => EventKind::Timeout,
            Event::Error(_) => EventKind::Error,
            Event::Close { .. } => EventKind::Close,
            Event::Disconnect => EventKind::Disconnect,
        }
    }

    /// Text payload for `data`, `xml`, `activators` and `error`
    pub fn text(&self) -> Option<&str> {
        match self {
            Event::Data(text) | Event::Xml(text) | Event::Activators(text) | Event::Error(text) => {
                Some(text)
            }
            _ => None,
        }
    }
}

/// Fixed-key mapping from event kind to its ordered listeners
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<EventKind, Vec<Listener>>>,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let mut counts: Vec<(&str, usize)> = listeners
            .iter()
            .map(|(kind, list)| (kind.as_str(), list.len()))
            .filter(|(_, count)| *count > 0)
            .collect();
        counts.sort_unstable();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &counts)
            .finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        let listeners = EventKind::ALL
            .iter()
            .map(|kind| (*kind, Vec::new()))
            .collect();
        Self {
            listeners: Mutex::new(listeners),
        }
    }

    pub fn add(&self, kind: EventKind, listener: Listener) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.entry(kind).or_default().push(listener);
    }

    /// Remove by identity; returns whether the listener was registered
    pub fn remove(&self, kind: EventKind, listener: &Listener) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = listeners.get_mut(&kind) else {
            return false;
        };
        match list.iter().position(|existing| Arc::ptr_eq(existing, listener)) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn has_listeners(&self, kind: EventKind) -> bool {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.get(&kind).is_some_and(|list| !list.is_empty())
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Copy of the listeners for `kind`, in registration order
    pub fn snapshot(&self, kind: EventKind) -> Vec<Listener> {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.get(&kind).cloned().unwrap_or_default()
    }

    /// Invoke every listener of the event's kind
    ///
    /// The lock is released first, so a callback may subscribe or
    /// unsubscribe without deadlocking.
    pub fn emit(&self, event: &Event) {
        for listener in self.snapshot(event.kind()) {
            listener(event);
        }
    }
}

/// Decide which event a frame becomes
pub fn route(frame: Frame, registry: &ListenerRegistry) -> Result<Event, TallyError> {
    match frame {
        Frame::Xml { body } => {
            if registry.has_listeners(EventKind::Xml) {
                Ok(Event::Xml(body))
            } else {
                Ok(Event::Data(body))
            }
        }
        Frame::Line {
            message_type,
            status,
            raw,
        } => {
            // An error status wins over type-based routing
            if status == STATUS_ERROR {
                return Ok(Event::Data(raw));
            }

            match message_type.to_lowercase().as_str() {
                "tally" if registry.has_listeners(EventKind::Tally) => {
                    let tally = raw.replacen(TALLY_PREFIX, "", 1);
                    summarize(&tally).map(Event::Tally)
                }
                "acts" if registry.has_listeners(EventKind::Activators) => {
                    Ok(Event::Activators(raw))
                }
                _ => Ok(Event::Data(raw)),
            }
        }
    }
}
