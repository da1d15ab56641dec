//! Transport layer for the connection manager
//!
//! The manager never touches sockets directly. It asks a [`Connector`] to
//! open a link and then talks to that link through two channels: commands
//! going out (send a frame, close) and events coming back (opened, message,
//! error, closed). The production implementation is [`ws::WsConnector`];
//! tests use [`MockConnector`](crate::testing::MockConnector).

use tokio::sync::mpsc;

pub mod ws;

pub use ws::WsConnector;

/// Event reported by one underlying connection, in delivery order
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake finished, frames can flow
    Opened,
    /// Text frame received
    Message(String),
    /// Connection-level error; never drives reconnection by itself
    Error(String),
    /// Connection is gone; always the last event of a link
    Closed { code: Option<u16>, reason: String },
}

/// Command sent by the manager to one underlying connection
#[derive(Debug, Clone, PartialEq)]
pub enum LinkCommand {
    /// Write one text frame
    Send(String),
    /// Start the closing handshake
    Close,
}

/// Manager-side handle of one underlying connection
#[derive(Debug)]
pub struct TransportLink {
    pub commands: mpsc::UnboundedSender<LinkCommand>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Connector-side handle of one underlying connection
#[derive(Debug)]
pub struct LinkEnd {
    pub commands: mpsc::UnboundedReceiver<LinkCommand>,
    pub events: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportLink {
    /// Create a connected pair of link handles
    pub fn pair() -> (TransportLink, LinkEnd) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            TransportLink {
                commands: command_tx,
                events: event_rx,
            },
            LinkEnd {
                commands: command_rx,
                events: event_tx,
            },
        )
    }
}

impl LinkEnd {
    /// Report an event to the manager. Returns false once the manager has
    /// dropped its side of the link.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

/// Opens underlying connections on behalf of the manager
///
/// `open` must not block: it starts establishing the connection and returns
/// the link immediately. Progress is reported through the link's events,
/// ending with exactly one [`TransportEvent::Closed`].
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: &str) -> TransportLink;
}
