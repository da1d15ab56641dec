//! Mock connector for testing
//!
//! [`MockConnector`] hands the manager in-memory links and lets a test play
//! the server side: report the open, push inbound frames, raise errors, and
//! close. Everything the manager sends is recorded per link.

use crate::transport::{Connector, LinkCommand, LinkEnd, TransportEvent, TransportLink};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One link handed out by [`MockConnector::open`]
#[derive(Debug)]
struct MockLink {
    url: String,
    end: Option<LinkEnd>,
    sent: Vec<String>,
    close_requested: bool,
}

impl MockLink {
    /// Move queued commands into the recorders
    fn drain_commands(&mut self) {
        let Some(end) = self.end.as_mut() else {
            return;
        };
        while let Ok(command) = end.commands.try_recv() {
            match command {
                LinkCommand::Send(text) => self.sent.push(text),
                LinkCommand::Close => self.close_requested = true,
            }
        }
    }

    fn emit(&self, event: TransportEvent) -> bool {
        self.end.as_ref().is_some_and(|end| end.emit(event))
    }
}

/// Connector whose links are driven by the test
///
/// Clones share the same recorded links. Links are addressed by the order in
/// which they were opened, starting at 0.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    links: Arc<Mutex<Vec<MockLink>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn links(&self) -> MutexGuard<'_, Vec<MockLink>> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, index: usize, event: TransportEvent) -> bool {
        self.links()
            .get(index)
            .is_some_and(|link| link.emit(event))
    }

    /// Number of underlying connections opened so far
    pub fn open_count(&self) -> usize {
        self.links().len()
    }

    /// Target of every `open`, in order
    pub fn urls(&self) -> Vec<String> {
        self.links().iter().map(|link| link.url.clone()).collect()
    }

    /// Report a successful handshake on link `index`
    pub fn simulate_open(&self, index: usize) -> bool {
        self.emit(index, TransportEvent::Opened)
    }

    /// Deliver an inbound text frame on link `index`
    pub fn simulate_message(&self, index: usize, text: &str) -> bool {
        self.emit(index, TransportEvent::Message(text.to_string()))
    }

    pub fn simulate_error(&self, index: usize, detail: &str) -> bool {
        self.emit(index, TransportEvent::Error(detail.to_string()))
    }

    /// Close link `index` from the server side
    pub fn simulate_close(&self, index: usize, code: Option<u16>, reason: &str) -> bool {
        self.emit(
            index,
            TransportEvent::Closed {
                code,
                reason: reason.to_string(),
            },
        )
    }

    /// Drop the connector side of link `index` without reporting a close
    pub fn drop_link(&self, index: usize) {
        if let Some(link) = self.links().get_mut(index) {
            link.end = None;
        }
    }

    /// Text frames the manager sent on link `index`
    pub fn sent_frames(&self, index: usize) -> Vec<String> {
        let mut links = self.links();
        match links.get_mut(index) {
            Some(link) => {
                link.drain_commands();
                link.sent.clone()
            }
            None => Vec::new(),
        }
    }

    /// Text frames sent across every link
    pub fn all_sent_frames(&self) -> Vec<String> {
        let mut links = self.links();
        links
            .iter_mut()
            .flat_map(|link| {
                link.drain_commands();
                link.sent.clone()
            })
            .collect()
    }

    /// Whether the manager asked link `index` to close
    pub fn close_requested(&self, index: usize) -> bool {
        let mut links = self.links();
        links.get_mut(index).is_some_and(|link| {
            link.drain_commands();
            link.close_requested
        })
    }

    /// Whether the manager released link `index`
    pub fn is_dropped(&self, index: usize) -> bool {
        self.links()
            .get(index)
            .is_some_and(|link| link.end.as_ref().map_or(true, |end| end.events.is_closed()))
    }
}

impl Connector for MockConnector {
    fn open(&self, url: &str) -> TransportLink {
        let (link, end) = TransportLink::pair();
        self.links().push(MockLink {
            url: url.to_string(),
            end: Some(end),
            sent: Vec::new(),
            close_requested: false,
        });
        link
    }
}

/// Let spawned driver and timer tasks run until they block
///
/// Does not advance a paused clock.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
