//! Thread-safe connection metrics
//!
//! Each [`ConnectionManager`](crate::manager::ConnectionManager) owns one
//! [`ConnectionMetrics`]; there is no process-wide collector. Counters are
//! atomics so the driver task, timer task and callers can update them
//! without taking the manager's locks.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Atomic counters for one connection manager
#[derive(Debug)]
pub struct ConnectionMetrics {
    connect_attempts: AtomicU64,
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    reconnects_scheduled: AtomicU64,
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
    parse_errors: AtomicU64,
    handler_invocations: AtomicU64,
    handler_errors: AtomicU64,
    transport_errors: AtomicU64,
    created_at: u64,
    last_opened_at: AtomicU64,
}

impl Default for ConnectionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMetrics {
    pub fn new() -> Self {
        Self {
            connect_attempts: AtomicU64::new(0),
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            reconnects_scheduled: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            handler_invocations: AtomicU64::new(0),
            handler_errors: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            created_at: current_timestamp(),
            last_opened_at: AtomicU64::new(0),
        }
    }

    pub fn connect_attempted(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
        self.last_opened_at
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnect_scheduled(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handlers_invoked(&self, invoked: usize, failed: usize) {
        self.handler_invocations
            .fetch_add(invoked as u64, Ordering::Relaxed);
        self.handler_errors
            .fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub fn transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let last_opened = self.last_opened_at.load(Ordering::Relaxed);
        MetricsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            handler_invocations: self.handler_invocations.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            uptime_seconds: current_timestamp().saturating_sub(self.created_at),
            last_opened_at: (last_opened != 0).then_some(last_opened),
        }
    }
}

/// Serializable view of [`ConnectionMetrics`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub connect_attempts: u64,
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub reconnects_scheduled: u64,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub parse_errors: u64,
    pub handler_invocations: u64,
    pub handler_errors: u64,
    pub transport_errors: u64,
    pub uptime_seconds: u64,
    pub last_opened_at: Option<u64>,
}

pub(crate) fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
