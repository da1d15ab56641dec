//! Connection manager: lifecycle, reconnection and message dispatch
//!
//! This module holds the impure half of the manager. The pure decisions live
//! in [`health_monitor`](super::health_monitor) and
//! [`message_handler`](super::message_handler); this file wires them to the
//! transport, the reconnect timer and the Tokio runtime.

use super::connection::{ConnectionState, ReadyState, ReconnectConfig};
use super::health_monitor::{ConnectionEvent, HealthMetrics, HealthMonitor, ReconnectionDecision};
use super::message_handler::{dispatch, Handler, HandlerRegistry, InboundMessage};
use super::timer::ReconnectTimer;
use crate::config::ManagerConfig;
use crate::error::{ManagerError, ManagerResult};
use crate::observability::metrics::{ConnectionMetrics, MetricsSnapshot};
use crate::transport::{Connector, LinkCommand, TransportEvent, TransportLink};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Manages one logical connection with automatic reconnection
///
/// Cloning yields another handle to the same manager. Every operation is
/// synchronous and infallible from the caller's point of view; failures are
/// logged. Operations that open links (`connect`, and the reconnect timer)
/// need a Tokio runtime.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    connector: Arc<dyn Connector>,
    reconnect_config: ReconnectConfig,
    shared: Mutex<Shared>,
    handlers: Mutex<HandlerRegistry>,
    state_tx: watch::Sender<ConnectionState>,
    metrics: ConnectionMetrics,
}

#[derive(Default)]
struct Shared {
    url: Option<String>,
    link: Option<ActiveLink>,
    attempts: u32,
    shutdown: bool,
    pending: Option<ReconnectTimer>,
    next_timer_id: u64,
    connect_time: Option<Instant>,
    last_message_time: Option<Instant>,
}

/// The current underlying connection
struct ActiveLink {
    id: Uuid,
    commands: mpsc::UnboundedSender<LinkCommand>,
    ready: ReadyState,
    driver: JoinHandle<()>,
}

impl Drop for ActiveLink {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConnectionManager {
    /// Create a manager with the default policy (5 attempts, 1s base delay)
    pub fn new<C: Connector>(connector: C) -> Self {
        Self::with_reconnect_config(connector, ReconnectConfig::default())
    }

    pub fn with_reconnect_config<C: Connector>(
        connector: C,
        reconnect_config: ReconnectConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            inner: Arc::new(Inner {
                connector: Arc::new(connector),
                reconnect_config,
                shared: Mutex::new(Shared::default()),
                handlers: Mutex::new(HandlerRegistry::new()),
                state_tx,
                metrics: ConnectionMetrics::new(),
            }),
        }
    }

    /// Create a manager using the `[reconnect]` section of a loaded config
    pub fn from_config<C: Connector>(connector: C, config: &ManagerConfig) -> Self {
        Self::with_reconnect_config(connector, config.reconnect.to_reconnect_config())
    }

    /// Open a connection to `url`
    ///
    /// No-op while the current link is open. Otherwise any pending reconnect
    /// is cancelled and the previous link, if any, is replaced.
    pub fn connect(&self, url: &str) {
        self.inner.connect(url.to_string(), true);
    }

    /// Serialize `payload` as JSON and send it if the link is open
    ///
    /// When the link is not open the message is dropped with a warning; it is
    /// never queued or replayed.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) {
        self.inner.send(payload);
    }

    /// Register `handler` for messages whose `type` equals `message_type`,
    /// or for every message when `message_type` is [`WILDCARD`](super::WILDCARD)
    pub fn on(&self, message_type: &str, handler: Handler) {
        lock(&self.inner.handlers).register(message_type, handler);
        debug!(message_type, "Registered message handler");
    }

    /// Remove the first registration of `handler` under `message_type`
    pub fn off(&self, message_type: &str, handler: &Handler) {
        if lock(&self.inner.handlers).remove(message_type, handler) {
            debug!(message_type, "Removed message handler");
        }
    }

    /// Stop for good: cancel any pending reconnect, close the link and clear
    /// every handler
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// State of the underlying link, `None` when there is no link
    pub fn ready_state(&self) -> Option<ReadyState> {
        lock(&self.inner.shared).link.as_ref().map(|link| link.ready)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state_tx.borrow().clone()
    }

    /// Watch channel following every state transition
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.ready_state() == Some(ReadyState::Open)
    }

    /// Whether automatic reconnection has stopped for good
    pub fn is_given_up(&self) -> bool {
        matches!(self.state(), ConnectionState::GivenUp(_))
    }

    /// Consecutive reconnect attempts since the last successful open
    pub fn reconnect_attempts(&self) -> u32 {
        lock(&self.inner.shared).attempts
    }

    /// Target of the most recent `connect`
    pub fn url(&self) -> Option<String> {
        lock(&self.inner.shared).url.clone()
    }

    pub fn handler_count(&self, message_type: &str) -> usize {
        lock(&self.inner.handlers).count(message_type)
    }

    pub fn reconnect_config(&self) -> &ReconnectConfig {
        &self.inner.reconnect_config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn health_metrics(&self) -> HealthMetrics {
        let shared = lock(&self.inner.shared);
        HealthMonitor::calculate_health_metrics(
            shared.connect_time,
            shared.last_message_time,
            shared.attempts,
        )
    }

    /// Wait until the connection is open, failing on timeout or give-up
    pub async fn wait_until_open(&self, timeout: Duration) -> ManagerResult<()> {
        Self::wait_for_open_state(self.subscribe_state(), timeout).await
    }

    async fn wait_for_open_state(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> ManagerResult<()> {
        let waited = tokio::time::timeout(timeout, async {
            loop {
                match &*state_rx.borrow_and_update() {
                    ConnectionState::Open => return Ok(()),
                    ConnectionState::GivenUp(reason) => {
                        return Err(ManagerError::GaveUp {
                            reason: reason.clone(),
                        })
                    }
                    _ => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(ManagerError::GaveUp {
                        reason: "connection manager dropped".to_string(),
                    });
                }
            }
        })
        .await;

        match waited {
            Ok(result) => result,
            Err(_) => Err(ManagerError::Timeout {
                waited_ms: millis_saturating(timeout),
            }),
        }
    }
}

fn millis_saturating(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Inner {
    fn set_state(&self, event: ConnectionEvent) {
        let next = HealthMonitor::determine_next_state(event);
        let previous = self.state_tx.send_replace(next.clone());
        if previous != next {
            HealthMonitor::log_state_transition(&previous, &next);
        }
    }

    fn connect(self: &Arc<Self>, url: String, explicit: bool) {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                error!(url = %url, "Cannot connect: {}", ManagerError::RuntimeUnavailable);
                return;
            }
        };

        let mut shared = lock(&self.shared);

        if !explicit && shared.shutdown {
            debug!(url = %url, "Disconnected while reconnect was starting; not reopening");
            return;
        }

        if let Some(link) = &shared.link {
            if link.ready == ReadyState::Open {
                debug!(connection_id = %link.id, "Already connected, ignoring connect");
                return;
            }
        }

        if explicit {
            if let Some(timer) = shared.pending.take() {
                timer.cancel();
            }
            shared.shutdown = false;
        }

        let link_id = Uuid::new_v4();
        let TransportLink { commands, events } = self.connector.open(&url);
        let span = crate::connection_span!(connection_id = %link_id, url = %url);
        let driver = runtime.spawn(drive_link(Arc::downgrade(self), link_id, events).instrument(span));

        // Replacing the previous link drops its command sender and aborts its driver
        shared.link = Some(ActiveLink {
            id: link_id,
            commands,
            ready: ReadyState::Connecting,
            driver,
        });
        shared.url = Some(url.clone());
        shared.connect_time = None;
        self.metrics.connect_attempted();
        self.set_state(ConnectionEvent::ConnectStarted);

        info!(
            connection_id = %link_id,
            url = %url,
            attempt = shared.attempts,
            "Connecting"
        );
    }

    fn send<T: Serialize + ?Sized>(&self, payload: &T) {
        // The payload's Serialize impl runs unlocked; it may call back into the manager
        let open_link = lock(&self.shared)
            .link
            .as_ref()
            .filter(|link| link.ready == ReadyState::Open)
            .map(|link| (link.id, link.commands.clone()));

        let Some((link_id, commands)) = open_link else {
            let state = self.state_tx.borrow().clone();
            warn!(
                "{}; dropping outbound message",
                ManagerError::NotConnected { state }
            );
            self.metrics.message_dropped();
            return;
        };

        let text = match serde_json::to_string(payload) {
            Ok(text) => text,
            Err(e) => {
                let detail = e.to_string();
                error!(error = %detail, "{}; dropping outbound message", ManagerError::Serialize(e));
                self.metrics.message_dropped();
                return;
            }
        };

        if commands.send(LinkCommand::Send(text)).is_err() {
            warn!(connection_id = %link_id, "Transport task is gone; dropping outbound message");
            self.metrics.message_dropped();
            return;
        }

        self.metrics.message_sent();
    }

    fn disconnect(&self) {
        {
            let mut shared = lock(&self.shared);

            if let Some(timer) = shared.pending.take() {
                timer.cancel();
            }
            shared.attempts = self.reconnect_config.max_attempts;
            shared.shutdown = true;

            let closing = match shared.link.as_mut() {
                Some(link) if link.ready != ReadyState::Closed => {
                    link.ready = ReadyState::Closing;
                    link.commands.send(LinkCommand::Close).is_ok()
                }
                _ => false,
            };

            if closing {
                self.set_state(ConnectionEvent::CloseRequested);
            } else {
                shared.link = None;
                shared.connect_time = None;
                self.set_state(ConnectionEvent::PermanentFailure(
                    "disconnected by caller".to_string(),
                ));
            }
        }

        lock(&self.handlers).clear();
        info!("Connection manager disconnected");
    }

    fn handle_event(self: &Arc<Self>, link_id: Uuid, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.on_open(link_id),
            TransportEvent::Message(text) => self.on_message(link_id, &text),
            TransportEvent::Error(detail) => self.on_transport_error(link_id, &detail),
            TransportEvent::Closed { code, reason } => self.on_close(link_id, code, &reason),
        }
    }

    fn on_open(&self, link_id: Uuid) {
        let mut shared = lock(&self.shared);
        if shared.shutdown {
            debug!("Link opened after disconnect; leaving it closing");
            return;
        }
        let Some(link) = shared.link.as_mut().filter(|link| link.id == link_id) else {
            debug!("Ignoring open event from a superseded link");
            return;
        };

        link.ready = ReadyState::Open;
        shared.attempts = 0;
        shared.connect_time = Some(Instant::now());
        self.metrics.connection_opened();
        self.set_state(ConnectionEvent::Opened);
    }

    fn on_message(&self, link_id: Uuid, text: &str) {
        {
            let mut shared = lock(&self.shared);
            if !shared.link.as_ref().is_some_and(|link| link.id == link_id) {
                debug!("Ignoring message from a superseded link");
                return;
            }
            shared.last_message_time = Some(Instant::now());
        }
        self.metrics.message_received();

        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                error!(bytes = text.len(), "Dropping inbound frame: {}", e);
                self.metrics.parse_error();
                return;
            }
        };

        // Handlers may call on/off; they see the registry as of now
        let handlers = lock(&self.handlers).snapshot(message.message_type());
        let _span = crate::dispatch_span!(
            message_type = message.message_type().unwrap_or("<none>"),
            handlers = handlers.len()
        )
        .entered();
        let outcome = dispatch(&handlers, &message);
        self.metrics.handlers_invoked(outcome.invoked, outcome.failed);
    }

    fn on_transport_error(&self, link_id: Uuid, detail: &str) {
        warn!(connection_id = %link_id, "Transport error: {}", detail);
        self.metrics.transport_error();
    }

    fn on_close(self: &Arc<Self>, link_id: Uuid, code: Option<u16>, reason: &str) {
        let mut shared = lock(&self.shared);
        if !shared.link.as_ref().is_some_and(|link| link.id == link_id) {
            debug!(?code, "Ignoring close event from a superseded link");
            return;
        }

        self.metrics.connection_closed();
        shared.connect_time = None;
        if let Some(link) = shared.link.as_mut() {
            link.ready = ReadyState::Closed;
        }
        info!(?code, reason, "Connection closed");

        let decision = HealthMonitor::should_attempt_reconnection(
            shared.attempts,
            &self.reconnect_config,
            shared.shutdown,
        );

        match decision {
            ReconnectionDecision::Proceed { attempt, delay } => {
                let timer_id = shared.next_timer_id;
                shared.next_timer_id += 1;

                let weak = Arc::downgrade(self);
                shared.pending = Some(ReconnectTimer::schedule(
                    timer_id,
                    attempt,
                    delay,
                    move || {
                        if let Some(inner) = weak.upgrade() {
                            inner.fire_reconnect(timer_id);
                        }
                    },
                ));
                self.metrics.reconnect_scheduled();
                self.set_state(ConnectionEvent::ReconnectScheduled { attempt, delay });
            }
            ReconnectionDecision::AbortShutdownRequested => {
                // Explicit disconnect: tear the handle down completely
                shared.link = None;
                self.set_state(ConnectionEvent::PermanentFailure(
                    "disconnected by caller".to_string(),
                ));
            }
            ReconnectionDecision::AbortMaxAttemptsExceeded => {
                self.set_state(ConnectionEvent::PermanentFailure(format!(
                    "max reconnection attempts ({}) reached",
                    self.reconnect_config.max_attempts
                )));
            }
        }
    }

    fn fire_reconnect(self: &Arc<Self>, timer_id: u64) {
        if let Some(url) = self.claim_reconnect(timer_id) {
            self.connect(url, false);
        }
    }

    /// Take the pending timer if it is still `timer_id` and count the attempt
    fn claim_reconnect(&self, timer_id: u64) -> Option<String> {
        let mut shared = lock(&self.shared);
        match shared.pending.take() {
            Some(timer) if timer.id() == timer_id => timer.disarm(),
            other => {
                // Cancelled or replaced while the callback was starting
                shared.pending = other;
                return None;
            }
        }
        shared.attempts += 1;

        if shared.url.is_none() {
            warn!("Reconnect fired without a connection target");
        }
        shared.url.clone()
    }
}

/// Feed one link's events to the manager until the link closes
async fn drive_link(
    inner: Weak<Inner>,
    link_id: Uuid,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let closed = matches!(event, TransportEvent::Closed { .. });
        let Some(manager) = inner.upgrade() else {
            return;
        };
        manager.handle_event(link_id, event);
        if closed {
            return;
        }
    }

    // Connector dropped its end without reporting a close
    if let Some(manager) = inner.upgrade() {
        manager.handle_event(
            link_id,
            TransportEvent::Closed {
                code: None,
                reason: "transport ended without close".to_string(),
            },
        );
    }
}
