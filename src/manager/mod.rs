//! Reconnecting connection manager
//!
//! The manager is split into pure and impure parts:
//!
//! - `connection`: state enumerations and backoff arithmetic
//! - `health_monitor`: reconnect decisions and state transitions
//! - `message_handler`: inbound envelope, handler registry and dispatch
//! - `timer`: owned, cancellable reconnect timer
//! - `client`: the [`ConnectionManager`] tying them to a [`Connector`](crate::transport::Connector)
//!
//! ```rust,no_run
//! use wsrelay::manager::{ConnectionManager, Handler, WILDCARD};
//! use wsrelay::transport::WsConnector;
//!
//! tokio_test::block_on(async {
//!     let manager = ConnectionManager::new(WsConnector::new());
//!     manager.on(
//!         "chat-message",
//!         Handler::infallible(|message| println!("chat: {:?}", message.get("text"))),
//!     );
//!     manager.on(WILDCARD, Handler::infallible(|message| println!("{:?}", message.payload())));
//!
//!     manager.connect("wss://example.org/realtime");
//!     manager.send(&serde_json::json!({"type": "hello"}));
//!     manager.disconnect();
//! });
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;
pub mod timer;

pub use client::ConnectionManager;
pub use connection::{
    ConnectionState, ReadyState, ReconnectConfig, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS,
};
pub use health_monitor::{ConnectionEvent, HealthMetrics, HealthMonitor, ReconnectionDecision};
pub use message_handler::{
    dispatch, DispatchOutcome, Handler, HandlerRegistry, HandlerResult, InboundMessage,
    TYPE_FIELD, WILDCARD,
};
pub use timer::ReconnectTimer;
