//! wsrelay - reconnecting realtime connection manager
//!
//! Keeps one logical duplex connection to a message-oriented server open,
//! recovers from unexpected closes with capped exponential backoff, and fans
//! inbound JSON messages out to handlers registered per message type.
//!
//! # Overview
//!
//! - [`manager::ConnectionManager`]: `connect`, `send`, `on`, `off`, `disconnect`
//! - [`transport`]: the [`Connector`](transport::Connector) seam and the
//!   WebSocket implementation
//! - [`config`]: TOML configuration
//! - [`observability`]: logging, metrics and the health server
//! - [`testing`]: a mock connector for driving the manager in tests
//!
//! # Quick Start
//!
//! ```rust
//! use wsrelay::manager::{ConnectionManager, Handler, ReadyState};
//! use wsrelay::testing::{settle, MockConnector};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! tokio_test::block_on(async {
//!     let connector = MockConnector::new();
//!     let manager = ConnectionManager::new(connector.clone());
//!
//!     let seen = Arc::new(AtomicUsize::new(0));
//!     let counter = seen.clone();
//!     manager.on(
//!         "chat-message",
//!         Handler::infallible(move |_| {
//!             counter.fetch_add(1, Ordering::SeqCst);
//!         }),
//!     );
//!
//!     manager.connect("ws://endpoint-a");
//!     connector.simulate_open(0);
//!     connector.simulate_message(0, r#"{"type":"chat-message","text":"hi"}"#);
//!     settle().await;
//!
//!     assert_eq!(manager.ready_state(), Some(ReadyState::Open));
//!     assert_eq!(seen.load(Ordering::SeqCst), 1);
//! });
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod observability;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, ManagerConfig};
pub use error::{ManagerError, ManagerResult, TransportError};
pub use manager::{ConnectionManager, ConnectionState, Handler, InboundMessage, ReadyState};
pub use transport::{Connector, WsConnector};
