//! Testing utilities and mock implementations
//!
//! Lets the connection manager be exercised without a WebSocket server.

pub mod mocks;

pub use mocks::*;
