//! Pure connection state and reconnection configuration
//!
//! This module contains the state enumerations observed by callers and the
//! backoff arithmetic. Nothing here performs I/O.

use std::time::Duration;

/// Default cap on consecutive automatic reconnection attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first reconnection attempt
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Lifecycle state of the connection manager
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Constructed, `connect` not called yet
    Idle,
    /// A link is being established
    Connecting,
    /// Link open, frames flow both ways
    Open,
    /// `disconnect` asked the link to close; waiting for the close event
    Closing,
    /// Closed unexpectedly; a reconnect is scheduled
    Reconnecting { attempt: u32, delay: Duration },
    /// No further automatic reconnects will happen
    GivenUp(String),
}

impl ConnectionState {
    /// Short lowercase label for logs, metrics and health output
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Reconnecting { .. } => "reconnecting",
            ConnectionState::GivenUp(_) => "given_up",
        }
    }
}

/// State of the underlying link, mirroring the WebSocket `readyState`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Reconnection configuration
///
/// Delays follow `base_delay_ms * 2^attempts` with no jitter: 1s, 2s, 4s, 8s
/// and 16s with the defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive reconnection attempts
    pub max_attempts: u32,
    /// Delay before the first attempt, doubled for every attempt after it
    pub base_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay to wait when `attempts` reconnects have already fired
    pub fn calculate_backoff_delay(&self, attempts: u32) -> Duration {
        let factor = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    /// Total time spent waiting if every attempt is used
    pub fn calculate_max_total_time(&self) -> Duration {
        (0..self.max_attempts)
            .map(|attempt| self.calculate_backoff_delay(attempt))
            .fold(Duration::ZERO, |total, delay| total.saturating_add(delay))
    }
}
