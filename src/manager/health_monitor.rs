//! Pure reconnection decisions and connection health
//!
//! This module contains pure functions for deciding whether to reconnect,
//! mapping lifecycle events to states, and summarising connection health.

use super::connection::{ConnectionState, ReconnectConfig};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Pure health monitoring and reconnection decision logic
pub struct HealthMonitor;

/// Decision result for reconnection attempts
#[derive(Debug, PartialEq)]
pub enum ReconnectionDecision {
    /// Schedule attempt number `attempt` after `delay`
    Proceed { attempt: u32, delay: Duration },
    /// Abort reconnection - `disconnect` was called
    AbortShutdownRequested,
    /// Abort reconnection - max attempts reached
    AbortMaxAttemptsExceeded,
}

/// Lifecycle events that drive state transitions
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A new link was requested
    ConnectStarted,
    /// The link reported a successful open
    Opened,
    /// The link closed and another attempt is scheduled
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// `disconnect` asked an existing link to close
    CloseRequested,
    /// No more retries
    PermanentFailure(String),
}

/// Health metrics for connection monitoring
#[derive(Debug, Clone, PartialEq)]
pub struct HealthMetrics {
    /// Time since the current link opened
    pub uptime: Option<Duration>,
    /// Time since the last inbound frame
    pub time_since_last_message: Option<Duration>,
    /// Consecutive reconnection attempts since the last open
    pub reconnect_attempts: u32,
    /// Overall health status
    pub is_healthy: bool,
}

impl HealthMonitor {
    /// Decide what to do after an unexpected close (pure function)
    pub fn should_attempt_reconnection(
        current_attempts: u32,
        config: &ReconnectConfig,
        shutdown_requested: bool,
    ) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }

        if current_attempts >= config.max_attempts {
            return ReconnectionDecision::AbortMaxAttemptsExceeded;
        }

        ReconnectionDecision::Proceed {
            attempt: current_attempts + 1,
            delay: config.calculate_backoff_delay(current_attempts),
        }
    }

    /// Determine next state after a lifecycle event (pure function)
    pub fn determine_next_state(event: ConnectionEvent) -> ConnectionState {
        match event {
            ConnectionEvent::ConnectStarted => ConnectionState::Connecting,
            ConnectionEvent::Opened => ConnectionState::Open,
            ConnectionEvent::ReconnectScheduled { attempt, delay } => {
                ConnectionState::Reconnecting { attempt, delay }
            }
            ConnectionEvent::CloseRequested => ConnectionState::Closing,
            ConnectionEvent::PermanentFailure(reason) => ConnectionState::GivenUp(reason),
        }
    }

    /// Calculate health metrics for the connection (pure function)
    pub fn calculate_health_metrics(
        connect_time: Option<Instant>,
        last_message_time: Option<Instant>,
        reconnect_attempts: u32,
    ) -> HealthMetrics {
        let now = Instant::now();

        let uptime = connect_time.map(|t| now.duration_since(t));
        let time_since_last_message = last_message_time.map(|t| now.duration_since(t));

        HealthMetrics {
            uptime,
            time_since_last_message,
            reconnect_attempts,
            is_healthy: uptime.is_some(),
        }
    }

    /// Log connection state transition (pure logging function)
    pub fn log_state_transition(from: &ConnectionState, to: &ConnectionState) {
        match (from, to) {
            (ConnectionState::Connecting, ConnectionState::Open) => {
                info!("Connection established");
            }
            (ConnectionState::Open, ConnectionState::Reconnecting { attempt, delay }) => {
                warn!(
                    "Connection lost, reconnection attempt {} in {}ms",
                    attempt,
                    delay.as_millis()
                );
            }
            (_, ConnectionState::Reconnecting { attempt, delay }) => {
                info!(
                    "Reconnection attempt {} scheduled in {}ms",
                    attempt,
                    delay.as_millis()
                );
            }
            (_, ConnectionState::GivenUp(reason)) => {
                error!("Connection manager gave up: {}", reason);
            }
            _ => {
                info!("Connection state: {} -> {}", from.label(), to.label());
            }
        }
    }

    /// Validate reconnection configuration (pure function)
    pub fn validate_reconnect_config(config: &ReconnectConfig) -> Result<(), String> {
        if config.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".to_string());
        }

        if config.base_delay_ms == 0 {
            return Err("base_delay_ms must be greater than 0".to_string());
        }

        Ok(())
    }
}
