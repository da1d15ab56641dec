//! Health check HTTP server
//!
//! Exposes the state of one [`ConnectionManager`] to operators and container
//! orchestration platforms.

use crate::manager::{ConnectionManager, ConnectionState};
use crate::observability::metrics::current_timestamp;
use serde::Serialize;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

/// Seconds without an inbound frame after which an open connection counts as stale
const MESSAGE_STALENESS_THRESHOLD_SECONDS: u64 = 300;

/// HTTP health check server
pub struct HealthServer {
    manager: ConnectionManager,
    port: u16,
}

impl HealthServer {
    pub fn new(manager: ConnectionManager, port: u16) -> Self {
        Self { manager, port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Every route served by [`start`](Self::start)
    pub fn routes(&self) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        let with_manager = {
            let manager = self.manager.clone();
            warp::any().map(move || manager.clone())
        };

        // GET /health - overall status with individual checks
        let health_route = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .and(with_manager.clone())
            .and_then(|manager: ConnectionManager| async move {
                let status = health_status(&manager);
                let code = if status.status == "healthy" {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                Ok::<_, Infallible>(warp::reply::with_status(warp::reply::json(&status), code))
            });

        // GET /metrics - counter snapshot
        let metrics_route = warp::path("metrics")
            .and(warp::path::end())
            .and(warp::get())
            .and(with_manager.clone())
            .and_then(|manager: ConnectionManager| async move {
                Ok::<_, Infallible>(warp::reply::json(&manager.metrics()))
            });

        // GET /ready - ready only while the link is open
        let ready_route = warp::path("ready")
            .and(warp::path::end())
            .and(warp::get())
            .and(with_manager)
            .and_then(|manager: ConnectionManager| async move {
                let ready = manager.is_connected();
                let response = ReadinessResponse {
                    ready,
                    state: manager.state().label(),
                    timestamp: current_timestamp(),
                };
                let code = if ready {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                Ok::<_, Infallible>(warp::reply::with_status(warp::reply::json(&response), code))
            });

        // GET /live - process liveness
        let live_route = warp::path("live")
            .and(warp::path::end())
            .and(warp::get())
            .map(|| {
                warp::reply::json(&LivenessResponse {
                    alive: true,
                    timestamp: current_timestamp(),
                })
            });

        // GET / - endpoint index
        let root_route = warp::path::end().and(warp::get()).map(|| {
            let endpoints = BTreeMap::from([
                ("/health", "Overall connection health with detailed checks"),
                ("/metrics", "Connection counters"),
                ("/ready", "Readiness probe: 200 only while connected"),
                ("/live", "Liveness probe"),
            ]);
            warp::reply::json(&ApiDocumentationResponse { endpoints })
        });

        health_route
            .or(metrics_route)
            .or(ready_route)
            .or(live_route)
            .or(root_route)
            .with(warp::cors().allow_any_origin())
    }

    /// Serve until the task is dropped
    pub async fn start(self) {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!("Starting health server on port {}", self.port);
        warp::serve(self.routes()).run(addr).await;
    }
}

fn connection_check(state: &ConnectionState, now: u64) -> HealthCheck {
    let (status, message) = match state {
        ConnectionState::Open => ("healthy", "Connection open".to_string()),
        ConnectionState::Idle => ("unhealthy", "Not connected yet".to_string()),
        ConnectionState::Connecting => ("degraded", "Connecting".to_string()),
        ConnectionState::Closing => ("unhealthy", "Closing".to_string()),
        ConnectionState::Reconnecting { attempt, delay } => (
            "degraded",
            format!("Reconnect attempt {attempt} in {}ms", delay.as_millis()),
        ),
        ConnectionState::GivenUp(reason) => ("unhealthy", format!("Gave up: {reason}")),
    };

    HealthCheck {
        status: status.to_string(),
        message: Some(message),
        last_check: now,
    }
}

fn message_flow_check(seconds_since_last_message: Option<u64>, now: u64) -> HealthCheck {
    let (status, message) = match seconds_since_last_message {
        None => ("healthy", "No messages received yet".to_string()),
        Some(idle) if idle > MESSAGE_STALENESS_THRESHOLD_SECONDS => {
            ("stale", format!("No inbound messages for {idle} seconds"))
        }
        Some(_) => ("healthy", "Recent inbound activity".to_string()),
    };

    HealthCheck {
        status: status.to_string(),
        message: Some(message),
        last_check: now,
    }
}

fn health_status(manager: &ConnectionManager) -> HealthStatus {
    let now = current_timestamp();
    let state = manager.state();
    let health = manager.health_metrics();

    let mut checks = BTreeMap::new();
    checks.insert("connection", connection_check(&state, now));
    checks.insert(
        "message_flow",
        message_flow_check(health.time_since_last_message.map(|d| d.as_secs()), now),
    );

    let status = if checks.values().all(|check| check.status == "healthy") {
        "healthy"
    } else if matches!(state, ConnectionState::GivenUp(_) | ConnectionState::Idle) {
        "unhealthy"
    } else {
        "degraded"
    };

    HealthStatus {
        status: status.to_string(),
        timestamp: now,
        url: manager.url(),
        state: state.label(),
        reconnect_attempts: health.reconnect_attempts,
        uptime_seconds: health.uptime.map(|d| d.as_secs()),
        checks,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: Option<String>,
    pub last_check: u64,
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: String,
    timestamp: u64,
    url: Option<String>,
    state: &'static str,
    reconnect_attempts: u32,
    uptime_seconds: Option<u64>,
    checks: BTreeMap<&'static str, HealthCheck>,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    state: &'static str,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct ApiDocumentationResponse {
    endpoints: BTreeMap<&'static str, &'static str>,
}
