//! Observability: structured logging, per-manager metrics and the health server

pub mod health;
pub mod logging;
pub mod metrics;

pub use health::HealthServer;
pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{ConnectionMetrics, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{connection_span, dispatch_span};
