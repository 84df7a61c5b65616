//! Prometheus metrics and structured logging for pmpool.
//!
//! - Prometheus metrics for pool operations, rejections and volumes
//! - Structured logging with tracing (JSON in production, pretty otherwise)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
