//! Metrics handler implementations
//!
//! A handler is a sink for finished records. Tracers call every registered
//! handler synchronously, in registration order.

pub mod logging;
pub mod prometheus;
pub mod recording;

pub use logging::TracingMetricsHandler;
pub use prometheus::{
    DEFAULT_METRIC_PREFIX, LATENCY_BUCKETS_MS, PrometheusHandlerOptions, PrometheusMetricsHandler,
};
pub use recording::RecordingMetricsHandler;

use crate::error::HandlerError;
use crate::record::{AttemptMetrics, OperationMetrics};

/// Sink for finished-operation and finished-attempt records.
///
/// Implementations may buffer, batch, export, or just log. They must be safe
/// to call concurrently from many tracers.
#[cfg_attr(test, mockall::automock)]
pub trait MetricsHandler: Send + Sync {
    /// Called once when an operation completes.
    fn on_operation_complete(&self, record: &OperationMetrics) -> Result<(), HandlerError>;

    /// Called once per attempt, before the owning operation's record.
    fn on_attempt_complete(&self, record: &AttemptMetrics) -> Result<(), HandlerError>;
}
