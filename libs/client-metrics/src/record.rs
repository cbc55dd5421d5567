//! Metrics records handed to every registered handler.

use crate::attributes::MetricAttributes;
use std::time::Duration;
use tonic::Code;

/// Outcome of a single attempt, emitted when the attempt completes.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptMetrics {
    pub attributes: MetricAttributes,
    /// 1-based position of this attempt within its operation.
    pub attempt_number: u32,
    pub status: Code,
    pub attempt_latency: Duration,
    /// Attempt start to first response; `None` if no response arrived.
    pub first_response_latency: Option<Duration>,
    /// Last cumulative value reported through `server-timing`.
    pub server_latency: Option<Duration>,
    pub connectivity_error: bool,
    pub response_count: u64,
}

impl AttemptMetrics {
    pub fn connectivity_error_count(&self) -> u32 {
        u32::from(self.connectivity_error)
    }
}

/// Outcome of a whole operation, emitted once after its last attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationMetrics {
    pub attributes: MetricAttributes,
    pub status: Code,
    pub operation_latency: Duration,
    /// Operation start to the first response of any attempt.
    pub first_response_latency: Option<Duration>,
    pub retry_count: u32,
    pub connectivity_error_count: u32,
    /// Per-row time between availability and consumption, in read order.
    pub application_latencies: Vec<Duration>,
    pub rows_read: u64,
}

impl OperationMetrics {
    /// Total time the caller spent before consuming available rows.
    pub fn application_latency(&self) -> Duration {
        self.application_latencies.iter().sum()
    }
}

/// Lets handlers treat both record kinds uniformly.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricsRecord {
    Attempt(AttemptMetrics),
    Operation(OperationMetrics),
}

impl MetricsRecord {
    pub fn attributes(&self) -> &MetricAttributes {
        match self {
            Self::Attempt(record) => &record.attributes,
            Self::Operation(record) => &record.attributes,
        }
    }

    pub fn status(&self) -> Code {
        match self {
            Self::Attempt(record) => record.status,
            Self::Operation(record) => record.status,
        }
    }

    pub fn as_attempt(&self) -> Option<&AttemptMetrics> {
        match self {
            Self::Attempt(record) => Some(record),
            Self::Operation(_) => None,
        }
    }

    pub fn as_operation(&self) -> Option<&OperationMetrics> {
        match self {
            Self::Operation(record) => Some(record),
            Self::Attempt(_) => None,
        }
    }
}
