//! Handler that emits records as structured `tracing` events.

use super::MetricsHandler;
use crate::error::HandlerError;
use crate::record::{AttemptMetrics, OperationMetrics};
use tracing::info;

/// Logs each record at `info` under the `client_metrics` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricsHandler;

impl TracingMetricsHandler {
    pub fn new() -> Self {
        Self
    }
}

fn millis(duration: Option<std::time::Duration>) -> Option<u128> {
    duration.map(|d| d.as_millis())
}

impl MetricsHandler for TracingMetricsHandler {
    fn on_operation_complete(&self, record: &OperationMetrics) -> Result<(), HandlerError> {
        let attrs = &record.attributes;
        info!(
            target: "client_metrics",
            method = %attrs.method,
            status = ?record.status,
            table = %attrs.table_id,
            instance = %attrs.instance_id,
            cluster = %attrs.cluster_label(),
            zone = %attrs.zone_label(),
            series = %attrs.to_label_string(),
            operation_latency_ms = record.operation_latency.as_millis() as u64,
            first_response_latency_ms = ?millis(record.first_response_latency),
            application_latency_ms = record.application_latency().as_millis() as u64,
            retry_count = record.retry_count,
            connectivity_error_count = record.connectivity_error_count,
            rows_read = record.rows_read,
            "Operation complete"
        );
        Ok(())
    }

    fn on_attempt_complete(&self, record: &AttemptMetrics) -> Result<(), HandlerError> {
        let attrs = &record.attributes;
        info!(
            target: "client_metrics",
            method = %attrs.method,
            status = ?record.status,
            table = %attrs.table_id,
            attempt = record.attempt_number,
            series = %attrs.to_label_string(),
            attempt_latency_ms = record.attempt_latency.as_millis() as u64,
            first_response_latency_ms = ?millis(record.first_response_latency),
            server_latency_ms = ?millis(record.server_latency),
            connectivity_error = record.connectivity_error,
            responses = record.response_count,
            "Attempt complete"
        );
        Ok(())
    }
}
