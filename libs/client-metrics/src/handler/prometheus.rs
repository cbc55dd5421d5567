//! Prometheus exporter for client-side metrics.
//!
//! Each handler owns its own [`PrometheusRecorder`] rather than installing the
//! process-global one, so handlers for different projects never share series.
//!
//! Recorded series (all latencies in milliseconds):
//! - `<prefix>_operation_latencies` - histogram, per operation
//! - `<prefix>_first_response_latencies` - histogram, per operation with a response
//! - `<prefix>_application_latencies` - histogram, one sample per row read
//! - `<prefix>_retry_count` - counter, only when the operation retried
//! - `<prefix>_attempt_latencies` - histogram, per attempt
//! - `<prefix>_server_latencies` - histogram, per attempt reporting server-timing
//! - `<prefix>_connectivity_error_count` - histogram, per attempt

use super::MetricsHandler;
use crate::attributes::{status_label, MetricAttributes};
use crate::error::{HandlerError, MetricsResult};
use crate::record::{AttemptMetrics, OperationMetrics};
use metrics::{counter, histogram, with_local_recorder, Label};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::time::Duration;
use tracing::debug;

/// Bucket boundaries shared by every latency histogram, in milliseconds.
pub const LATENCY_BUCKETS_MS: &[f64] = &[
    0.0, 0.01, 0.05, 0.1, 0.3, 0.6, 0.8, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 8.0, 10.0, 13.0, 16.0,
    20.0, 25.0, 30.0, 40.0, 50.0, 65.0, 80.0, 100.0, 130.0, 160.0, 200.0, 250.0, 300.0, 400.0,
    500.0, 650.0, 800.0, 1000.0, 2000.0, 5000.0, 10000.0, 20000.0, 50000.0, 100000.0,
];

pub const DEFAULT_METRIC_PREFIX: &str = "bigtable_client";

/// Construction options for [`PrometheusMetricsHandler`]
#[derive(Debug, Clone, PartialEq)]
pub struct PrometheusHandlerOptions {
    /// Prefix prepended to every series name
    pub metric_prefix: String,

    /// Histogram bucket boundaries in milliseconds
    pub latency_buckets_ms: Vec<f64>,

    /// Labels added to every series (e.g. the exporting project)
    pub global_labels: Vec<(String, String)>,
}

impl Default for PrometheusHandlerOptions {
    fn default() -> Self {
        Self {
            metric_prefix: DEFAULT_METRIC_PREFIX.to_string(),
            latency_buckets_ms: LATENCY_BUCKETS_MS.to_vec(),
            global_labels: Vec::new(),
        }
    }
}

impl PrometheusHandlerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metric_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metric_prefix = prefix.into();
        self
    }

    pub fn with_latency_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.latency_buckets_ms = buckets;
        self
    }

    pub fn with_global_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.global_labels.push((key.into(), value.into()));
        self
    }
}

/// Handler that records into a private Prometheus registry.
pub struct PrometheusMetricsHandler {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    prefix: String,
}

impl std::fmt::Debug for PrometheusMetricsHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetricsHandler")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl PrometheusMetricsHandler {
    pub fn new(options: &PrometheusHandlerOptions) -> MetricsResult<Self> {
        let mut builder = PrometheusBuilder::new().set_buckets(&options.latency_buckets_ms)?;
        for (key, value) in &options.global_labels {
            builder = builder.add_global_label(key.clone(), value.clone());
        }
        let recorder = builder.build_recorder();
        let handle = recorder.handle();

        debug!(prefix = %options.metric_prefix, "Prometheus metrics handler created");

        Ok(Self {
            recorder,
            handle,
            prefix: options.metric_prefix.clone(),
        })
    }

    /// Render the current state of every series in Prometheus text format
    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn name(&self, metric: &str) -> String {
        format!("{}_{}", self.prefix, metric)
    }

    fn record_ms(&self, metric: &str, value: Duration, labels: &[Label]) {
        let name = self.name(metric);
        let labels = labels.to_vec();
        with_local_recorder(&self.recorder, || {
            histogram!(name, labels).record(as_millis_f64(value));
        });
    }
}

fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn labels_for(attributes: &MetricAttributes, status: tonic::Code) -> Vec<Label> {
    let mut labels: Vec<Label> = attributes
        .labels()
        .into_iter()
        .map(|(key, value)| Label::new(key, value))
        .collect();
    labels.push(Label::new("status", status_label(status)));
    labels
}

impl MetricsHandler for PrometheusMetricsHandler {
    fn on_operation_complete(&self, record: &OperationMetrics) -> Result<(), HandlerError> {
        let labels = labels_for(&record.attributes, record.status);

        self.record_ms("operation_latencies", record.operation_latency, &labels);
        if let Some(first_response) = record.first_response_latency {
            self.record_ms("first_response_latencies", first_response, &labels);
        }
        for latency in &record.application_latencies {
            self.record_ms("application_latencies", *latency, &labels);
        }
        if record.retry_count > 0 {
            let name = self.name("retry_count");
            let retries = u64::from(record.retry_count);
            let labels = labels.clone();
            with_local_recorder(&self.recorder, || {
                counter!(name, labels).increment(retries);
            });
        }
        Ok(())
    }

    fn on_attempt_complete(&self, record: &AttemptMetrics) -> Result<(), HandlerError> {
        let labels = labels_for(&record.attributes, record.status);

        self.record_ms("attempt_latencies", record.attempt_latency, &labels);
        if let Some(server_latency) = record.server_latency {
            self.record_ms("server_latencies", server_latency, &labels);
        }
        let name = self.name("connectivity_error_count");
        let errors = f64::from(record.connectivity_error_count());
        with_local_recorder(&self.recorder, || {
            histogram!(name, labels).record(errors);
        });
        Ok(())
    }
}
