//! Per-operation metrics tracer.
//!
//! A [`MetricsTracer`] follows one logical operation through its attempts and
//! turns timestamped lifecycle calls into [`AttemptMetrics`] and
//! [`OperationMetrics`] records. It is driven synchronously from transport
//! callbacks and owns all of its state, so it needs no locking.
//!
//! Calls out of order are rejected with [`MetricsError::InvalidTransition`]
//! and leave the tracer untouched.
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut tracer = factory.tracer(&table, MethodName::ReadRows)?;
//! tracer.on_operation_start()?;
//! tracer.on_attempt_start()?;
//! tracer.on_metadata_received(response.metadata())?;
//! tracer.on_response()?;
//! tracer.on_read()?;
//! tracer.on_status(&status)?;
//! tracer.on_operation_complete(Code::Ok)?;
//! ```

mod state;

pub use state::{LifecycleEvent, TracerState};

use crate::attributes::MetricAttributes;
use crate::clock::{elapsed, Clock};
use crate::error::{MetricsError, MetricsResult};
use crate::handler::MetricsHandler;
use crate::metadata;
use crate::record::{AttemptMetrics, OperationMetrics};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tonic::Code;
use tonic::metadata::MetadataMap;
use tracing::{debug, trace, warn};

/// Caller-supplied outcome of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptCompleteInfo {
    pub status: Code,
    /// The attempt failed before reaching the service.
    pub connectivity_error: bool,
}

impl AttemptCompleteInfo {
    pub fn new(status: Code) -> Self {
        Self {
            status,
            connectivity_error: false,
        }
    }

    pub fn with_connectivity_error(mut self) -> Self {
        self.connectivity_error = true;
        self
    }
}

impl From<Code> for AttemptCompleteInfo {
    fn from(status: Code) -> Self {
        Self::new(status)
    }
}

impl From<&tonic::Status> for AttemptCompleteInfo {
    fn from(status: &tonic::Status) -> Self {
        Self::new(status.code())
    }
}

/// Caller-supplied outcome of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationCompleteInfo {
    pub status: Code,
    /// Overrides the count summed from attempt flags when set.
    pub connectivity_error_count: Option<u32>,
}

impl OperationCompleteInfo {
    pub fn new(status: Code) -> Self {
        Self {
            status,
            connectivity_error_count: None,
        }
    }

    pub fn with_connectivity_error_count(mut self, count: u32) -> Self {
        self.connectivity_error_count = Some(count);
        self
    }
}

impl From<Code> for OperationCompleteInfo {
    fn from(status: Code) -> Self {
        Self::new(status)
    }
}

impl From<&tonic::Status> for OperationCompleteInfo {
    fn from(status: &tonic::Status) -> Self {
        Self::new(status.code())
    }
}

#[derive(Debug)]
struct AttemptState {
    start: DateTime<Utc>,
    first_response_latency: Option<Duration>,
    server_latency: Option<Duration>,
    headers_received: bool,
    response_count: u64,
}

impl AttemptState {
    fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            first_response_latency: None,
            server_latency: None,
            headers_received: false,
            response_count: 0,
        }
    }

    /// Headers arrived but none reported a server duration, so the response
    /// did not pass through the service frontend.
    fn missing_server_timing(&self) -> bool {
        self.headers_received && self.server_latency.is_none()
    }
}

/// State machine for one logical operation. Not reusable.
pub struct MetricsTracer {
    state: TracerState,
    attributes: MetricAttributes,
    handlers: Vec<Arc<dyn MetricsHandler>>,
    clock: Arc<dyn Clock>,
    operation_start: Option<DateTime<Utc>>,
    first_response_latency: Option<Duration>,
    attempt: Option<AttemptState>,
    attempt_count: u32,
    connectivity_errors: u32,
    available_rows: VecDeque<DateTime<Utc>>,
    application_latencies: Vec<Duration>,
    rows_read: u64,
}

impl std::fmt::Debug for MetricsTracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsTracer")
            .field("state", &self.state)
            .field("method", &self.attributes.method)
            .field("attempt_count", &self.attempt_count)
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

impl MetricsTracer {
    /// Build an idle tracer. Usually obtained from
    /// [`MetricsTracerFactory`](crate::MetricsTracerFactory).
    pub fn new(
        attributes: MetricAttributes,
        handlers: Vec<Arc<dyn MetricsHandler>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: TracerState::Idle,
            attributes,
            handlers,
            clock,
            operation_start: None,
            first_response_latency: None,
            attempt: None,
            attempt_count: 0,
            connectivity_errors: 0,
            available_rows: VecDeque::new(),
            application_latencies: Vec::new(),
            rows_read: 0,
        }
    }

    pub fn state(&self) -> TracerState {
        self.state
    }

    /// Tags as currently known, including any decoded zone/cluster.
    pub fn attributes(&self) -> &MetricAttributes {
        &self.attributes
    }

    /// Number of attempts started so far.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Records the operation start time.
    pub fn on_operation_start(&mut self) -> MetricsResult<()> {
        self.check(LifecycleEvent::OperationStart)?;
        self.operation_start = Some(self.clock.now());
        self.state = TracerState::OperationStarted;
        trace!(method = %self.attributes.method, "Operation started");
        Ok(())
    }

    /// Opens a new attempt. The previous attempt must already be complete.
    pub fn on_attempt_start(&mut self) -> MetricsResult<()> {
        self.check(LifecycleEvent::AttemptStart)?;
        self.attempt = Some(AttemptState::new(self.clock.now()));
        self.attempt_count += 1;
        self.state = TracerState::AttemptStarted;
        trace!(
            method = %self.attributes.method,
            attempt = self.attempt_count,
            "Attempt started"
        );
        Ok(())
    }

    /// Reads the zone and cluster from the response params trailer.
    ///
    /// Only the first decodable payload is used. A missing or malformed
    /// payload leaves the location unknown.
    pub fn on_status_received(&mut self, trailers: &MetadataMap) -> MetricsResult<()> {
        self.check(LifecycleEvent::StatusReceived)?;
        if self.attributes.zone.is_some() && self.attributes.cluster.is_some() {
            return Ok(());
        }
        if let Some(location) = metadata::cluster_location(trailers) {
            if self.attributes.zone.is_none() {
                self.attributes.zone = location.zone;
            }
            if self.attributes.cluster.is_none() {
                self.attributes.cluster = location.cluster;
            }
            debug!(
                zone = %self.attributes.zone_label(),
                cluster = %self.attributes.cluster_label(),
                "Resolved serving location"
            );
        }
        Ok(())
    }

    /// [`on_status_received`](Self::on_status_received) for a full status.
    pub fn on_status(&mut self, status: &tonic::Status) -> MetricsResult<()> {
        self.on_status_received(status.metadata())
    }

    /// Captures the cumulative server processing time from `server-timing`.
    ///
    /// The server reports a running total, so the last value wins.
    pub fn on_metadata_received(&mut self, headers: &MetadataMap) -> MetricsResult<()> {
        self.check(LifecycleEvent::MetadataReceived)?;
        let attempt = self.open_attempt(LifecycleEvent::MetadataReceived)?;
        attempt.headers_received = true;
        if let Some(server_latency) = metadata::server_timing(headers) {
            attempt.server_latency = Some(server_latency);
        }
        Ok(())
    }

    /// One row became available to the transport layer.
    pub fn on_response(&mut self) -> MetricsResult<()> {
        self.check(LifecycleEvent::Response)?;
        let now = self.clock.now();
        let attempt = self.open_attempt(LifecycleEvent::Response)?;
        attempt.response_count += 1;
        if attempt.first_response_latency.is_none() {
            attempt.first_response_latency = Some(elapsed(attempt.start, now));
        }
        if self.first_response_latency.is_none() {
            if let Some(start) = self.operation_start {
                self.first_response_latency = Some(elapsed(start, now));
            }
        }
        self.available_rows.push_back(now);
        Ok(())
    }

    /// The caller consumed the oldest available row.
    pub fn on_read(&mut self) -> MetricsResult<()> {
        self.check(LifecycleEvent::Read)?;
        let Some(available_at) = self.available_rows.pop_front() else {
            warn!(rows_read = self.rows_read, "Row read before any row was available");
            return Err(MetricsError::UnmatchedRead {
                rows_read: self.rows_read,
            });
        };
        let now = self.clock.now();
        self.application_latencies.push(elapsed(available_at, now));
        self.rows_read += 1;
        Ok(())
    }

    /// Closes the current attempt and emits its record to every handler.
    pub fn on_attempt_complete(
        &mut self,
        info: impl Into<AttemptCompleteInfo>,
    ) -> MetricsResult<()> {
        self.check(LifecycleEvent::AttemptComplete)?;
        let end = self.clock.now();
        self.finish_attempt(info.into(), end)
    }

    /// Closes the operation and emits its record to every handler.
    ///
    /// An attempt still in flight is completed first with the operation's
    /// status and the same end time.
    pub fn on_operation_complete(
        &mut self,
        info: impl Into<OperationCompleteInfo>,
    ) -> MetricsResult<()> {
        self.check(LifecycleEvent::OperationComplete)?;
        let info = info.into();
        let end = self.clock.now();
        if self.state == TracerState::AttemptStarted {
            self.finish_attempt(AttemptCompleteInfo::new(info.status), end)?;
        }
        let start = self.operation_start.ok_or(MetricsError::InvalidTransition {
            event: LifecycleEvent::OperationComplete,
            state: self.state,
        })?;

        let record = OperationMetrics {
            attributes: self.attributes.clone(),
            status: info.status,
            operation_latency: elapsed(start, end),
            first_response_latency: self.first_response_latency,
            retry_count: self.attempt_count.saturating_sub(1),
            connectivity_error_count: info
                .connectivity_error_count
                .unwrap_or(self.connectivity_errors),
            application_latencies: std::mem::take(&mut self.application_latencies),
            rows_read: self.rows_read,
        };
        self.state = TracerState::OperationCompleted;

        if !self.available_rows.is_empty() {
            debug!(
                unread = self.available_rows.len(),
                "Operation completed with rows never read"
            );
        }
        trace!(
            method = %record.attributes.method,
            retries = record.retry_count,
            latency_ms = record.operation_latency.as_millis() as u64,
            "Operation complete"
        );

        for (index, handler) in self.handlers.iter().enumerate() {
            handler
                .on_operation_complete(&record)
                .map_err(|source| MetricsError::Handler { index, source })?;
        }
        Ok(())
    }

    fn finish_attempt(
        &mut self,
        info: AttemptCompleteInfo,
        end: DateTime<Utc>,
    ) -> MetricsResult<()> {
        let attempt = self.attempt.take().ok_or(MetricsError::InvalidTransition {
            event: LifecycleEvent::AttemptComplete,
            state: self.state,
        })?;
        let connectivity_error = info.connectivity_error || attempt.missing_server_timing();
        if connectivity_error {
            self.connectivity_errors += 1;
        }

        let record = AttemptMetrics {
            attributes: self.attributes.clone(),
            attempt_number: self.attempt_count,
            status: info.status,
            attempt_latency: elapsed(attempt.start, end),
            first_response_latency: attempt.first_response_latency,
            server_latency: attempt.server_latency,
            connectivity_error,
            response_count: attempt.response_count,
        };
        self.state = TracerState::AttemptCompleted;

        trace!(
            method = %record.attributes.method,
            attempt = record.attempt_number,
            status = ?record.status,
            "Attempt complete"
        );

        for (index, handler) in self.handlers.iter().enumerate() {
            handler
                .on_attempt_complete(&record)
                .map_err(|source| MetricsError::Handler { index, source })?;
        }
        Ok(())
    }

    fn open_attempt(&mut self, event: LifecycleEvent) -> MetricsResult<&mut AttemptState> {
        let state = self.state;
        self.attempt
            .as_mut()
            .ok_or(MetricsError::InvalidTransition { event, state })
    }

    fn check(&self, event: LifecycleEvent) -> MetricsResult<()> {
        if event.is_allowed_in(self.state) {
            return Ok(());
        }
        warn!(
            event = %event,
            state = %self.state,
            method = %self.attributes.method,
            "Rejected metrics lifecycle call"
        );
        Err(MetricsError::InvalidTransition {
            event,
            state: self.state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{MethodName, StreamingState};
    use crate::clock::ScriptedClock;
    use crate::handler::{MockMetricsHandler, RecordingMetricsHandler};
    use crate::metadata::{ResponseParams, INSTANCE_INFORMATION_KEY, SERVER_TIMING_KEY};
    use mockall::Sequence;
    use prost::Message;
    use tonic::metadata::MetadataValue;

    fn attributes() -> MetricAttributes {
        MetricAttributes {
            project_id: Some("my-project".into()),
            instance_id: "fakeInstanceId".into(),
            table_id: "fakeTableId".into(),
            app_profile_id: None,
            cluster: None,
            zone: None,
            method: MethodName::ReadRows,
            streaming: StreamingState::Streaming,
            client_name: "rust-bigtable".into(),
            client_uid: "fake-uuid".into(),
        }
    }

    fn tracer_with(
        millis: impl IntoIterator<Item = i64>,
    ) -> (MetricsTracer, Arc<RecordingMetricsHandler>) {
        let handler = Arc::new(RecordingMetricsHandler::new());
        let clock = Arc::new(ScriptedClock::from_millis(millis));
        let handlers: Vec<Arc<dyn MetricsHandler>> = vec![handler.clone()];
        let tracer = MetricsTracer::new(attributes(), handlers, clock);
        (tracer, handler)
    }

    fn headers(duration: &str) -> MetadataMap {
        let mut map = MetadataMap::new();
        map.insert(SERVER_TIMING_KEY, format!("gfet4t7; dur={duration}").parse().unwrap());
        map
    }

    fn trailers(zone: &str, cluster: &str) -> MetadataMap {
        let payload = ResponseParams {
            zone_id: Some(zone.into()),
            cluster_id: Some(cluster.into()),
        }
        .encode_to_vec();
        let mut map = MetadataMap::new();
        map.insert_bin(INSTANCE_INFORMATION_KEY, MetadataValue::from_bytes(&payload));
        map
    }

    #[test]
    fn test_single_attempt_latencies() {
        let (mut tracer, handler) = tracer_with([100, 150, 190, 190, 400]);
        tracer.on_operation_start().unwrap();
        tracer.on_attempt_start().unwrap();
        tracer.on_response().unwrap();
        tracer.on_attempt_complete(Code::Ok).unwrap();
        tracer.on_operation_complete(Code::Ok).unwrap();

        let attempts = handler.attempts();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].attempt_latency, Duration::from_millis(40));
        assert_eq!(attempts[0].first_response_latency, Some(Duration::from_millis(40)));
        assert_eq!(attempts[0].response_count, 1);

        let operation = &handler.operations()[0];
        assert_eq!(operation.operation_latency, Duration::from_millis(300));
        assert_eq!(operation.first_response_latency, Some(Duration::from_millis(90)));
        assert_eq!(operation.retry_count, 0);
        assert_eq!(tracer.state(), TracerState::OperationCompleted);
    }

    #[test]
    fn test_first_response_absent_without_response() {
        let (mut tracer, handler) = tracer_with([0, 10, 25, 30]);
        tracer.on_operation_start().unwrap();
        tracer.on_attempt_start().unwrap();
        tracer.on_attempt_complete(Code::Unavailable).unwrap();
        tracer.on_operation_complete(Code::Unavailable).unwrap();

        assert!(handler.attempts()[0].first_response_latency.is_none());
        assert!(handler.operations()[0].first_response_latency.is_none());
    }

    #[test]
    fn test_first_response_measured_per_attempt() {
        let (mut tracer, handler) = tracer_with([0, 10, 20, 30, 100, 130, 200]);
        tracer.on_operation_start().unwrap();
        tracer.on_attempt_start().unwrap(); // 10
        tracer.on_response().unwrap(); // 20
        tracer.on_attempt_complete(Code::Unavailable).unwrap(); // 30
        tracer.on_attempt_start().unwrap(); // 100
        tracer.on_response().unwrap(); // 130
        tracer.on_operation_complete(Code::Ok).unwrap(); // 200

        let attempts = handler.attempts();
        assert_eq!(attempts[0].first_response_latency, Some(Duration::from_millis(10)));
        assert_eq!(attempts[1].first_response_latency, Some(Duration::from_millis(30)));
        assert_eq!(attempts[1].attempt_latency, Duration::from_millis(100));
        assert_eq!(handler.operations()[0].first_response_latency, Some(Duration::from_millis(20)));
    }

    #[test]
    fn test_retry_count_is_attempts_minus_one() {
        let (mut tracer, handler) = tracer_with(0..20);
        tracer.on_operation_start().unwrap();
        for _ in 0..3 {
            tracer.on_attempt_start().unwrap();
            tracer.on_attempt_complete(Code::Unavailable).unwrap();
        }
        tracer.on_attempt_start().unwrap();
        tracer.on_operation_complete(Code::Ok).unwrap();

        assert_eq!(tracer.attempt_count(), 4);
        assert_eq!(handler.attempts().len(), 4);
        assert_eq!(handler.operations()[0].retry_count, 3);
        let numbers: Vec<u32> = handler.attempts().iter().map(|a| a.attempt_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_server_timing_last_value_wins() {
        let (mut tracer, handler) = tracer_with(0..10);
        tracer.on_operation_start().unwrap();
        tracer.on_attempt_start().unwrap();
        tracer.on_metadata_received(&headers("101")).unwrap();
        tracer.on_metadata_received(&headers("102")).unwrap();
        tracer.on_metadata_received(&MetadataMap::new()).unwrap();
        tracer.on_operation_complete(Code::Ok).unwrap();

        assert_eq!(handler.attempts()[0].server_latency, Some(Duration::from_millis(102)));
        assert!(!handler.attempts()[0].connectivity_error);
    }

    #[test]
    fn test_server_timing_resets_between_attempts() {
        let (mut tracer, handler) = tracer_with(0..10);
        tracer.on_operation_start().unwrap();
        tracer.on_attempt_start().unwrap();
        tracer.on_metadata_received(&headers("50")).unwrap();
        tracer.on_attempt_complete(Code::Unavailable).unwrap();
        tracer.on_attempt_start().unwrap();
        tracer.on_operation_complete(Code::Ok).unwrap();

        let attempts = handler.attempts();
        assert_eq!(attempts[0].server_latency, Some(Duration::from_millis(50)));
        assert!(attempts[1].server_latency.is_none());
    }

    #[test]
    fn test_headers_without_server_timing_flag_connectivity_error() {
        let (mut tracer, handler) = tracer_with(0..10);
        tracer.on_operation_start().unwrap();
        tracer.on_attempt_start().unwrap();
        tracer.on_metadata_received(&MetadataMap::new()).unwrap();
        tracer.on_attempt_complete(Code::Unavailable).unwrap();
        tracer.on_attempt_start().unwrap();
        let unreachable = AttemptCompleteInfo::new(Code::Unavailable).with_connectivity_error();
        tracer.on_attempt_complete(unreachable).unwrap();
        tracer.on_attempt_start().unwrap();
        tracer.on_metadata_received(&headers("3")).unwrap();
        tracer.on_operation_complete(Code::Ok).unwrap();

        let flags: Vec<bool> = handler.attempts().iter().map(|a| a.connectivity_error).collect();
        assert_eq!(flags, vec![true, true, false]);
        assert_eq!(handler.operations()[0].connectivity_error_count, 2);
    }

    #[test]
    fn test_explicit_connectivity_count_overrides_sum() {
        let (mut tracer, handler) = tracer_with(0..10);
        tracer.on_operation_start().unwrap();
        tracer.on_attempt_start().unwrap();
        let outcome = OperationCompleteInfo::new(Code::Ok).with_connectivity_error_count(5);
        tracer.on_operation_complete(outcome).unwrap();

        assert_eq!(handler.operations()[0].connectivity_error_count, 5);
    }

    #[test]
    fn test_location_decoded_once() {
        let (mut tracer, handler) = tracer_with(0..10);
        tracer.on_operation_start().unwrap();
        tracer.on_attempt_start().unwrap();
        tracer.on_status_received(&trailers("us-west1-c", "fake-cluster3")).unwrap();
        tracer.on_status_received(&trailers("europe-west1-b", "other")).unwrap();
        tracer.on_operation_complete(Code::Ok).unwrap();

        let attrs = &handler.operations()[0].attributes;
        assert_eq!(attrs.zone.as_deref(), Some("us-west1-c"));
        assert_eq!(attrs.cluster.as_deref(), Some("fake-cluster3"));
    }

    #[test]
    fn test_malformed_location_is_ignored() {
        let (mut tracer, handler) = tracer_with(0..10);
        tracer.on_operation_start().unwrap();
        tracer.on_attempt_start().unwrap();
        let mut bad = MetadataMap::new();
        bad.insert_bin(INSTANCE_INFORMATION_KEY, MetadataValue::from_bytes(b"\x0a\x0aus-west"));
        tracer.on_status_received(&bad).unwrap();
        tracer.on_operation_complete(Code::Ok).unwrap();

        let attrs = &handler.attempts()[0].attributes;
        assert!(attrs.zone.is_none());
        assert!(attrs.cluster.is_none());
        assert_eq!(attrs.zone_label(), "global");
    }

    #[test]
    fn test_on_status_reads_status_metadata() {
        let (mut tracer, _) = tracer_with(0..10);
        tracer.on_operation_start().unwrap();
        tracer.on_attempt_start().unwrap();
        let status = tonic::Status::with_metadata(
            Code::Ok,
            "done",
            trailers("us-central1-a", "c1"),
        );
        tracer.on_status(&status).unwrap();
        assert_eq!(tracer.attributes().zone.as_deref(), Some("us-central1-a"));
    }

    #[test]
    fn test_application_latency_pairs_reads_with_responses() {
        let (mut tracer, handler) = tracer_with([0, 0, 10, 20, 25, 50, 60]);
        tracer.on_operation_start().unwrap();
        tracer.on_attempt_start().unwrap();
        tracer.on_response().unwrap(); // 10
        tracer.on_response().unwrap(); // 20
        tracer.on_read().unwrap(); // 25
        tracer.on_read().unwrap(); // 50
        tracer.on_operation_complete(Code::Ok).unwrap();

        let operation = &handler.operations()[0];
        assert_eq!(
            operation.application_latencies,
            vec![Duration::from_millis(15), Duration::from_millis(30)]
        );
        assert_eq!(operation.application_latency(), Duration::from_millis(45));
        assert_eq!(operation.rows_read, 2);
    }

    #[test]
    fn test_read_without_response_fails() {
        let (mut tracer, _) = tracer_with(0..10);
        tracer.on_operation_start().unwrap();
        tracer.on_attempt_start().unwrap();
        let err = tracer.on_read().unwrap_err();
        assert!(matches!(err, MetricsError::UnmatchedRead { rows_read: 0 }));
        assert_eq!(tracer.state(), TracerState::AttemptStarted);
    }

    #[test]
    fn test_response_before_attempt_is_rejected() {
        let (mut tracer, handler) = tracer_with(0..10);
        tracer.on_operation_start().unwrap();
        let err = tracer.on_response().unwrap_err();
        assert!(matches!(
            err,
            MetricsError::InvalidTransition {
                event: LifecycleEvent::Response,
                state: TracerState::OperationStarted
            }
        ));
        assert!(handler.is_empty());
    }

    #[test]
    fn test_double_start_is_rejected() {
        let (mut tracer, _) = tracer_with(0..10);
        tracer.on_operation_start().unwrap();
        assert!(tracer.on_operation_start().is_err());

        tracer.on_attempt_start().unwrap();
        assert!(tracer.on_attempt_start().is_err());
    }

    #[test]
    fn test_attempt_completed_twice_is_rejected() {
        let (mut tracer, handler) = tracer_with(0..10);
        tracer.on_operation_start().unwrap();
        tracer.on_attempt_start().unwrap();
        tracer.on_attempt_complete(Code::Ok).unwrap();
        assert!(tracer.on_attempt_complete(Code::Ok).is_err());
        assert_eq!(handler.attempts().len(), 1);
    }

    #[test]
    fn test_operation_without_attempt_is_rejected() {
        let (mut tracer, _) = tracer_with(0..10);
        tracer.on_operation_start().unwrap();
        assert!(tracer.on_operation_complete(Code::Ok).is_err());
    }

    #[test]
    fn test_completed_tracer_is_inert() {
        let (mut tracer, handler) = tracer_with(0..10);
        tracer.on_operation_start().unwrap();
        tracer.on_attempt_start().unwrap();
        tracer.on_operation_complete(Code::Ok).unwrap();

        assert!(tracer.on_attempt_start().is_err());
        assert!(tracer.on_read().is_err());
        assert!(tracer.on_operation_complete(Code::Ok).is_err());
        assert_eq!(handler.len(), 2);
    }

    #[test]
    fn test_rejected_call_does_not_read_clock() {
        let clock = Arc::new(ScriptedClock::from_millis(0..10));
        let mut tracer = MetricsTracer::new(attributes(), Vec::new(), clock.clone());
        assert!(tracer.on_attempt_start().is_err());
        assert_eq!(clock.calls(), 0);
    }

    #[test]
    fn test_handlers_called_in_order() {
        let mut seq = Sequence::new();
        let mut first = MockMetricsHandler::new();
        let mut second = MockMetricsHandler::new();
        first
            .expect_on_attempt_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        second
            .expect_on_attempt_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        first
            .expect_on_operation_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        second
            .expect_on_operation_complete()
            .withf(|record| record.retry_count == 0 && record.status == Code::Ok)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let clock = Arc::new(ScriptedClock::from_millis(0..10));
        let handlers: Vec<Arc<dyn MetricsHandler>> = vec![Arc::new(first), Arc::new(second)];
        let mut tracer = MetricsTracer::new(attributes(), handlers, clock);
        tracer.on_operation_start().unwrap();
        tracer.on_attempt_start().unwrap();
        tracer.on_operation_complete(Code::Ok).unwrap();
    }

    #[test]
    fn test_handler_failure_propagates() {
        let mut failing = MockMetricsHandler::new();
        failing
            .expect_on_attempt_complete()
            .times(1)
            .returning(|_| Err("exporter offline".into()));
        let mut skipped = MockMetricsHandler::new();
        skipped.expect_on_attempt_complete().never();

        let clock = Arc::new(ScriptedClock::from_millis(0..10));
        let handlers: Vec<Arc<dyn MetricsHandler>> = vec![Arc::new(failing), Arc::new(skipped)];
        let mut tracer = MetricsTracer::new(attributes(), handlers, clock);
        tracer.on_operation_start().unwrap();
        tracer.on_attempt_start().unwrap();

        let err = tracer.on_attempt_complete(Code::Ok).unwrap_err();
        assert!(matches!(err, MetricsError::Handler { index: 0, .. }));
        // The transition happened before the handlers ran.
        assert_eq!(tracer.state(), TracerState::AttemptCompleted);
    }
}
