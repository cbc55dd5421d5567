//! In-memory handler that captures records for assertions

use super::MetricsHandler;
use crate::error::HandlerError;
use crate::record::{AttemptMetrics, MetricsRecord, OperationMetrics};
use std::sync::{Mutex, PoisonError};

/// Handler that stores every record it receives, in arrival order
#[derive(Debug, Default)]
pub struct RecordingMetricsHandler {
    records: Mutex<Vec<MetricsRecord>>,
    failure_message: Option<String>,
}

impl RecordingMetricsHandler {
    /// Create a new recording handler
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handler that records nothing and fails every call
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            failure_message: Some(message.into()),
        }
    }

    /// All records received so far
    pub fn records(&self) -> Vec<MetricsRecord> {
        self.lock().clone()
    }

    pub fn attempts(&self) -> Vec<AttemptMetrics> {
        self.lock()
            .iter()
            .filter_map(MetricsRecord::as_attempt)
            .cloned()
            .collect()
    }

    pub fn operations(&self) -> Vec<OperationMetrics> {
        self.lock()
            .iter()
            .filter_map(MetricsRecord::as_operation)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn push(&self, record: MetricsRecord) -> Result<(), HandlerError> {
        if let Some(message) = &self.failure_message {
            return Err(message.clone().into());
        }
        self.lock().push(record);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MetricsRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetricsHandler for RecordingMetricsHandler {
    fn on_operation_complete(&self, record: &OperationMetrics) -> Result<(), HandlerError> {
        self.push(MetricsRecord::Operation(record.clone()))
    }

    fn on_attempt_complete(&self, record: &AttemptMetrics) -> Result<(), HandlerError> {
        self.push(MetricsRecord::Attempt(record.clone()))
    }
}
