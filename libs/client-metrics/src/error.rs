use crate::tracer::{LifecycleEvent, TracerState};
use thiserror::Error;

pub type MetricsResult<T> = Result<T, MetricsError>;

/// Error returned by a [`MetricsHandler`](crate::MetricsHandler) that failed to
/// record a metric.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the metrics tracing core
#[derive(Error, Debug)]
pub enum MetricsError {
    /// A lifecycle call arrived in a state that does not allow it
    #[error("Invalid lifecycle transition: cannot handle {event} while {state}")]
    InvalidTransition {
        event: LifecycleEvent,
        state: TracerState,
    },

    /// `on_read` was called more times than rows became available
    #[error("Row read with no available response (rows read so far: {rows_read})")]
    UnmatchedRead { rows_read: u64 },

    /// The table context is missing a field every record is tagged with
    #[error("Missing required context field '{0}'")]
    MissingContext(&'static str),

    /// A registered handler returned an error
    #[error("Metrics handler #{index} failed: {source}")]
    Handler {
        index: usize,
        #[source]
        source: HandlerError,
    },

    /// The exporter could not be built from the supplied options
    #[error("Exporter error: {0}")]
    Exporter(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },
}

impl From<metrics_exporter_prometheus::BuildError> for MetricsError {
    fn from(err: metrics_exporter_prometheus::BuildError) -> Self {
        MetricsError::Exporter(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let err = MetricsError::InvalidTransition {
            event: LifecycleEvent::Response,
            state: TracerState::OperationStarted,
        };
        let msg = err.to_string();
        assert!(msg.contains("on_response"));
        assert!(msg.contains("operation_started"));
    }

    #[test]
    fn test_handler_error_keeps_source() {
        let err = MetricsError::Handler {
            index: 2,
            source: "exporter offline".into(),
        };
        assert_eq!(err.to_string(), "Metrics handler #2 failed: exporter offline");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_config_error_converts() {
        let err: MetricsError = ConfigError::ParseError {
            key: "BIGTABLE_CLIENT_METRICS_ENABLED".into(),
            details: "expected a boolean".into(),
        }
        .into();
        assert!(matches!(err, MetricsError::Config(ConfigError::ParseError { .. })));
        assert!(err.to_string().contains("BIGTABLE_CLIENT_METRICS_ENABLED"));
    }
}
