//! Client-side metrics for Bigtable data operations.
//!
//! A [`MetricsTracerFactory`] hands out one [`MetricsTracer`] per logical
//! operation. The caller's transport layer drives the tracer through its
//! lifecycle (operation start, attempts, headers, responses, reads, status)
//! and the tracer emits an [`AttemptMetrics`] record per attempt and one
//! [`OperationMetrics`] record per operation to every registered
//! [`MetricsHandler`].
//!
//! ```rust,ignore
//! use client_metrics::{
//!     FromEnv, MethodName, MetricsConfig, MetricsTracerFactory, PrometheusConfigManager,
//!     TableResource,
//! };
//!
//! let config = MetricsConfig::from_env()?;
//! let manager = PrometheusConfigManager::prometheus();
//! let factory = MetricsTracerFactory::from_config(&config, &manager)?;
//!
//! let table = TableResource::new("my-instance", "my-table");
//! let mut tracer = factory.tracer(&table, MethodName::ReadRows)?;
//! tracer.on_operation_start()?;
//! tracer.on_attempt_start()?;
//! // ... transport callbacks ...
//! tracer.on_operation_complete(tonic::Code::Ok)?;
//! ```

pub mod attributes;
pub mod clock;
pub mod config;
pub mod config_manager;
pub mod context;
pub mod error;
pub mod factory;
pub mod handler;
pub mod metadata;
pub mod record;
pub mod telemetry;
pub mod tracer;

pub use attributes::{MethodName, MetricAttributes, StreamingState};
pub use clock::{Clock, ScriptedClock, SystemClock};
pub use config::{Environment, FromEnv, MetricsConfig};
pub use config_manager::{MetricsConfigManager, PrometheusConfigManager};
pub use context::{TableContext, TableResource};
pub use error::{ConfigError, HandlerError, MetricsError, MetricsResult};
pub use factory::MetricsTracerFactory;
pub use handler::{
    MetricsHandler, PrometheusHandlerOptions, PrometheusMetricsHandler, RecordingMetricsHandler,
    TracingMetricsHandler,
};
pub use record::{AttemptMetrics, MetricsRecord, OperationMetrics};
pub use tracer::{
    AttemptCompleteInfo, LifecycleEvent, MetricsTracer, OperationCompleteInfo, TracerState,
};
