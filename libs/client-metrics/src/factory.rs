//! Builds tracers bound to a table and method.

use crate::attributes::{generate_client_uid, MethodName, MetricAttributes, DEFAULT_CLIENT_NAME};
use crate::clock::{Clock, SystemClock};
use crate::config::MetricsConfig;
use crate::config_manager::PrometheusConfigManager;
use crate::context::TableContext;
use crate::error::{MetricsError, MetricsResult};
use crate::handler::MetricsHandler;
use crate::tracer::MetricsTracer;
use std::sync::Arc;
use tracing::debug;

/// Shared per-client factory. Every tracer it builds reports to the same
/// handlers and carries the same client identity.
#[derive(Clone)]
pub struct MetricsTracerFactory {
    handlers: Vec<Arc<dyn MetricsHandler>>,
    client_name: String,
    client_uid: String,
    project_id: Option<String>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for MetricsTracerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsTracerFactory")
            .field("handlers", &self.handlers.len())
            .field("client_name", &self.client_name)
            .field("client_uid", &self.client_uid)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl MetricsTracerFactory {
    pub fn new(handlers: Vec<Arc<dyn MetricsHandler>>) -> Self {
        Self {
            handlers,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            client_uid: generate_client_uid(),
            project_id: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Factory whose tracers report to the project's shared Prometheus
    /// handler. Tracers report nowhere when metrics are disabled.
    pub fn from_config(
        config: &MetricsConfig,
        manager: &PrometheusConfigManager,
    ) -> MetricsResult<Self> {
        let mut handlers: Vec<Arc<dyn MetricsHandler>> = Vec::new();
        if config.enabled {
            let handler =
                manager.get_handler_for_key(config.handler_key(), &config.handler_options())?;
            handlers.push(handler);
        } else {
            debug!("Client metrics disabled");
        }

        let mut factory = Self::new(handlers).with_client_name(config.client_name.clone());
        factory.project_id = config.project_id.clone();
        Ok(factory)
    }

    pub fn with_client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    pub fn with_client_uid(mut self, client_uid: impl Into<String>) -> Self {
        self.client_uid = client_uid.into();
        self
    }

    /// Project used when the table context does not name one.
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Clock used by [`tracer`](Self::tracer).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn client_uid(&self) -> &str {
        &self.client_uid
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Build an idle tracer for one `method` call against `context`.
    pub fn get_metrics_tracer(
        &self,
        context: &dyn TableContext,
        method: MethodName,
        clock: Arc<dyn Clock>,
    ) -> MetricsResult<MetricsTracer> {
        if context.instance_id().is_empty() {
            return Err(MetricsError::MissingContext("instance_id"));
        }
        if context.table_id().is_empty() {
            return Err(MetricsError::MissingContext("table_id"));
        }

        let attributes = MetricAttributes {
            project_id: context
                .project_id()
                .map(str::to_string)
                .or_else(|| self.project_id.clone()),
            instance_id: context.instance_id().to_string(),
            table_id: context.table_id().to_string(),
            app_profile_id: context.app_profile_id().map(str::to_string),
            cluster: None,
            zone: None,
            method,
            streaming: method.streaming(),
            client_name: self.client_name.clone(),
            client_uid: self.client_uid.clone(),
        };
        Ok(MetricsTracer::new(attributes, self.handlers.clone(), clock))
    }

    /// [`get_metrics_tracer`](Self::get_metrics_tracer) with the factory's clock.
    pub fn tracer(
        &self,
        context: &dyn TableContext,
        method: MethodName,
    ) -> MetricsResult<MetricsTracer> {
        self.get_metrics_tracer(context, method, Arc::clone(&self.clock))
    }
}
