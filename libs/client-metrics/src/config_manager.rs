//! Keyed cache of shared metrics handlers.
//!
//! Creating an exporter per client would register duplicate series, so every
//! client for the same project resolves its handler through one
//! [`MetricsConfigManager`].

use crate::error::MetricsResult;
use crate::handler::{PrometheusHandlerOptions, PrometheusMetricsHandler};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

type Constructor<H, O> = Box<dyn Fn(&str, &O) -> MetricsResult<H> + Send + Sync>;

/// One handler per key, built on first request.
///
/// Options passed after the first call for a key are ignored.
pub struct MetricsConfigManager<H, O> {
    constructor: Constructor<H, O>,
    handlers: Mutex<HashMap<String, Arc<H>>>,
}

/// Manager for per-project Prometheus handlers.
pub type PrometheusConfigManager =
    MetricsConfigManager<PrometheusMetricsHandler, PrometheusHandlerOptions>;

impl<H, O> MetricsConfigManager<H, O> {
    pub fn new<F>(constructor: F) -> Self
    where
        F: Fn(&str, &O) -> MetricsResult<H> + Send + Sync + 'static,
    {
        Self {
            constructor: Box::new(constructor),
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached handler for `key`, constructing it if absent.
    ///
    /// Construction runs while the lock is held so concurrent first calls
    /// build exactly one handler. A failed construction caches nothing.
    pub fn get_handler_for_key(&self, key: &str, options: &O) -> MetricsResult<Arc<H>> {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handler) = handlers.get(key) {
            return Ok(Arc::clone(handler));
        }

        let handler = Arc::new((self.constructor)(key, options)?);
        handlers.insert(key.to_string(), Arc::clone(&handler));
        debug!(key = %key, total = handlers.len(), "Created metrics handler");
        Ok(handler)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached handler. Handlers still held by tracers stay alive.
    pub fn clear(&self) {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl PrometheusConfigManager {
    /// Manager that builds a [`PrometheusMetricsHandler`] per project, labelled
    /// with the project id it exports for.
    pub fn prometheus() -> Self {
        Self::new(|project_id, options: &PrometheusHandlerOptions| {
            let options = options.clone().with_global_label("exporter_project", project_id);
            PrometheusMetricsHandler::new(&options)
        })
    }
}

impl Default for PrometheusConfigManager {
    fn default() -> Self {
        Self::prometheus()
    }
}

impl<H, O> std::fmt::Debug for MetricsConfigManager<H, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsConfigManager")
            .field("handlers", &self.len())
            .finish_non_exhaustive()
    }
}
