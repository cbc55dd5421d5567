//! Environment-driven configuration.

use crate::attributes::DEFAULT_CLIENT_NAME;
use crate::error::ConfigError;
use crate::handler::{PrometheusHandlerOptions, DEFAULT_METRIC_PREFIX};
use std::env;

pub const METRICS_ENABLED_VAR: &str = "BIGTABLE_CLIENT_METRICS_ENABLED";
pub const PROJECT_ID_VAR: &str = "BIGTABLE_PROJECT_ID";
pub const FALLBACK_PROJECT_ID_VAR: &str = "GOOGLE_CLOUD_PROJECT";
pub const METRICS_PREFIX_VAR: &str = "BIGTABLE_METRICS_PREFIX";
pub const CLIENT_NAME_VAR: &str = "BIGTABLE_CLIENT_NAME";

/// Application environment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        if app_env.eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// Trait for configuration that can be loaded from environment variables
pub trait FromEnv: Sized {
    fn from_env() -> Result<Self, ConfigError>;
}

/// Helper to load environment variable with a default value
pub fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a boolean flag. Accepts `true/false`, `1/0`, `yes/no`, `on/off`.
pub fn env_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    let Ok(raw) = env::var(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::ParseError {
            key: key.to_string(),
            details: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Client metrics settings
#[derive(Clone, Debug, PartialEq)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Project the exporter writes to. Metrics stay local when unset.
    pub project_id: Option<String>,
    pub metric_prefix: String,
    pub client_name: String,
    pub environment: Environment,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            project_id: None,
            metric_prefix: DEFAULT_METRIC_PREFIX.to_string(),
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            environment: Environment::Development,
        }
    }
}

impl MetricsConfig {
    /// Options for the project's Prometheus handler.
    pub fn handler_options(&self) -> PrometheusHandlerOptions {
        PrometheusHandlerOptions::new().with_metric_prefix(self.metric_prefix.clone())
    }

    /// Key used to look up the shared handler. Unset projects share one.
    pub fn handler_key(&self) -> &str {
        self.project_id.as_deref().unwrap_or("default")
    }
}

impl FromEnv for MetricsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let metric_prefix = env_or_default(METRICS_PREFIX_VAR, DEFAULT_METRIC_PREFIX);
        if metric_prefix.trim().is_empty() {
            return Err(ConfigError::ParseError {
                key: METRICS_PREFIX_VAR.to_string(),
                details: "prefix must not be empty".to_string(),
            });
        }

        Ok(Self {
            enabled: env_bool(METRICS_ENABLED_VAR, true)?,
            project_id: env_non_empty(PROJECT_ID_VAR)
                .or_else(|| env_non_empty(FALLBACK_PROJECT_ID_VAR)),
            metric_prefix,
            client_name: env_or_default(CLIENT_NAME_VAR, DEFAULT_CLIENT_NAME),
            environment: Environment::from_env(),
        })
    }
}
