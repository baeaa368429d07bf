//! Structured logging setup for applications using the ORM.
//!
//! Every crate in the workspace logs through `tracing`; this module only
//! wires a subscriber for binaries and tests that want output.

use crate::config::Environment;
use serde_json::{json, Value};
use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    pub level: String,
    /// Enable JSON structured logging (vs plain text)
    pub json_format: bool,
    /// Enable pretty printing for development
    pub pretty_print: bool,
    /// Fields echoed in the initialisation event
    pub global_fields: serde_json::Map<String, Value>,
    /// Environment filter (supports complex filters like "orient_orm=debug")
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            pretty_print: false,
            global_fields: serde_json::Map::new(),
            env_filter: None,
        }
    }
}

impl LoggingConfig {
    /// Configuration matching a deployment environment
    pub fn for_environment(environment: Environment) -> Self {
        let mut global_fields = serde_json::Map::new();
        global_fields.insert("env".to_string(), json!(environment.to_string()));

        Self {
            level: environment.default_log_level().to_string(),
            json_format: environment.is_production(),
            pretty_print: environment.is_development(),
            global_fields,
            env_filter: Some(format!(
                "orient_orm={level},orient_core={level}",
                level = environment.default_log_level()
            )),
        }
    }

    /// Set environment filter
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Filter directive actually handed to the subscriber
    pub fn filter_directive(&self) -> &str {
        self.env_filter.as_deref().unwrap_or(&self.level)
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the config.
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(config.filter_directive()))?;

    if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stdout).json())
            .try_init()?;
    } else if config.pretty_print {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stdout).pretty())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stdout))
            .try_init()?;
    }

    if config.global_fields.is_empty() {
        tracing::info!(
            target: "orient::logging",
            "Logging initialized (level: {}, format: {})",
            config.level,
            if config.json_format { "JSON" } else { "text" }
        );
    } else {
        let mut init_msg = json!({
            "message": "Logging initialized",
            "level": config.level,
            "json_format": config.json_format,
        });
        for (key, value) in config.global_fields {
            init_msg[key] = value;
        }
        tracing::info!(target: "orient::logging", "{}", init_msg);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_presets() {
        let prod = LoggingConfig::for_environment(Environment::Production);
        assert!(prod.json_format);
        assert_eq!(prod.level, "info");
        assert_eq!(prod.global_fields["env"], json!("production"));

        let dev = LoggingConfig::for_environment(Environment::Development);
        assert!(dev.pretty_print);
        assert_eq!(dev.filter_directive(), "orient_orm=debug,orient_core=debug");
    }

    #[test]
    fn test_filter_falls_back_to_level() {
        let config = LoggingConfig::default();
        assert_eq!(config.filter_directive(), "info");
        let config = config.with_env_filter("orient_orm=trace");
        assert_eq!(config.filter_directive(), "orient_orm=trace");
    }
}
