//! # orient-core
//!
//! Configuration and logging shared by the orient-orm workspace.

pub mod config;
pub mod logging;

pub use config::{
    AppConfigTrait, ConfigError, ConfigSource, DatabaseConfig, Environment, StorageEngine,
    StorageUrl,
};
pub use logging::{init_logging, LoggingConfig};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get crate version
pub fn version() -> &'static str {
    VERSION
}
