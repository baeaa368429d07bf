use crate::config::{
    ConfigError, ConfigSource, ConfigValidator, Environment, NonEmptyValidator, RangeValidator,
};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;

pub const ENV_URL: &str = "ORIENTDB_URL";
pub const ENV_USER: &str = "ORIENTDB_USER";
pub const ENV_PASSWORD: &str = "ORIENTDB_PASSWORD";
pub const ENV_MAX_HANDLES: &str = "ORIENTDB_MAX_HANDLES";
pub const ENV_LOG_QUERIES: &str = "ORIENTDB_LOG_QUERIES";
pub const ENV_ENVIRONMENT: &str = "ENVIRONMENT";

const DEFAULT_URL: &str = "memory:default";
const DEFAULT_USER: &str = "admin";
const DEFAULT_MAX_HANDLES: u32 = 32;

/// Configuration trait for loadable settings
pub trait AppConfigTrait: Sized {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;

    /// Get configuration source information for debugging
    fn config_sources(&self) -> HashMap<String, ConfigSource>;
}

/// Storage engine named by the URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageEngine {
    /// Process-local, non-durable storage
    Memory,
    /// Embedded paginated local storage
    PLocal,
    /// Remote server over the binary protocol
    Remote,
}

impl StorageEngine {
    pub fn scheme(&self) -> &'static str {
        match self {
            StorageEngine::Memory => "memory",
            StorageEngine::PLocal => "plocal",
            StorageEngine::Remote => "remote",
        }
    }
}

/// Database URL such as `memory:app`, `plocal:/data/app` or `remote:localhost/app`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageUrl {
    pub engine: StorageEngine,
    pub location: String,
}

impl StorageUrl {
    pub fn memory(name: impl Into<String>) -> Self {
        Self {
            engine: StorageEngine::Memory,
            location: name.into(),
        }
    }

    /// Database name: the last path segment of the location
    pub fn database_name(&self) -> &str {
        self.location
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(&self.location)
    }
}

impl FromStr for StorageUrl {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expected = "<memory|plocal|remote>:<location>";
        let parsed = url::Url::parse(s)
            .map_err(|_| ConfigError::invalid_value("url", s, expected))?;

        let engine = match parsed.scheme() {
            "memory" => StorageEngine::Memory,
            "plocal" => StorageEngine::PLocal,
            "remote" => StorageEngine::Remote,
            _ => return Err(ConfigError::invalid_value("url", s, expected)),
        };

        let location = parsed.path().to_string();
        if location.trim_matches('/').is_empty() {
            return Err(ConfigError::invalid_value("url", s, expected));
        }

        Ok(Self { engine, location })
    }
}

impl fmt::Display for StorageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.engine.scheme(), self.location)
    }
}

/// Settings used to open the object database
#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: StorageUrl,
    pub username: String,
    pub password: String,
    pub max_handles: u32,
    pub log_queries: bool,
    pub environment: Environment,
    sources: HashMap<String, ConfigSource>,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("max_handles", &self.max_handles)
            .field("log_queries", &self.log_queries)
            .field("environment", &self.environment)
            .finish()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: StorageUrl::memory("default"),
            username: DEFAULT_USER.to_string(),
            password: DEFAULT_USER.to_string(),
            max_handles: DEFAULT_MAX_HANDLES,
            log_queries: false,
            environment: Environment::Development,
            sources: HashMap::new(),
        }
    }
}

impl DatabaseConfig {
    /// In-memory database with the given name
    pub fn memory(name: impl Into<String>) -> Self {
        Self {
            url: StorageUrl::memory(name),
            ..Self::default()
        }
    }

    pub fn with_max_handles(mut self, max_handles: u32) -> Self {
        self.max_handles = max_handles;
        self.sources
            .insert("max_handles".to_string(), ConfigSource::Programmatic);
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self.sources
            .insert("username".to_string(), ConfigSource::Programmatic);
        self.sources
            .insert("password".to_string(), ConfigSource::Programmatic);
        self
    }

    pub fn with_query_logging(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self.sources
            .insert("log_queries".to_string(), ConfigSource::Programmatic);
        self
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let mut sources = HashMap::new();

        match lookup(ENV_ENVIRONMENT) {
            Some(value) => {
                config.environment = value.parse()?;
                sources.insert(
                    "environment".to_string(),
                    ConfigSource::EnvVar(ENV_ENVIRONMENT.to_string()),
                );
            }
            None => {
                sources.insert(
                    "environment".to_string(),
                    ConfigSource::Default(config.environment.to_string()),
                );
            }
        }

        match lookup(ENV_URL) {
            Some(value) => {
                config.url = value.parse()?;
                sources.insert("url".to_string(), ConfigSource::EnvVar(ENV_URL.to_string()));
            }
            None => {
                sources.insert("url".to_string(), ConfigSource::Default(DEFAULT_URL.to_string()));
            }
        }

        match lookup(ENV_USER) {
            Some(value) => {
                config.username = value;
                sources.insert("username".to_string(), ConfigSource::EnvVar(ENV_USER.to_string()));
            }
            None => {
                sources.insert("username".to_string(), ConfigSource::Default(DEFAULT_USER.to_string()));
            }
        }

        match lookup(ENV_PASSWORD) {
            Some(value) => {
                config.password = value;
                sources.insert(
                    "password".to_string(),
                    ConfigSource::EnvVar(ENV_PASSWORD.to_string()),
                );
            }
            None => {
                sources.insert("password".to_string(), ConfigSource::Default("***".to_string()));
            }
        }

        match lookup(ENV_MAX_HANDLES) {
            Some(value) => {
                config.max_handles = value.parse().map_err(|_| {
                    ConfigError::invalid_value("max_handles", value.clone(), "positive integer")
                })?;
                sources.insert(
                    "max_handles".to_string(),
                    ConfigSource::EnvVar(ENV_MAX_HANDLES.to_string()),
                );
            }
            None => {
                sources.insert(
                    "max_handles".to_string(),
                    ConfigSource::Default(DEFAULT_MAX_HANDLES.to_string()),
                );
            }
        }

        match lookup(ENV_LOG_QUERIES) {
            Some(value) => {
                config.log_queries = parse_bool(&value).ok_or_else(|| {
                    ConfigError::invalid_value("log_queries", value.clone(), "true or false")
                })?;
                sources.insert(
                    "log_queries".to_string(),
                    ConfigSource::EnvVar(ENV_LOG_QUERIES.to_string()),
                );
            }
            None => {
                sources.insert("log_queries".to_string(), ConfigSource::Default("false".to_string()));
            }
        }

        config.sources = sources;
        config.validate()?;
        Ok(config)
    }
}

impl AppConfigTrait for DatabaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        RangeValidator {
            field: "max_handles",
            min: 1,
            max: 4096,
        }
        .validate(&self.max_handles)?;

        NonEmptyValidator { field: "username" }.validate(&self.username)?;

        if self.environment.is_production()
            && self.username == DEFAULT_USER
            && self.password == DEFAULT_USER
        {
            return Err(ConfigError::validation_failed(
                "default admin credentials are not allowed in production",
            ));
        }

        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        self.sources.clone()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
