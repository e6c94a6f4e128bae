//! Configuration Module
//!
//! Provides TOML-based configuration with support for:
//! - Log level
//! - Broker identity and will sweeping
//! - Topic separator, wildcard tokens and depth limit
//! - Environment variable overrides (TOPICSTORE__* prefix)

use std::path::Path;
use std::time::Duration;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

use crate::topic::TrieOptions;


/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}")?;
    Ok(re
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .to_string())
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Config(e) => Some(e),
            ConfigError::Validation(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

impl From<regex::Error> for ConfigError {
    fn from(e: regex::Error) -> Self {
        ConfigError::Validation(format!("env substitution pattern: {}", e))
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Broker identity and will handling
    pub broker: BrokerConfig,
    /// Topic matching
    pub topic: TopicConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level or filter directive: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Broker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker id stamped on packets and wills (default: `<hostname>-<pid>`)
    pub id: Option<String>,
    /// How often wills of dead brokers are swept
    #[serde(with = "humantime_serde", default = "default_will_sweep_interval")]
    pub will_sweep_interval: Duration,
    /// Silence after which another broker is presumed dead
    #[serde(with = "humantime_serde", default = "default_dead_broker_timeout")]
    pub dead_broker_timeout: Duration,
}

fn default_will_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_dead_broker_timeout() -> Duration {
    // three missed heartbeats
    Duration::from_secs(180)
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            id: None,
            will_sweep_interval: default_will_sweep_interval(),
            dead_broker_timeout: default_dead_broker_timeout(),
        }
    }
}

impl BrokerConfig {
    /// Configured id, or one derived from the host name and process id
    pub fn resolved_id(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => {
                let host = hostname::get()
                    .ok()
                    .and_then(|name| name.into_string().ok())
                    .unwrap_or_else(|| "topicstore".to_string());
                format!("{}-{}", host, std::process::id())
            }
        }
    }
}

/// Topic configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    /// Level separator, a single character
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Single-level wildcard token
    #[serde(default = "default_wildcard_one")]
    pub wildcard_one: String,
    /// Multi-level wildcard token
    #[serde(default = "default_wildcard_some")]
    pub wildcard_some: String,
    /// Maximum topic levels (0 = unlimited)
    #[serde(default)]
    pub max_levels: usize,
}

fn default_separator() -> String {
    "/".to_string()
}

fn default_wildcard_one() -> String {
    "+".to_string()
}

fn default_wildcard_some() -> String {
    "#".to_string()
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            wildcard_one: default_wildcard_one(),
            wildcard_some: default_wildcard_some(),
            max_levels: 0,
        }
    }
}

impl TopicConfig {
    /// Trie options for this section; call on a validated config
    pub fn trie_options(&self) -> TrieOptions {
        TrieOptions {
            separator: self.separator.chars().next().unwrap_or('/'),
            wildcard_one: self.wildcard_one.clone(),
            wildcard_some: self.wildcard_some.clone(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Supports two forms of environment variable usage:
    /// 1. In-file substitution: `${VAR}` or `${VAR:-default}` syntax in the TOML file
    /// 2. Override via env vars: `TOPICSTORE__` prefix with double underscores for nesting:
    ///    - `TOPICSTORE__BROKER__ID=edge-1` overrides `broker.id`
    ///    - `TOPICSTORE__TOPIC__MAX_LEVELS=8` overrides `topic.max_levels`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            // Start with defaults
            .set_default("log.level", "info")?
            .set_default("broker.will_sweep_interval", "60s")?
            .set_default("broker.dead_broker_timeout", "180s")?
            .set_default("topic.separator", "/")?
            .set_default("topic.wildcard_one", "+")?
            .set_default("topic.wildcard_some", "#")?
            .set_default("topic.max_levels", 0)?;

        // Load from file with env var substitution
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content)?;
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        // Double underscore separates nested keys, single underscore preserved in field names
        let cfg = builder
            .add_source(
                Environment::with_prefix("TOPICSTORE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides only (no file).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref id) = self.broker.id {
            if id.is_empty() {
                return Err(ConfigError::Validation(
                    "broker.id cannot be empty".to_string(),
                ));
            }
        }

        if self.broker.will_sweep_interval.is_zero() {
            return Err(ConfigError::Validation(
                "broker.will_sweep_interval must be greater than zero".to_string(),
            ));
        }

        if self.broker.dead_broker_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "broker.dead_broker_timeout must be greater than zero".to_string(),
            ));
        }

        let topic = &self.topic;
        if topic.separator.chars().count() != 1 {
            return Err(ConfigError::Validation(format!(
                "topic.separator must be a single character, got {:?}",
                topic.separator
            )));
        }

        for (name, token) in [
            ("wildcard_one", &topic.wildcard_one),
            ("wildcard_some", &topic.wildcard_some),
        ] {
            if token.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "topic.{} cannot be empty",
                    name
                )));
            }
            if token.contains(topic.separator.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "topic.{} cannot contain the separator",
                    name
                )));
            }
        }

        if topic.wildcard_one == topic.wildcard_some {
            return Err(ConfigError::Validation(
                "topic.wildcard_one and topic.wildcard_some must differ".to_string(),
            ));
        }

        Ok(())
    }
}
