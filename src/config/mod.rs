//! Configuration management for esdump
//!
//! Settings come from a TOML file, then command-line flags override them.
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Configuration file
//! 3. Default values

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::query::{DEFAULT_PAGE_SIZE, WINDOW_CAP};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Cluster connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Extraction and pipeline tuning
    #[serde(default)]
    pub export: ExportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Cluster addresses, tried in order
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,

    /// Basic-auth user
    #[serde(default)]
    pub username: Option<String>,

    /// Basic-auth password
    #[serde(default)]
    pub password: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Extraction and pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Documents per scroll page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Hits requested by each windowed search
    #[serde(default = "default_search_size")]
    pub search_size: usize,

    /// Capacity of the producer/consumer queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Scroll session lifetime in seconds
    #[serde(default = "default_scroll_ttl")]
    pub scroll_ttl_secs: u64,

    /// Pause between scroll page fetches, in milliseconds
    #[serde(default = "default_throttle")]
    pub throttle_ms: u64,

    /// Rows per `load_batch` call in batch mode
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_hosts() -> Vec<String> {
    vec!["http://localhost:9200".to_string()]
}

fn default_timeout() -> u64 {
    60
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_search_size() -> usize {
    WINDOW_CAP as usize
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_scroll_ttl() -> u64 {
    180
}

fn default_throttle() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    100
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            username: None,
            password: None,
            timeout: default_timeout(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            search_size: default_search_size(),
            queue_capacity: default_queue_capacity(),
            scroll_ttl_secs: default_scroll_ttl(),
            throttle_ms: default_throttle(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load the given file, or the default file if it exists, or defaults
    ///
    /// An explicitly requested file must exist; the default one is optional.
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Default configuration file path: `~/.esdump/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".esdump")
            .join("config.toml")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.connection.hosts.iter().all(|h| h.trim().is_empty()) {
            return Err(ConfigError::MissingField("connection.hosts".to_string()).into());
        }
        for (field, value) in [
            ("connection.timeout", self.connection.timeout),
            ("export.page_size", self.export.page_size as u64),
            ("export.search_size", self.export.search_size as u64),
            ("export.queue_capacity", self.export.queue_capacity as u64),
            ("export.batch_size", self.export.batch_size as u64),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                }
                .into());
            }
        }
        if self.export.search_size as u64 > WINDOW_CAP {
            return Err(ConfigError::InvalidValue {
                field: "export.search_size".to_string(),
                value: self.export.search_size.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl ExportConfig {
    pub fn scroll_ttl(&self) -> Duration {
        Duration::from_secs(self.scroll_ttl_secs)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DumpError;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.hosts, vec!["http://localhost:9200"]);
        assert_eq!(config.export.page_size, 1000);
        assert_eq!(config.export.search_size, 10_000);
        assert_eq!(config.export.throttle(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [connection]
            hosts = ["http://es-1:9200", "http://es-2:9200"]
            username = "admin"

            [export]
            queue_capacity = 50

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.connection.hosts.len(), 2);
        assert_eq!(config.connection.username.as_deref(), Some("admin"));
        assert_eq!(config.connection.timeout, 60);
        assert_eq!(config.export.queue_capacity, 50);
        assert_eq!(config.export.scroll_ttl(), Duration::from_secs(180));
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml("[export]\npage_size = \"many\"").unwrap_err();
        assert!(matches!(err, DumpError::Config(ConfigError::InvalidFormat(_))));
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let mut config = Config::default();
        config.export.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.connection.hosts = vec![];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.export.search_size = 20_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.connection.timeout = 0;
        let err = config.validate().unwrap_err();
        assert!(
            matches!(
                &err,
                DumpError::Config(ConfigError::InvalidValue { field, .. }) if field == "connection.timeout"
            ),
            "{err:?}"
        );
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[export]\nbatch_size = 7").unwrap();
        let config = Config::load_from_file(Some(file.path())).unwrap();
        assert_eq!(config.export.batch_size, 7);

        let missing = file.path().with_extension("missing");
        let err = Config::load_from_file(Some(&missing)).unwrap_err();
        assert!(matches!(err, DumpError::Config(ConfigError::Unreadable { .. })));
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(LogLevel::Warn.to_tracing_level(), tracing::Level::WARN);
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
    }
}
