//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// pandoc invocation settings.
    #[serde(default)]
    pub pandoc: PandocConfig,

    /// HTTP/SSE transport settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pandoc.timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "pandoc.timeout_secs must be greater than 0".to_string(),
            });
        }
        if self.pandoc.max_concurrent == 0 {
            return Err(ConfigError::ValidationError {
                message: "pandoc.max_concurrent must be greater than 0".to_string(),
            });
        }
        if self.pandoc.path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "pandoc.path cannot be empty".to_string(),
            });
        }
        if self.http.host.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "http.host cannot be empty".to_string(),
            });
        }
        if self.http.port == 0 {
            return Err(ConfigError::ValidationError {
                message: "http.port must be between 1 and 65535".to_string(),
            });
        }
        Ok(())
    }
}

/// pandoc invocation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PandocConfig {
    /// Executable name or path. `PANDOC_PATH` takes precedence.
    #[serde(default = "default_pandoc_path")]
    pub path: PathBuf,

    /// Extra arguments appended verbatim to every invocation.
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Upper bound on a single conversion, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of pandoc processes running at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for PandocConfig {
    fn default() -> Self {
        Self {
            path: default_pandoc_path(),
            extra_args: Vec::new(),
            timeout_secs: default_timeout_secs(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_pandoc_path() -> PathBuf {
    PathBuf::from("pandoc")
}

const fn default_timeout_secs() -> u64 {
    300
}

const fn default_max_concurrent() -> usize {
    4
}

/// HTTP/SSE transport settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    3000
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
