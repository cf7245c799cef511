//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk and parsing
//! it into validated, type-safe structures.
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path given as the `CONFIG_FILE` CLI argument (must exist)
//! 2. Default location, if present:
//!    - **Linux/macOS:** `~/.pandoc-mcp/config.json`
//!    - **Windows:** `%USERPROFILE%\.pandoc-mcp\config.json`
//! 3. Built-in defaults
//!
//! # Environment
//!
//! `PANDOC_PATH` overrides `pandoc.path` from the file.

mod settings;

pub use settings::{Config, HttpConfig, LoggingConfig, PandocConfig};

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Environment variable that overrides the pandoc executable path.
pub const PANDOC_PATH_ENV: &str = "PANDOC_PATH";

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.pandoc-mcp/`
/// - **Windows:** `%USERPROFILE%\.pandoc-mcp\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".pandoc-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads and parses the configuration file.
///
/// If `path` is `None`, the default location is used when a file exists
/// there; otherwise the built-in defaults apply. `PANDOC_PATH` is applied
/// last.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly named configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - Fields are invalid
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => read_config_file(p)?,
        None => match default_config_path() {
            Some(p) if p.is_file() => read_config_file(&p)?,
            _ => Config::default(),
        },
    };

    apply_pandoc_path_override(&mut config, std::env::var_os(PANDOC_PATH_ENV));

    // Validate the configuration
    config.validate()?;

    Ok(config)
}

/// Replaces `pandoc.path` with the `PANDOC_PATH` value, unless it is unset
/// or empty.
fn apply_pandoc_path_override(config: &mut Config, value: Option<OsString>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        config.pandoc.path = PathBuf::from(value);
    }
}

fn read_config_file(config_path: &Path) -> Result<Config, ConfigError> {
    if !config_path.exists() {
        return Err(ConfigError::NotFound {
            path: config_path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.to_path_buf(),
        source: e,
    })
}
