//! Error types for pandoc-mcp.
//!
//! Every conversion failure is surfaced as one specific [`ConvertError`]
//! variant. Nothing here retries or downgrades one kind into another; the
//! MCP layer decides how a kind is rendered to the client.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// A filter name that could not be found in any search location.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("filter '{name}' not found. Searched: {}", display_paths(.tried_paths))]
pub struct FilterNotFoundError {
    /// The filter name or path as supplied by the caller.
    pub name: String,
    /// Every candidate path, in search order.
    pub tried_paths: Vec<PathBuf>,
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Problems with a pandoc defaults (YAML) document.
#[derive(Error, Debug)]
pub enum DefaultsFileError {
    /// The path does not name an existing regular file.
    #[error("defaults file not found: {path}")]
    NotFound {
        /// Offending path.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("failed to read defaults file: {path}")]
    Read {
        /// Offending path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML.
    #[error("failed to parse defaults file {path}: {message}")]
    Parse {
        /// Offending path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The document is empty or `null`.
    #[error("defaults file is empty: {path}")]
    Empty {
        /// Offending path.
        path: PathBuf,
    },

    /// The document is a list or scalar instead of a mapping.
    #[error("defaults file must contain a YAML object (mapping): {path}")]
    NotAMapping {
        /// Offending path.
        path: PathBuf,
    },

    /// `from` and `to` are both set; these come from the tool call.
    #[error(
        "defaults file should not specify both 'from' and 'to'; \
         use the input_format and output_format parameters instead: {path}"
    )]
    ConflictingDirection {
        /// Offending path.
        path: PathBuf,
    },
}

/// Errors produced while validating or running a conversion.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// The pandoc executable could not be located or executed.
    #[error(
        "pandoc executable not found ({program}). Install pandoc from \
         https://pandoc.org/installing.html or set PANDOC_PATH to its location"
    )]
    EngineNotFound {
        /// The program name or path that was tried.
        program: String,
    },

    /// The format token is not one of the known formats.
    #[error("unsupported format: '{format}'")]
    UnsupportedFormat {
        /// Token as supplied by the caller.
        format: String,
    },

    /// The format is known but can only be produced, not read.
    #[error("unsupported input format: '{format}' can only be used as an output format")]
    UnsupportedInputFormat {
        /// Token as supplied by the caller.
        format: String,
    },

    /// The request shape is invalid.
    #[error("{message}")]
    Validation {
        /// What is wrong with the request.
        message: String,
    },

    /// pandoc ran and reported a failure.
    #[error("conversion failed: {message}")]
    ConversionFailed {
        /// Raw text pandoc wrote to stderr (or the spawn error).
        message: String,
        /// Exit code, when the process exited normally.
        exit_code: Option<i32>,
    },

    /// pandoc did not finish within the configured limit.
    #[error("conversion timed out after {seconds}s")]
    Timeout {
        /// The limit that was exceeded.
        seconds: u64,
    },

    /// A filter could not be resolved.
    #[error(transparent)]
    FilterNotFound(#[from] FilterNotFoundError),

    /// The defaults document is unusable.
    #[error(transparent)]
    DefaultsFile(#[from] DefaultsFileError),
}

impl ConvertError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Stable label for this error kind, used in tool results and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::EngineNotFound { .. } => "engine_not_found",
            Self::UnsupportedFormat { .. } | Self::UnsupportedInputFormat { .. } => {
                "unsupported_format"
            }
            Self::Validation { .. } => "validation_error",
            Self::ConversionFailed { .. } => "conversion_error",
            Self::Timeout { .. } => "timeout",
            Self::FilterNotFound(_) => "filter_not_found",
            Self::DefaultsFile(_) => "defaults_file_error",
        }
    }
}

/// Result type for conversion operations.
pub type ConvertResult<T> = Result<T, ConvertError>;
