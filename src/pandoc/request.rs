//! The `convert-contents` request and its shape validation.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ConvertError, ConvertResult};
use crate::pandoc::format::Format;

/// Raw arguments of a conversion request, as sent by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversionRequest {
    /// Inline document text.
    #[serde(default)]
    pub contents: Option<String>,

    /// Path of a document to read instead of `contents`.
    #[serde(default)]
    pub input_file: Option<PathBuf>,

    /// Source format token.
    #[serde(default = "default_format")]
    pub input_format: String,

    /// Target format token.
    #[serde(default = "default_format")]
    pub output_format: String,

    /// Where to write the result.
    #[serde(default)]
    pub output_file: Option<PathBuf>,

    /// Style reference document (docx/odt output).
    #[serde(default)]
    pub reference_doc: Option<PathBuf>,

    /// pandoc defaults (YAML) file.
    #[serde(default)]
    pub defaults_file: Option<PathBuf>,

    /// Filter names or paths, applied in order.
    #[serde(default)]
    pub filters: Vec<String>,
}

fn default_format() -> String {
    Format::Markdown.token().to_string()
}

/// Where a validated request reads from and writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source<'a> {
    /// Inline text, returned inline or written to `output_file`.
    Inline {
        /// Document text.
        contents: &'a str,
        /// Optional destination file.
        output_file: Option<&'a Path>,
    },
    /// A file on disk converted into another file.
    File {
        /// Document to read.
        input_file: &'a Path,
        /// Destination file.
        output_file: &'a Path,
    },
}

/// A request that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedRequest<'a> {
    /// Source format.
    pub input: Format,
    /// Target format.
    pub output: Format,
    /// Input and output locations.
    pub source: Source<'a>,
}

impl ConversionRequest {
    /// Checks the request shape and resolves both format tokens.
    ///
    /// Rules are applied in order and the first violation is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Validation`] for shape problems and the
    /// format registry's error for bad format tokens.
    pub fn validate(&self) -> ConvertResult<ValidatedRequest<'_>> {
        let source = match (&self.contents, &self.input_file, &self.output_file) {
            (Some(_), Some(_), _) => {
                return Err(ConvertError::validation(
                    "cannot specify both 'contents' and 'input_file'",
                ));
            }
            (None, None, _) => {
                return Err(ConvertError::validation(
                    "must specify either 'contents' or 'input_file'",
                ));
            }
            (None, Some(_), None) => {
                return Err(ConvertError::validation(
                    "'output_file' is required when converting from 'input_file'",
                ));
            }
            (Some(contents), None, output_file) => Source::Inline {
                contents,
                output_file: output_file.as_deref(),
            },
            (None, Some(input_file), Some(output_file)) => Source::File {
                input_file,
                output_file,
            },
        };

        let input = Format::normalize_input(&self.input_format)?;
        let output = Format::normalize(&self.output_format)?;

        if output.requires_file_output() && self.output_file.is_none() {
            return Err(ConvertError::validation(format!(
                "output format '{output}' requires an explicit 'output_file' path"
            )));
        }

        Ok(ValidatedRequest {
            input,
            output,
            source,
        })
    }
}
