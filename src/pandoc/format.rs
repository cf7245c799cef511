//! The closed set of document formats the server understands.
//!
//! Each [`Format`] carries a static [`FormatInfo`] record: its canonical
//! token, whether pandoc can read it, whether the result must be written
//! to a file, and the token handed to pandoc itself.

use std::fmt;
use std::str::FromStr;

use crate::error::{ConvertError, ConvertResult};

/// A supported document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Pandoc markdown.
    Markdown,
    /// HTML.
    Html,
    /// Plain text.
    Text,
    /// Jupyter notebook.
    Ipynb,
    /// Word document.
    Docx,
    /// OpenDocument text.
    Odt,
    /// Rich text format.
    Rtf,
    /// reStructuredText.
    Rst,
    /// LaTeX source.
    Latex,
    /// EPUB e-book.
    Epub,
    /// PDF (output only).
    Pdf,
}

/// Static facts about a [`Format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    /// Canonical lower-case token accepted in requests.
    pub token: &'static str,
    /// Whether pandoc can read this format.
    pub input: bool,
    /// Whether output must go to a file instead of being returned inline.
    pub file_output: bool,
    /// Token passed to pandoc's `-f`/`-t` flags.
    pub engine_token: &'static str,
}

/// Accepted for backwards compatibility; maps to [`Format::Text`].
const LEGACY_TEXT_ALIAS: &str = "text";

static FORMATS: [(Format, FormatInfo); 11] = [
    (Format::Markdown, info("markdown", true, false, "markdown")),
    (Format::Html, info("html", true, false, "html")),
    (Format::Text, info("txt", true, false, "plain")),
    (Format::Ipynb, info("ipynb", true, false, "ipynb")),
    (Format::Docx, info("docx", true, true, "docx")),
    (Format::Odt, info("odt", true, true, "odt")),
    (Format::Rtf, info("rtf", true, true, "rtf")),
    (Format::Rst, info("rst", true, false, "rst")),
    (Format::Latex, info("latex", true, false, "latex")),
    (Format::Epub, info("epub", true, true, "epub")),
    // `-t pdf` renders through `--pdf-engine` whatever the output file is named.
    (Format::Pdf, info("pdf", false, true, "pdf")),
];

const fn info(
    token: &'static str,
    input: bool,
    file_output: bool,
    engine_token: &'static str,
) -> FormatInfo {
    FormatInfo {
        token,
        input,
        file_output,
        engine_token,
    }
}

impl Format {
    /// Looks up a format by token, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::UnsupportedFormat`] echoing the raw token if
    /// it names no known format.
    pub fn normalize(token: &str) -> ConvertResult<Self> {
        let lowered = token.to_lowercase();
        let lookup = if lowered == LEGACY_TEXT_ALIAS {
            Self::Text.token()
        } else {
            lowered.as_str()
        };

        FORMATS
            .iter()
            .find(|(_, info)| info.token == lookup)
            .map(|(format, _)| *format)
            .ok_or_else(|| ConvertError::UnsupportedFormat {
                format: token.to_string(),
            })
    }

    /// Looks up a format that will be used as conversion input.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::UnsupportedFormat`] for unknown tokens and
    /// [`ConvertError::UnsupportedInputFormat`] for output-only formats.
    pub fn normalize_input(token: &str) -> ConvertResult<Self> {
        let format = Self::normalize(token)?;
        if !format.is_input_capable() {
            return Err(ConvertError::UnsupportedInputFormat {
                format: token.to_string(),
            });
        }
        Ok(format)
    }

    /// Returns the static attributes of this format.
    #[must_use]
    pub fn info(self) -> &'static FormatInfo {
        // FORMATS is ordered by variant declaration.
        &FORMATS[self as usize].1
    }

    /// Canonical request token.
    #[must_use]
    pub fn token(self) -> &'static str {
        self.info().token
    }

    /// Token for pandoc's `-f`/`-t` flags.
    #[must_use]
    pub fn engine_token(self) -> &'static str {
        self.info().engine_token
    }

    /// Whether pandoc can read this format.
    #[must_use]
    pub fn is_input_capable(self) -> bool {
        self.info().input
    }

    /// Whether converting to this format needs an explicit output file.
    #[must_use]
    pub fn requires_file_output(self) -> bool {
        self.info().file_output
    }

    /// Every format, in registry order.
    pub fn all() -> impl Iterator<Item = Self> {
        FORMATS.iter().map(|(format, _)| *format)
    }

    /// Every input-capable format, in registry order.
    pub fn input_formats() -> impl Iterator<Item = Self> {
        Self::all().filter(|f| f.is_input_capable())
    }

    /// Canonical tokens of every format.
    #[must_use]
    pub fn all_tokens() -> Vec<&'static str> {
        Self::all().map(Self::token).collect()
    }

    /// Canonical tokens of every input-capable format.
    #[must_use]
    pub fn input_tokens() -> Vec<&'static str> {
        Self::input_formats().map(Self::token).collect()
    }
}

impl FromStr for Format {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
