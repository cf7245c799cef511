//! Running the pandoc executable.
//!
//! Arguments are assembled in a fixed order:
//!
//! ```text
//! -f <in> -t <out> [--pdf-engine=xelatex -V geometry:margin=1in]
//!     [--reference-doc <path>] [--defaults <path>] [--filter <path>]...
//!     [extra args...] [<input file>] [-o <output file>]
//! ```
//!
//! Every child is spawned with `kill_on_drop`, and its pipes are drained
//! before the exit status is read, so a cancelled or timed-out call does
//! not leave a process behind.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{ConvertError, ConvertResult};
use crate::pandoc::format::Format;

/// LaTeX engine used for PDF output.
pub const PDF_ENGINE: &str = "xelatex";

/// Page geometry variable used for PDF output.
pub const PDF_GEOMETRY: &str = "geometry:margin=1in";

/// Optional inputs that shape a conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionOptions {
    /// Style reference document.
    pub reference_doc: Option<PathBuf>,
    /// Validated defaults file.
    pub defaults_file: Option<PathBuf>,
    /// Already-resolved filter paths.
    pub filters: Vec<PathBuf>,
    /// Arguments appended verbatim.
    pub extra_args: Vec<String>,
}

/// Builds the format and option arguments shared by every conversion.
#[must_use]
pub fn build_args(input: Format, output: Format, options: &ConversionOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-f".into(),
        input.engine_token().into(),
        "-t".into(),
        output.engine_token().into(),
    ];

    if output == Format::Pdf {
        args.push(format!("--pdf-engine={PDF_ENGINE}").into());
        args.push("-V".into());
        args.push(PDF_GEOMETRY.into());
    }

    if let Some(reference_doc) = &options.reference_doc {
        args.push("--reference-doc".into());
        args.push(reference_doc.into());
    }

    if let Some(defaults_file) = &options.defaults_file {
        args.push("--defaults".into());
        args.push(defaults_file.into());
    }

    for filter in &options.filters {
        args.push("--filter".into());
        args.push(filter.into());
    }

    args.extend(options.extra_args.iter().map(OsString::from));
    args
}

/// Handle to a pandoc executable.
#[derive(Debug, Clone)]
pub struct PandocEngine {
    program: PathBuf,
}

impl PandocEngine {
    /// Creates a handle for the given executable name or path.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The executable this handle runs.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Converts inline text and returns pandoc's stdout.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::EngineNotFound`] if pandoc cannot be started
    /// and [`ConvertError::ConversionFailed`] if it exits unsuccessfully.
    pub async fn convert_inline(
        &self,
        contents: &str,
        input: Format,
        output: Format,
        options: &ConversionOptions,
    ) -> ConvertResult<String> {
        let args = build_args(input, output, options);
        let out = self.run(&args, Some(contents)).await?;
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    /// Converts inline text and lets pandoc write `output_path` itself.
    ///
    /// # Errors
    ///
    /// See [`Self::convert_inline`].
    pub async fn convert_inline_to_file(
        &self,
        contents: &str,
        output_path: &Path,
        input: Format,
        output: Format,
        options: &ConversionOptions,
    ) -> ConvertResult<()> {
        let mut args = build_args(input, output, options);
        args.push("-o".into());
        args.push(output_path.into());
        self.run(&args, Some(contents)).await.map(|_| ())
    }

    /// Converts `input_path` into `output_path`.
    ///
    /// # Errors
    ///
    /// See [`Self::convert_inline`].
    pub async fn convert_files(
        &self,
        input_path: &Path,
        output_path: &Path,
        input: Format,
        output: Format,
        options: &ConversionOptions,
    ) -> ConvertResult<()> {
        let mut args = build_args(input, output, options);
        args.push(input_path.into());
        args.push("-o".into());
        args.push(output_path.into());
        self.run(&args, None).await.map(|_| ())
    }

    /// Returns `true` if `pandoc --version` runs successfully.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .is_ok_and(|status| status.success())
    }

    /// Returns the first line of `pandoc --version`, e.g. `pandoc 3.1.11`.
    ///
    /// # Errors
    ///
    /// Same classification as the conversion calls.
    pub async fn version(&self) -> ConvertResult<String> {
        let out = self.run(&["--version".into()], None).await?;
        let stdout = String::from_utf8_lossy(&out.stdout);
        Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
    }

    async fn run(&self, args: &[OsString], stdin: Option<&str>) -> ConvertResult<Output> {
        tracing::debug!(program = %self.program.display(), ?args, "Spawning pandoc");

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.classify_spawn_error(&e))?;

        let writer = child.stdin.take();
        let feed = async move {
            if let (Some(mut pipe), Some(text)) = (writer, stdin) {
                pipe.write_all(text.as_bytes()).await?;
                pipe.shutdown().await?;
            }
            Ok::<(), io::Error>(())
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| ConvertError::ConversionFailed {
            message: e.to_string(),
            exit_code: None,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("pandoc exited with {}", output.status)
            } else {
                stderr
            };
            tracing::debug!(status = %output.status, "pandoc failed");
            return Err(ConvertError::ConversionFailed {
                message,
                exit_code: output.status.code(),
            });
        }

        // pandoc may exit early without reading all of stdin; that only
        // matters when it also failed, which was handled above.
        if let Err(e) = fed {
            tracing::debug!(error = %e, "pandoc did not consume all input");
        }

        Ok(output)
    }

    fn classify_spawn_error(&self, error: &io::Error) -> ConvertError {
        if is_not_found(error) {
            ConvertError::EngineNotFound {
                program: self.program.display().to_string(),
            }
        } else {
            ConvertError::ConversionFailed {
                message: format!("failed to start pandoc: {error}"),
                exit_code: None,
            }
        }
    }
}

impl Default for PandocEngine {
    fn default() -> Self {
        Self::new("pandoc")
    }
}

/// Whether a spawn error means the executable does not exist.
fn is_not_found(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::NotFound {
        return true;
    }
    let message = error.to_string().to_lowercase();
    ["not found", "no such file", "enoent"]
        .iter()
        .any(|needle| message.contains(needle))
}
