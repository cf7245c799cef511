//! Orchestration of a single conversion request.
//!
//! `validate → (defaults) → (filters) → convert`. The first failure ends the
//! request and is returned as-is. Handlers share nothing mutable except the
//! semaphore bounding concurrent pandoc processes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use crate::config::PandocConfig;
use crate::error::{ConvertError, ConvertResult};
use crate::pandoc::defaults::{defaults_dir, validate_defaults};
use crate::pandoc::engine::{ConversionOptions, PandocEngine};
use crate::pandoc::filters::FilterResolver;
use crate::pandoc::request::{ConversionRequest, Source};

/// Result of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// Converted text, returned inline.
    Text(String),
    /// pandoc wrote the result to `output`.
    Written {
        /// Source file, if the request named one.
        input: Option<PathBuf>,
        /// Written file.
        output: PathBuf,
    },
}

impl ConversionOutcome {
    /// Text returned to the client.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Written {
                input: Some(input),
                output,
            } => format!(
                "Successfully converted {} to {}",
                input.display(),
                output.display()
            ),
            Self::Written {
                input: None,
                output,
            } => format!(
                "Content successfully converted and saved to: {}",
                output.display()
            ),
        }
    }
}

/// Runs conversion requests against one pandoc engine.
#[derive(Debug, Clone)]
pub struct ConversionHandler {
    engine: PandocEngine,
    resolver: FilterResolver,
    extra_args: Vec<String>,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl ConversionHandler {
    /// Creates a handler from the `pandoc` configuration section.
    #[must_use]
    pub fn new(config: &PandocConfig) -> Self {
        Self::with_parts(
            PandocEngine::new(&config.path),
            FilterResolver::from_env(),
            config,
        )
    }

    /// Creates a handler with an explicit engine and filter resolver.
    #[must_use]
    pub fn with_parts(
        engine: PandocEngine,
        resolver: FilterResolver,
        config: &PandocConfig,
    ) -> Self {
        Self {
            engine,
            resolver,
            extra_args: config.extra_args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        }
    }

    /// The engine used for conversions.
    #[must_use]
    pub const fn engine(&self) -> &PandocEngine {
        &self.engine
    }

    /// Validates and runs one request.
    ///
    /// # Errors
    ///
    /// Returns the first error hit by any stage.
    pub async fn handle(&self, request: &ConversionRequest) -> ConvertResult<ConversionOutcome> {
        let started = Instant::now();
        let validated = request.validate()?;
        let (from, to) = (validated.input, validated.output);

        let mut aux_dir = None;
        if let Some(defaults_file) = &request.defaults_file {
            validate_defaults(defaults_file).await?;
            aux_dir = defaults_dir(defaults_file).await;
        }

        let filters = if request.filters.is_empty() {
            Vec::new()
        } else {
            self.resolver
                .resolve_all(&request.filters, aux_dir.as_deref())
                .await?
        };

        let options = ConversionOptions {
            reference_doc: request.reference_doc.clone(),
            defaults_file: request.defaults_file.clone(),
            filters,
            extra_args: self.extra_args.clone(),
        };

        let outcome = self
            .bounded(async {
                match validated.source {
                    Source::Inline {
                        contents,
                        output_file: None,
                    } => self
                        .engine
                        .convert_inline(contents, from, to, &options)
                        .await
                        .map(ConversionOutcome::Text),
                    Source::Inline {
                        contents,
                        output_file: Some(output),
                    } => {
                        ensure_parent_dir(output).await?;
                        self.engine
                            .convert_inline_to_file(contents, output, from, to, &options)
                            .await?;
                        Ok(ConversionOutcome::Written {
                            input: None,
                            output: output.to_path_buf(),
                        })
                    }
                    Source::File {
                        input_file,
                        output_file,
                    } => {
                        ensure_parent_dir(output_file).await?;
                        self.engine
                            .convert_files(input_file, output_file, from, to, &options)
                            .await?;
                        Ok(ConversionOutcome::Written {
                            input: Some(input_file.to_path_buf()),
                            output: output_file.to_path_buf(),
                        })
                    }
                }
            })
            .await?;

        tracing::info!(
            from = %from,
            to = %to,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Conversion finished"
        );

        Ok(outcome)
    }

    /// Runs `conversion` under the concurrency limit and timeout.
    async fn bounded<F, T>(&self, conversion: F) -> ConvertResult<T>
    where
        F: std::future::Future<Output = ConvertResult<T>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ConvertError::ConversionFailed {
                message: "conversion pool is shut down".to_string(),
                exit_code: None,
            })?;

        tokio::time::timeout(self.timeout, conversion)
            .await
            .map_err(|_| ConvertError::Timeout {
                seconds: self.timeout.as_secs(),
            })?
    }
}

async fn ensure_parent_dir(path: &Path) -> ConvertResult<()> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| ConvertError::ConversionFailed {
            message: format!("failed to create output directory {}: {e}", parent.display()),
            exit_code: None,
        })
}
