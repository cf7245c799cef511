//! Document conversion through the pandoc executable.
//!
//! - [`format`]: the closed set of supported formats
//! - [`request`]: the `convert-contents` arguments and their validation
//! - [`defaults`]: pandoc defaults (YAML) file checks
//! - [`filters`]: filter lookup across the search directories
//! - [`engine`]: argument assembly and subprocess execution
//! - [`handler`]: the per-request pipeline tying these together

pub mod defaults;
pub mod engine;
pub mod filters;
pub mod format;
pub mod handler;
pub mod request;

pub use engine::{ConversionOptions, PandocEngine};
pub use filters::FilterResolver;
pub use format::Format;
pub use handler::{ConversionHandler, ConversionOutcome};
pub use request::{ConversionRequest, Source, ValidatedRequest};
