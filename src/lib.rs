//! pandoc-mcp: MCP server for document conversion with pandoc
//!
//! This library exposes pandoc's format conversion as a single MCP tool,
//! `convert-contents`, over stdio or HTTP/SSE.
//!
//! # Architecture
//!
//! The server is a thin, typed layer in front of the `pandoc` executable:
//!
//! - **Formats**: a closed set of supported formats with per-format rules
//! - **Validation**: request shape and format checks before anything runs
//! - **Defaults & filters**: YAML defaults checks and filter path lookup
//! - **Engine**: argument assembly and the pandoc subprocess
//!
//! pandoc itself does the conversion work.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: MCP protocol implementation and transports
//! - [`pandoc`]: Conversion pipeline

pub mod config;
pub mod error;
pub mod mcp;
pub mod pandoc;
