//! pandoc-mcp: MCP server for document conversion with pandoc
//!
//! Exposes pandoc's format conversion to AI assistants as an MCP tool,
//! over stdio (default) or HTTP/SSE.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use pandoc_mcp::config;
use pandoc_mcp::mcp::{McpServer, SseServer};
use pandoc_mcp::pandoc::ConversionHandler;

/// Transport used to talk to the MCP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// Newline-delimited JSON-RPC over stdin/stdout.
    Stdio,
    /// HTTP with server-sent events.
    Sse,
}

/// MCP server for document conversion with pandoc.
///
/// Provides a `convert-contents` tool that converts between markdown, HTML,
/// plain text, notebooks, office formats, reStructuredText, LaTeX, EPUB and
/// PDF by running pandoc.
#[derive(Parser, Debug)]
#[command(name = "pandoc-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,

    /// Transport to serve
    #[arg(long, value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,

    /// Address to bind for the SSE transport (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind for the SSE transport (overrides config)
    #[arg(long)]
    port: Option<u16>,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries MCP messages.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point for the pandoc-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(get_log_level(args.verbose, args.quiet, &cfg.logging.level));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = ?args.transport,
        "Starting pandoc-mcp server"
    );

    let runtime = match args.transport {
        Transport::Stdio => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build(),
        Transport::Sse => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build(),
    };
    let runtime = match runtime {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let handler = Arc::new(ConversionHandler::new(&cfg.pandoc));

    let result = runtime.block_on(async move {
        match handler.engine().version().await {
            Ok(version) => info!(
                engine = %handler.engine().program().display(),
                version = %version,
                "pandoc found"
            ),
            Err(e) => warn!(error = %e, "pandoc is not available; conversions will fail"),
        }

        match args.transport {
            Transport::Stdio => {
                info!("MCP server ready, waiting for client connection...");
                McpServer::new(handler).run().await
            }
            Transport::Sse => {
                let host = args.host.unwrap_or(cfg.http.host);
                let port = args.port.unwrap_or(cfg.http.port);
                SseServer::new(handler).serve(format!("{host}:{port}")).await
            }
        }
    });

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
