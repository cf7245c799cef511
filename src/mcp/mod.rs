//! Model Context Protocol (MCP) server implementation.
//!
//! This module exposes pandoc conversion as an MCP tool. The protocol core
//! is transport-agnostic; two transports drive it:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          MCP Server                          │
//! │                                                              │
//! │   ┌─────────────┐                                            │
//! │   │    stdio    │──┐                                         │
//! │   └─────────────┘  │   ┌─────────────┐    ┌──────────────┐   │
//! │                    ├──▶│   Server    │───▶│  Conversion  │   │
//! │   ┌─────────────┐  │   │ (lifecycle) │    │   handler    │   │
//! │   │  HTTP/SSE   │──┘   └─────────────┘    └──────────────┘   │
//! │   │ (1 server   │                                │           │
//! │   │ per session)│                                ▼           │
//! │   └─────────────┘                          pandoc process    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod protocol;
pub mod server;
pub mod sse;
pub mod transport;

pub use protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, OutgoingMessage, MCP_PROTOCOL_VERSION,
};
pub use server::McpServer;
pub use sse::SseServer;
pub use transport::StdioTransport;
