//! MCP (Model Context Protocol) server
//!
//! Accepts JSON-RPC requests from an MCP client over stdio or HTTP and turns
//! `tools/call` into dispatcher calls.

pub mod errors;
pub mod http;
pub mod server;
pub mod types;

pub use errors::{McpError, McpErrorCode};
pub use http::{run_http, HttpState};
pub use server::{McpServer, TransportMeta};
pub use types::*;
