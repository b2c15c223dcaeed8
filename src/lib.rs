//! chip - authenticated tool gateway between MCP clients and the Collibra API
//!
//! This crate accepts abstract "call this tool" requests, threads a per-call
//! [`routing::RequestContext`] through an ordered middleware chain, and decorates
//! every outbound HTTP call with credentials, tracing headers and the configured
//! target before it leaves the process. Session credentials are acquired through a
//! browser-driven SSO flow and cached on disk between runs.

pub mod auth;
pub mod clients;
pub mod config;
pub mod error;
pub mod mcp;
pub mod routing;
pub mod startup;
pub mod tools;

pub use config::{ApiConfig, Config, McpConfig};
pub use error::{ChipError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server name reported to MCP clients
pub const SERVER_NAME: &str = "chip";
