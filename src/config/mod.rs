//! Configuration module for chip
//!
//! Configuration is read from a YAML file, `.env` files, `COLLIBRA_MCP_*`
//! environment variables and command-line flags, in increasing precedence.

mod config;
pub mod environment;

pub use config::{ApiConfig, CliOverrides, Config, HttpConfig, McpConfig, ServerMode};
pub use environment::{EnvVars, EnvironmentOverrides};
