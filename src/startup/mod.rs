//! Process start-up: logging initialisation and the start-up banner

use crate::config::Config;
use anyhow::Result;
use std::str::FromStr;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}' (expected text or json)", other)),
        }
    }
}

/// Install the global subscriber; logs go to stderr because stdout carries JSON-RPC
///
/// `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }
    Ok(())
}

/// Summarise the effective configuration; never logs secrets
pub fn display_startup_info(config: &Config, version: &str) {
    info!("Starting Collibra MCP server (version: {})...", version);
    info!("   API URL: {}", config.api.url.as_deref().unwrap_or("<unset>"));

    let auth_mode = if config.api.sso_auth {
        "sso"
    } else if config.api.cookie.is_some() {
        "fixed cookie"
    } else if config.api.has_basic_auth() {
        "basic auth"
    } else {
        "forwarded Authorization header"
    };
    info!("   Authentication: {}", auth_mode);

    if config.mcp.mode.is_http() {
        info!("   Mode: {} (localhost:{})", config.mcp.mode, config.mcp.http.port);
    } else {
        info!("   Mode: {}", config.mcp.mode);
    }

    if let Some(proxy) = &config.api.proxy {
        info!("   Proxy: {}", proxy);
    }
    if !config.mcp.enabled_tools.is_empty() {
        info!("   Enabled tools: {}", config.mcp.enabled_tools.join(", "));
    }
    if !config.mcp.disabled_tools.is_empty() {
        info!("   Disabled tools: {}", config.mcp.disabled_tools.join(", "));
    }

    if config.api.has_basic_auth() {
        warn!(
            "Using a single basic auth header for all requests attributes every action to the same account. \
             Consider forwarding a per-request Authorization header instead."
        );
    }
}
