//! The real outbound HTTP transport and its construction from configuration

use crate::config::ApiConfig;
use crate::error::{ChipError, Result};
use async_trait::async_trait;
use reqwest::{Request, Response};
use std::time::Duration;
use tracing::{info, warn};

/// Sends a fully prepared request over the network
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl HttpTransport for reqwest::Client {
    async fn send(&self, request: Request) -> Result<Response> {
        Ok(self.execute(request).await?)
    }
}

/// Build the base HTTP client for outbound API calls
pub fn build_http_client(config: &ApiConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(60))
        .tcp_keepalive(Duration::from_secs(60))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(100)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));

    if config.skip_tls_verify {
        warn!(
            "Skipping TLS certificate verification for {}",
            config.url.as_deref().unwrap_or("<unset>")
        );
        builder = builder.danger_accept_invalid_certs(true);
    }

    if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.is_empty()) {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| ChipError::config(format!("Invalid proxy URL: {}", e)))?;
        info!("Using proxy URL: {:?}", proxy);
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ChipError::config(format!("Failed to build HTTP client: {}", e)))
}
