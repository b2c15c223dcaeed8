use anyhow::Result;
use chip::auth::{ChromeLauncher, CredentialStore, SessionManager, SsoAuthenticator, SESSION_COOKIE_NAME};
use chip::clients::ApiClient;
use chip::config::{CliOverrides, Config, ServerMode};
use chip::mcp::{self, McpServer};
use chip::routing::{LoggingMiddleware, MiddlewareChain, TargetHostMiddleware, ToolDispatcher};
use chip::startup::{self, LogFormat};
use chip::tools;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(version)]
struct Cli {
    /// Configuration file path (default: search mcp.yaml locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the Collibra instance
    #[arg(long)]
    api_url: Option<String>,

    /// Fixed session cookie sent with every API call (NAME=value)
    #[arg(long)]
    cookie: Option<String>,

    /// Log in through the browser and use the resulting session
    #[arg(long)]
    sso_auth: bool,

    /// Where the SSO session is cached
    #[arg(long)]
    sso_cache_path: Option<PathBuf>,

    /// Seconds to wait for the SSO login to complete
    #[arg(long)]
    sso_timeout: Option<u64>,

    /// Accept invalid TLS certificates from the API
    #[arg(long)]
    skip_tls_verify: bool,

    /// Proxy URL for API calls
    #[arg(long)]
    api_proxy: Option<String>,

    /// Only expose these tools (comma separated)
    #[arg(long, value_delimiter = ',')]
    enabled_tools: Vec<String>,

    /// Hide these tools (comma separated)
    #[arg(long, value_delimiter = ',')]
    disabled_tools: Vec<String>,

    /// Chrome, Chromium or Edge executable used for SSO
    #[arg(long)]
    browser_path: Option<PathBuf>,

    /// MCP server mode: stdio, http, http-sse or http-streamable
    #[arg(long)]
    mode: Option<ServerMode>,

    /// HTTP server port (only used in the HTTP modes)
    #[arg(long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log format (text, json)
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    /// Remove the cached SSO session and exit
    #[arg(long)]
    clear_sso_cache: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            api_url: self.api_url.clone(),
            cookie: self.cookie.clone(),
            sso_auth: self.sso_auth,
            sso_cache_path: self.sso_cache_path.clone(),
            sso_timeout: self.sso_timeout,
            skip_tls_verify: self.skip_tls_verify,
            api_proxy: self.api_proxy.clone(),
            browser_path: self.browser_path.clone(),
            enabled_tools: self.enabled_tools.clone(),
            disabled_tools: self.disabled_tools.clone(),
            mode: self.mode,
            port: self.port,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is reserved for JSON-RPC
    startup::init_logging(&cli.log_level, cli.log_format)?;

    let mut config = Config::load(cli.config.as_deref(), cli.overrides()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if cli.clear_sso_cache {
        let store = CredentialStore::new(config.api.sso_cache_path.clone());
        store.clear()?;
        info!("SSO session cache cleared ({})", store.path().display());
        return Ok(());
    }

    startup::display_startup_info(&config, chip::VERSION);

    let Some(api_url) = config.api.url.clone().filter(|u| !u.trim().is_empty()) else {
        error!("Missing API url");
        anyhow::bail!("Missing API url: set api.url, COLLIBRA_MCP_API_URL or --api-url");
    };

    let shutdown = CancellationToken::new();
    let on_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            on_ctrl_c.cancel();
        }
    });

    if config.api.sso_auth {
        let launcher = Arc::new(ChromeLauncher::new(config.api.browser_path.clone()));
        let manager = SessionManager::new(
            CredentialStore::new(config.api.sso_cache_path.clone()),
            SsoAuthenticator::new(launcher),
        )
        .with_cancellation(shutdown.clone());

        let credential = manager
            .ensure_credential(&api_url, config.api.sso_timeout_duration())
            .await
            .map_err(|e| {
                error!("SSO authentication failed: {}", e);
                e
            })?;
        config.api.cookie = Some(credential.cookie_header(SESSION_COOKIE_NAME));
    }

    let client = Arc::new(ApiClient::from_config(&config.api)?);

    let middleware = MiddlewareChain::new()
        .add_middleware(Arc::new(TargetHostMiddleware::new(api_url.trim_end_matches('/'))))
        .add_middleware(Arc::new(LoggingMiddleware::new()));
    let mut dispatcher =
        ToolDispatcher::new(middleware).with_call_timeout(config.mcp.call_timeout_duration());
    tools::register_all(&mut dispatcher, client, &config.mcp.tool_filter())?;

    let server = McpServer::new(Arc::new(dispatcher));
    match config.mcp.mode {
        ServerMode::Stdio => {
            info!("Listening on stdio");
            tokio::select! {
                result = server.run_stdio() => result?,
                _ = shutdown.cancelled() => {}
            }
        }
        mode => {
            mcp::run_http(Arc::new(server), mode, config.mcp.http.port, shutdown).await?;
        }
    }

    Ok(())
}
