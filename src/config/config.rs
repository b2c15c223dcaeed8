//! Configuration management for chip

use crate::config::environment::EnvironmentOverrides;
use crate::error::{ChipError, Result};
use crate::routing::ToolFilter;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

fn default_sso_timeout() -> u64 {
    300
}

fn default_call_timeout() -> u64 {
    120
}

fn default_http_port() -> u16 {
    8080
}

/// How MCP clients reach the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerMode {
    /// Newline-delimited JSON-RPC on stdin/stdout
    #[default]
    Stdio,
    /// Alias of `http-streamable`
    Http,
    /// Streamable HTTP: one JSON-RPC message per POST
    HttpStreamable,
    /// Legacy SSE transport: an event stream plus a message endpoint
    HttpSse,
}

impl ServerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerMode::Stdio => "stdio",
            ServerMode::Http => "http",
            ServerMode::HttpStreamable => "http-streamable",
            ServerMode::HttpSse => "http-sse",
        }
    }

    pub fn is_http(&self) -> bool {
        !matches!(self, ServerMode::Stdio)
    }
}

impl std::fmt::Display for ServerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServerMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(ServerMode::Stdio),
            "http" => Ok(ServerMode::Http),
            "http-streamable" => Ok(ServerMode::HttpStreamable),
            "http-sse" => Ok(ServerMode::HttpSse),
            other => Err(format!(
                "Invalid server mode: {} (must be 'stdio', 'http', 'http-sse' or 'http-streamable')",
                other
            )),
        }
    }
}

/// HTTP listener settings, used by the HTTP server modes
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HttpConfig {
    /// Port bound on localhost
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Target API and authentication configuration
    pub api: ApiConfig,
    /// Tool surface configuration
    pub mcp: McpConfig,
}

/// Target API configuration: where outbound calls go and how they authenticate
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ApiConfig {
    /// Base URL of the Collibra instance, e.g. `https://acme.collibra.com`
    pub url: Option<String>,
    /// Shared basic-auth username
    pub username: Option<String>,
    /// Shared basic-auth password
    pub password: Option<SecretString>,
    /// Fixed session cookie sent on every outbound call (`NAME=value`)
    pub cookie: Option<SecretString>,
    /// Acquire the session cookie through a browser SSO login at start-up
    pub sso_auth: bool,
    /// Where the SSO session is cached; defaults to the user config dir
    pub sso_cache_path: Option<PathBuf>,
    /// SSO timeout in seconds
    #[serde(default = "default_sso_timeout")]
    pub sso_timeout: u64,
    /// Disable TLS certificate verification for outbound calls
    pub skip_tls_verify: bool,
    /// Proxy URL for outbound calls
    pub proxy: Option<String>,
    /// Explicit Chromium-family browser executable used for SSO
    pub browser_path: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            cookie: None,
            sso_auth: false,
            sso_cache_path: None,
            sso_timeout: default_sso_timeout(),
            skip_tls_verify: false,
            proxy: None,
            browser_path: None,
        }
    }
}

impl ApiConfig {
    /// Parsed target base URL, `None` when not configured
    pub fn target_url(&self) -> Result<Option<Url>> {
        match self.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(raw) => Url::parse(raw)
                .map(Some)
                .map_err(|e| ChipError::config(format!("Invalid API URL '{}': {}", raw, e))),
            None => Ok(None),
        }
    }

    /// Whether a shared basic-auth identity is configured
    pub fn has_basic_auth(&self) -> bool {
        matches!(
            (&self.username, &self.password),
            (Some(u), Some(p)) if !u.is_empty() && !p.expose_secret().is_empty()
        )
    }

    /// SSO timeout as a duration; zero means the default
    pub fn sso_timeout_duration(&self) -> Duration {
        if self.sso_timeout == 0 {
            Duration::from_secs(default_sso_timeout())
        } else {
            Duration::from_secs(self.sso_timeout)
        }
    }

    /// Validate the API configuration
    pub fn validate(&self) -> Result<()> {
        self.target_url()?;

        if let Some(proxy) = self.proxy.as_deref().filter(|p| !p.is_empty()) {
            Url::parse(proxy)
                .map_err(|e| ChipError::config(format!("Invalid proxy URL '{}': {}", proxy, e)))?;
        }

        if self.username.is_some() != self.password.is_some() {
            return Err(ChipError::config(
                "Basic auth requires both username and password",
            ));
        }

        Ok(())
    }
}

/// MCP server configuration: transport and tool surface
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct McpConfig {
    /// Transport the server listens on
    pub mode: ServerMode,
    /// HTTP listener, used when `mode` is an HTTP mode
    pub http: HttpConfig,
    /// Only these tools are exposed (exclusive with `disabled_tools`)
    pub enabled_tools: Vec<String>,
    /// These tools are hidden, all others exposed (exclusive with `enabled_tools`)
    pub disabled_tools: Vec<String>,
    /// Upper bound on a single tool call, in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            mode: ServerMode::default(),
            http: HttpConfig::default(),
            enabled_tools: Vec::new(),
            disabled_tools: Vec::new(),
            call_timeout: default_call_timeout(),
        }
    }
}

impl McpConfig {
    /// Build the tool filter described by this configuration
    pub fn tool_filter(&self) -> ToolFilter {
        ToolFilter::new(self.enabled_tools.clone(), self.disabled_tools.clone())
    }

    /// Per-call timeout as a duration
    pub fn call_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.call_timeout)
    }

    /// Validate the tool surface configuration
    pub fn validate(&self) -> Result<()> {
        self.tool_filter().validate()?;
        if self.call_timeout == 0 {
            return Err(ChipError::config("Tool call timeout cannot be 0"));
        }
        if self.mode.is_http() && self.http.port == 0 {
            return Err(ChipError::config("HTTP port cannot be 0"));
        }
        Ok(())
    }
}

/// Command-line overrides, highest precedence
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_url: Option<String>,
    pub cookie: Option<String>,
    pub sso_auth: bool,
    pub sso_cache_path: Option<PathBuf>,
    pub sso_timeout: Option<u64>,
    pub skip_tls_verify: bool,
    pub api_proxy: Option<String>,
    pub browser_path: Option<PathBuf>,
    pub enabled_tools: Vec<String>,
    pub disabled_tools: Vec<String>,
    pub mode: Option<ServerMode>,
    pub port: Option<u16>,
}

impl Config {
    /// Candidate configuration files, searched in order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("mcp.yaml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("collibra").join("mcp.yaml"));
        }
        paths.push(PathBuf::from("/etc/collibra/mcp.yaml"));
        paths
    }

    /// Load configuration from file, environment variables and CLI overrides
    ///
    /// Precedence: defaults < YAML file < `.env` < environment < CLI.
    pub fn load(path: Option<&Path>, cli: CliOverrides) -> Result<Self> {
        Self::load_env_files();

        let config_path = match path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(ChipError::config(format!(
                        "Config file not found: {}",
                        explicit.display()
                    )));
                }
                Some(explicit.to_path_buf())
            }
            None => Self::search_paths().into_iter().find(|p| p.exists()),
        };

        let mut config = match config_path {
            Some(ref config_path) => {
                tracing::info!("Using config file: {}", config_path.display());
                Self::from_file(config_path)?
            }
            None => {
                tracing::info!(
                    "No config file found, using environment variables, command-line flags, and defaults"
                );
                Self::default()
            }
        };

        config.apply_environment_overrides()?;
        config.apply_cli_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ChipError::config(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| ChipError::config(format!("Failed to parse config file: {}", e)))
    }

    /// Load `.env` files; a missing file is not an error
    fn load_env_files() {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!("Failed to load .env file: {}", e),
        }
    }

    /// Apply environment variable overrides from the process environment
    pub fn apply_environment_overrides(&mut self) -> Result<()> {
        EnvironmentOverrides::load()?.apply_to(self);
        Ok(())
    }

    /// Apply command-line overrides (highest precedence)
    pub fn apply_cli_overrides(&mut self, cli: CliOverrides) {
        if let Some(url) = cli.api_url {
            self.api.url = Some(url);
        }
        if let Some(cookie) = cli.cookie {
            self.api.cookie = Some(SecretString::new(cookie));
        }
        if cli.sso_auth {
            self.api.sso_auth = true;
        }
        if let Some(path) = cli.sso_cache_path {
            self.api.sso_cache_path = Some(path);
        }
        if let Some(timeout) = cli.sso_timeout {
            self.api.sso_timeout = timeout;
        }
        if cli.skip_tls_verify {
            self.api.skip_tls_verify = true;
        }
        if let Some(proxy) = cli.api_proxy {
            self.api.proxy = Some(proxy);
        }
        if let Some(path) = cli.browser_path {
            self.api.browser_path = Some(path);
        }
        if !cli.enabled_tools.is_empty() {
            self.mcp.enabled_tools = cli.enabled_tools;
        }
        if !cli.disabled_tools.is_empty() {
            self.mcp.disabled_tools = cli.disabled_tools;
        }
        if let Some(mode) = cli.mode {
            self.mcp.mode = mode;
        }
        if let Some(port) = cli.port {
            self.mcp.http.port = port;
        }
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        self.api.validate()?;
        self.mcp.validate()?;
        Ok(())
    }
}
