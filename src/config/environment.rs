//! Environment variable integration for chip configuration

use crate::config::{Config, ServerMode};
use crate::error::{ChipError, Result};
use secrecy::SecretString;
use std::env;
use std::path::PathBuf;
use tracing::debug;

/// Environment variable names used by chip
pub struct EnvVars;

impl EnvVars {
    pub const API_URL: &'static str = "COLLIBRA_MCP_API_URL";
    pub const API_USERNAME: &'static str = "COLLIBRA_MCP_API_USERNAME";
    pub const API_PASSWORD: &'static str = "COLLIBRA_MCP_API_PASSWORD";
    pub const API_COOKIE: &'static str = "COLLIBRA_MCP_API_COOKIE";
    pub const SSO_AUTH: &'static str = "COLLIBRA_MCP_SSO_AUTH";
    pub const SSO_CACHE_PATH: &'static str = "COLLIBRA_MCP_SSO_CACHE_PATH";
    pub const SSO_TIMEOUT: &'static str = "COLLIBRA_MCP_SSO_TIMEOUT";
    pub const SKIP_TLS_VERIFY: &'static str = "COLLIBRA_MCP_API_SKIP_TLS_VERIFY";
    pub const API_PROXY: &'static str = "COLLIBRA_MCP_API_PROXY";
    pub const ENABLED_TOOLS: &'static str = "COLLIBRA_MCP_ENABLED_TOOLS";
    pub const DISABLED_TOOLS: &'static str = "COLLIBRA_MCP_DISABLED_TOOLS";
    pub const BROWSER_PATH: &'static str = "COLLIBRA_MCP_BROWSER_PATH";
    pub const MODE: &'static str = "COLLIBRA_MCP_MODE";
    pub const HTTP_PORT: &'static str = "COLLIBRA_MCP_HTTP_PORT";

    /// Generic proxy variables honoured when no chip-specific proxy is set
    pub const FALLBACK_PROXIES: [&'static str; 2] = ["HTTPS_PROXY", "HTTP_PROXY"];
}

/// Environment configuration overrides
#[derive(Debug, Clone, Default)]
pub struct EnvironmentOverrides {
    pub api_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub cookie: Option<String>,
    pub sso_auth: Option<bool>,
    pub sso_cache_path: Option<PathBuf>,
    pub sso_timeout: Option<u64>,
    pub skip_tls_verify: Option<bool>,
    pub proxy: Option<String>,
    pub enabled_tools: Option<Vec<String>>,
    pub disabled_tools: Option<Vec<String>>,
    pub browser_path: Option<PathBuf>,
    pub mode: Option<ServerMode>,
    pub http_port: Option<u16>,
}

impl EnvironmentOverrides {
    /// Load overrides from the process environment
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load overrides through an arbitrary lookup function; empty values are ignored
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let sso_timeout = match get(EnvVars::SSO_TIMEOUT) {
            Some(raw) => Some(raw.parse::<u64>().map_err(|e| {
                ChipError::config(format!("Invalid {}: {} ({})", EnvVars::SSO_TIMEOUT, raw, e))
            })?),
            None => None,
        };

        let mode = match get(EnvVars::MODE) {
            Some(raw) => Some(raw.parse::<ServerMode>().map_err(ChipError::config)?),
            None => None,
        };

        let http_port = match get(EnvVars::HTTP_PORT) {
            Some(raw) => Some(raw.parse::<u16>().map_err(|e| {
                ChipError::config(format!("Invalid {}: {} ({})", EnvVars::HTTP_PORT, raw, e))
            })?),
            None => None,
        };

        let proxy = get(EnvVars::API_PROXY).or_else(|| {
            EnvVars::FALLBACK_PROXIES
                .iter()
                .find_map(|&key| get(key))
        });

        let overrides = EnvironmentOverrides {
            api_url: get(EnvVars::API_URL),
            username: get(EnvVars::API_USERNAME),
            password: get(EnvVars::API_PASSWORD),
            cookie: get(EnvVars::API_COOKIE),
            sso_auth: parse_bool(EnvVars::SSO_AUTH, get(EnvVars::SSO_AUTH))?,
            sso_cache_path: get(EnvVars::SSO_CACHE_PATH).map(PathBuf::from),
            sso_timeout,
            skip_tls_verify: parse_bool(EnvVars::SKIP_TLS_VERIFY, get(EnvVars::SKIP_TLS_VERIFY))?,
            proxy,
            enabled_tools: get(EnvVars::ENABLED_TOOLS).map(|v| split_list(&v)),
            disabled_tools: get(EnvVars::DISABLED_TOOLS).map(|v| split_list(&v)),
            browser_path: get(EnvVars::BROWSER_PATH).map(PathBuf::from),
            mode,
            http_port,
        };

        debug!("Environment overrides: {:?}", overrides.get_override_summary());
        Ok(overrides)
    }

    /// Apply the overrides on top of a file-loaded configuration
    pub fn apply_to(self, config: &mut Config) {
        if let Some(url) = self.api_url {
            config.api.url = Some(url);
        }
        if let Some(username) = self.username {
            config.api.username = Some(username);
        }
        if let Some(password) = self.password {
            config.api.password = Some(SecretString::new(password));
        }
        if let Some(cookie) = self.cookie {
            config.api.cookie = Some(SecretString::new(cookie));
        }
        if let Some(sso_auth) = self.sso_auth {
            config.api.sso_auth = sso_auth;
        }
        if let Some(path) = self.sso_cache_path {
            config.api.sso_cache_path = Some(path);
        }
        if let Some(timeout) = self.sso_timeout {
            config.api.sso_timeout = timeout;
        }
        if let Some(skip) = self.skip_tls_verify {
            config.api.skip_tls_verify = skip;
        }
        if let Some(proxy) = self.proxy {
            config.api.proxy = Some(proxy);
        }
        if let Some(tools) = self.enabled_tools {
            config.mcp.enabled_tools = tools;
        }
        if let Some(tools) = self.disabled_tools {
            config.mcp.disabled_tools = tools;
        }
        if let Some(path) = self.browser_path {
            config.api.browser_path = Some(path);
        }
        if let Some(mode) = self.mode {
            config.mcp.mode = mode;
        }
        if let Some(port) = self.http_port {
            config.mcp.http.port = port;
        }
    }

    /// Names of the variables that were set (values are never included)
    pub fn get_override_summary(&self) -> Vec<&'static str> {
        let mut summary = Vec::new();
        let checks: [(&'static str, bool); 14] = [
            (EnvVars::API_URL, self.api_url.is_some()),
            (EnvVars::API_USERNAME, self.username.is_some()),
            (EnvVars::API_PASSWORD, self.password.is_some()),
            (EnvVars::API_COOKIE, self.cookie.is_some()),
            (EnvVars::SSO_AUTH, self.sso_auth.is_some()),
            (EnvVars::SSO_CACHE_PATH, self.sso_cache_path.is_some()),
            (EnvVars::SSO_TIMEOUT, self.sso_timeout.is_some()),
            (EnvVars::SKIP_TLS_VERIFY, self.skip_tls_verify.is_some()),
            (EnvVars::API_PROXY, self.proxy.is_some()),
            (EnvVars::ENABLED_TOOLS, self.enabled_tools.is_some()),
            (EnvVars::DISABLED_TOOLS, self.disabled_tools.is_some()),
            (EnvVars::BROWSER_PATH, self.browser_path.is_some()),
            (EnvVars::MODE, self.mode.is_some()),
            (EnvVars::HTTP_PORT, self.http_port.is_some()),
        ];
        for (name, set) in checks {
            if set {
                summary.push(name);
            }
        }
        summary
    }
}

fn parse_bool(key: &str, value: Option<String>) -> Result<Option<bool>> {
    match value {
        None => Ok(None),
        Some(raw) => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(ChipError::config(format!(
                "Invalid {}: {} (valid options: true, false)",
                key, raw
            ))),
        },
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
